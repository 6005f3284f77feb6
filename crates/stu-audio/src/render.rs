//! The audio-callback renderer
//!
//! One instance lives on the audio thread (or the null driver thread). Per
//! block it drains the command ring, loads the current graph description,
//! renders every track (clips -> chain -> volume/pan), sums into the master
//! bus, and publishes meters, spectrum samples, and the advanced transport.
//!
//! **Invariant:** `render()` never allocates, locks, or does I/O. Scratch
//! buffers are pre-sized; processor installs arrive as boxes built
//! elsewhere; retired allocations leave through the trash ring.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::buffers::{AudioBlock, Smoothed};
use crate::commands::{EngineCommand, Trash};
use crate::graph::{ClipSpec, GraphHandoff, DrumLane, MAX_SLOTS};
use crate::meters::{MeterFrame, MeterLane, MAX_METER_TRACKS};
use crate::metronome::Metronome;
use crate::processor::{NoteEvent, Processor};
use crate::recording::RecordTap;
use crate::step_synth::StepSynth;
use crate::transport::{SharedTransport, TransportClock};

/// Upper bound on scheduled events per track per block
const EVENT_SCRATCH: usize = 1024;

struct TrackRenderState {
    track_id: u32,
    synth: StepSynth,
    gain_left: Smoothed,
    gain_right: Smoothed,
}

impl TrackRenderState {
    fn new(sample_rate: f32) -> Self {
        Self {
            track_id: u32::MAX,
            synth: StepSynth::new(sample_rate),
            gain_left: Smoothed::new(0.0),
            gain_right: Smoothed::new(0.0),
        }
    }
}

/// Per-callback state machine
pub struct Renderer {
    sample_rate: f32,
    max_block: usize,
    clock: TransportClock,
    shared: Arc<SharedTransport>,
    handoff: Arc<GraphHandoff>,
    commands: rtrb::Consumer<EngineCommand>,
    trash: rtrb::Producer<Trash>,
    meter_tx: rtrb::Producer<MeterFrame>,
    spectrum_tx: rtrb::Producer<f32>,

    pool: Vec<Option<Box<dyn Processor>>>,
    track_states: Vec<TrackRenderState>,
    track_buffer: AudioBlock,
    master: AudioBlock,
    metronome: Metronome,
    note_scratch: Vec<NoteEvent>,
    step_scratch: Vec<(usize, DrumLane, f32)>,
    record_taps: Vec<RecordTap>,
    pending_meter: MeterFrame,
}

impl Renderer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sample_rate: u32,
        max_block: usize,
        shared: Arc<SharedTransport>,
        handoff: Arc<GraphHandoff>,
        commands: rtrb::Consumer<EngineCommand>,
        trash: rtrb::Producer<Trash>,
        meter_tx: rtrb::Producer<MeterFrame>,
        spectrum_tx: rtrb::Producer<f32>,
        initial_bpm: u32,
    ) -> Self {
        let mut pool = Vec::with_capacity(MAX_SLOTS);
        pool.resize_with(MAX_SLOTS, || None);
        let mut track_states = Vec::with_capacity(MAX_METER_TRACKS);
        track_states.resize_with(MAX_METER_TRACKS, || {
            TrackRenderState::new(sample_rate as f32)
        });

        Self {
            sample_rate: sample_rate as f32,
            max_block,
            clock: TransportClock::new(sample_rate, initial_bpm, shared.clone()),
            shared,
            handoff,
            commands,
            trash,
            meter_tx,
            spectrum_tx,
            pool,
            track_states,
            track_buffer: AudioBlock::new(max_block),
            master: AudioBlock::new(max_block),
            metronome: Metronome::new(sample_rate),
            note_scratch: Vec::with_capacity(EVENT_SCRATCH),
            step_scratch: Vec::with_capacity(EVENT_SCRATCH),
            record_taps: Vec::with_capacity(MAX_METER_TRACKS),
            pending_meter: MeterFrame::empty(),
        }
    }

    /// Fill an interleaved stereo output buffer, chunked to max_block
    pub fn render(&mut self, output: &mut [f32]) {
        let mut offset = 0;
        while offset < output.len() {
            let chunk_frames = ((output.len() - offset) / 2).min(self.max_block);
            if chunk_frames == 0 {
                break;
            }
            let end = offset + chunk_frames * 2;
            self.render_block(&mut output[offset..end]);
            offset = end;
        }
    }

    fn render_block(&mut self, output: &mut [f32]) {
        let frames = output.len() / 2;

        self.apply_commands();

        let spec = self.handoff.load();
        let rolling = self.clock.state().is_rolling();
        let recording = self.clock.state() == crate::transport::TransportState::Recording;
        let start = self.clock.position_beats();
        let block_beats = if rolling {
            self.clock.block_beats(frames)
        } else {
            0.0
        };
        let end = start + block_beats;

        self.master.begin(frames);

        if rolling {
            let any_solo = spec
                .tracks
                .iter()
                .any(|t| t.controls.solo.load(Ordering::Relaxed));

            for (track_idx, track) in spec.tracks.iter().enumerate().take(MAX_METER_TRACKS) {
                let state = &mut self.track_states[track_idx];
                if state.track_id != track.track_id {
                    state.track_id = track.track_id;
                    state.synth.reset();
                    state.gain_left.snap(0.0);
                    state.gain_right.snap(0.0);
                }

                self.track_buffer.begin(frames);
                self.note_scratch.clear();
                self.step_scratch.clear();

                let has_instrument = track.controls.chain_enabled.load(Ordering::Relaxed)
                    && track.chain.iter().any(|slot| {
                        slot.is_instrument && !slot.bypassed.load(Ordering::Relaxed)
                    });

                // 1. Clip content into the track buffer
                for clip in &track.clips {
                    if !clip.intersects(start, end) {
                        continue;
                    }
                    match clip {
                        ClipSpec::Audio(audio_clip) => {
                            render_audio_clip(
                                &mut self.track_buffer,
                                audio_clip,
                                start,
                                block_beats,
                                self.clock.bpm(),
                            );
                        }
                        ClipSpec::Pattern(pattern_clip) => {
                            schedule_pattern_block(
                                pattern_clip,
                                start,
                                end,
                                block_beats,
                                frames,
                                has_instrument,
                                &mut self.note_scratch,
                                &mut self.step_scratch,
                            );
                        }
                    }
                }

                // 2. Default step synth for tracks without an instrument slot
                if !self.step_scratch.is_empty() || state.synth.active_voices() > 0 {
                    self.step_scratch.sort_unstable_by_key(|s| s.0);
                    let samples = self.track_buffer.samples_mut();
                    let mut next = 0;
                    for frame in 0..frames {
                        while next < self.step_scratch.len()
                            && self.step_scratch[next].0 <= frame
                        {
                            let (_, lane, velocity) = self.step_scratch[next];
                            state.synth.trigger(lane, velocity);
                            next += 1;
                        }
                        let sample = state.synth.tick();
                        samples[frame * 2] += sample;
                        samples[frame * 2 + 1] += sample;
                    }
                }

                // 3. Plugin chain in slot order; instruments get the notes
                if track.controls.chain_enabled.load(Ordering::Relaxed) {
                    for slot in &track.chain {
                        if slot.bypassed.load(Ordering::Relaxed) {
                            continue;
                        }
                        if let Some(processor) = self.pool[slot.slot].as_mut() {
                            let notes: &[NoteEvent] = if slot.is_instrument {
                                &self.note_scratch
                            } else {
                                &[]
                            };
                            processor.process(&mut self.track_buffer, notes);
                        }
                    }
                }

                // 4. Recording tap, pre-fader
                if recording && track.record_armed {
                    if let Some(tap) = self
                        .record_taps
                        .iter_mut()
                        .find(|t| t.track_id == track.track_id)
                    {
                        tap.capture(self.track_buffer.samples());
                    }
                }

                // 5. Volume/pan with constant-power law, mute/solo precedence
                let controls = &track.controls;
                let audible = !controls.mute.load(Ordering::Relaxed)
                    && (!any_solo || controls.solo.load(Ordering::Relaxed));
                let volume = if audible {
                    controls.volume.load(Ordering::Relaxed)
                } else {
                    0.0
                };
                let pan = controls.pan.load(Ordering::Relaxed);
                // Constant-power panning: both legs at 0.707 when centered
                let angle = (pan + 1.0) * std::f32::consts::FRAC_PI_4;
                state.gain_left.set_target(angle.cos() * volume, frames);
                state.gain_right.set_target(angle.sin() * volume, frames);

                let mut peak = 0.0f32;
                let mut sum_sq = 0.0f64;
                {
                    let track_samples = self.track_buffer.samples();
                    let master_samples = self.master.samples_mut();
                    for frame in 0..frames {
                        let gl = state.gain_left.next();
                        let gr = state.gain_right.next();
                        let l = track_samples[frame * 2] * gl;
                        let r = track_samples[frame * 2 + 1] * gr;
                        master_samples[frame * 2] += l;
                        master_samples[frame * 2 + 1] += r;
                        peak = peak.max(l.abs()).max(r.abs());
                        sum_sq += f64::from(l) * f64::from(l) + f64::from(r) * f64::from(r);
                    }
                }

                let rms = if frames > 0 {
                    (sum_sq / (frames * 2) as f64).sqrt() as f32
                } else {
                    0.0
                };
                self.push_meter_lane(track_idx, spec.tracks.len(), track.track_id, peak, rms);
            }

            // Metronome on the master bus
            if spec.metronome_enabled {
                self.metronome.render(
                    self.master.samples_mut(),
                    start,
                    end,
                    spec.beats_per_bar,
                );
            }
        } else {
            // Silent block; still report zeroed meters so UI decays
            for (track_idx, track) in spec.tracks.iter().enumerate().take(MAX_METER_TRACKS) {
                self.push_meter_lane(track_idx, spec.tracks.len(), track.track_id, 0.0, 0.0);
            }
        }

        // Copy master to device, hard-limited
        let master_samples = self.master.samples();
        for (out, &sample) in output.iter_mut().zip(master_samples.iter()) {
            *out = sample.clamp(-1.0, 1.0);
        }

        // Spectrum tap: mono master
        for frame in 0..frames {
            let mono = (master_samples[frame * 2] + master_samples[frame * 2 + 1]) * 0.5;
            if self.spectrum_tx.push(mono).is_err() {
                break;
            }
        }

        self.clock.advance(frames);
        self.shared.blocks_rendered.fetch_add(1, Ordering::Release);
    }

    /// Accumulate one lane into a pending meter frame; flush on the last.
    fn push_meter_lane(
        &mut self,
        track_idx: usize,
        track_count: usize,
        track_id: u32,
        peak: f32,
        rms: f32,
    ) {
        if track_idx == 0 {
            self.pending_meter = MeterFrame::empty();
        }
        self.pending_meter.push(MeterLane {
            track_id,
            peak,
            rms,
        });
        let last = track_idx + 1 == track_count.min(MAX_METER_TRACKS);
        if last {
            let _ = self.meter_tx.push(self.pending_meter);
        }
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                EngineCommand::Play { recording } => self.clock.play(recording),
                EngineCommand::Pause => self.clock.pause(),
                EngineCommand::Stop => {
                    self.clock.stop();
                    self.metronome.reset();
                }
                EngineCommand::SeekBeats(beats) => {
                    self.clock.seek_beats(beats);
                    self.metronome.reset();
                }
                EngineCommand::SetBpm(bpm) => self.clock.set_bpm(bpm),
                EngineCommand::InstallProcessor { slot, processor } => {
                    if let Some(old) = self.pool[slot].replace(processor) {
                        let _ = self.trash.push(Trash::Processor(old));
                    }
                }
                EngineCommand::RemoveProcessor { slot } => {
                    if let Some(old) = self.pool[slot].take() {
                        let _ = self.trash.push(Trash::Processor(old));
                    }
                }
                EngineCommand::SetProcessorParam {
                    slot,
                    param_index,
                    normalized,
                } => {
                    if let Some(processor) = self.pool[slot].as_mut() {
                        processor.set_param(param_index, normalized);
                    }
                }
                EngineCommand::ResetProcessor { slot } => {
                    if let Some(processor) = self.pool[slot].as_mut() {
                        processor.reset();
                    }
                }
                EngineCommand::StartRecording { taps } => {
                    if !self.record_taps.is_empty() {
                        let old = std::mem::take(&mut self.record_taps);
                        let _ = self.trash.push(Trash::Taps(old));
                    }
                    self.record_taps = taps;
                }
                EngineCommand::StopRecording => {
                    let old = std::mem::take(&mut self.record_taps);
                    let _ = self.trash.push(Trash::Taps(old));
                }
            }
        }
    }
}

/// Mix one audio clip's intersecting region into the track buffer.
///
/// Audio plays at its natural rate: the source playhead advances with wall
/// time derived from the tempo, independent of the musical grid.
fn render_audio_clip(
    buffer: &mut AudioBlock,
    clip: &crate::graph::AudioClipSpec,
    block_start_beats: f64,
    block_beats: f64,
    bpm: f64,
) {
    let frames = buffer.frames();
    if frames == 0 || block_beats <= 0.0 {
        return;
    }
    let seconds_per_beat = 60.0 / bpm;
    let source_rate = f64::from(clip.audio.sample_rate);
    let clip_end = clip.start_beats + clip.length_beats;
    let beats_per_frame = block_beats / frames as f64;

    let samples = buffer.samples_mut();
    for frame in 0..frames {
        let beat = block_start_beats + frame as f64 * beats_per_frame;
        if beat < clip.start_beats || beat >= clip_end {
            continue;
        }
        let clip_seconds = (beat - clip.start_beats) * seconds_per_beat;
        let source_frame = (clip_seconds * source_rate) as usize;
        let (l, r) = clip.audio.frame(source_frame);
        samples[frame * 2] += l;
        samples[frame * 2 + 1] += r;
    }
}

/// Collect the pattern steps falling inside this block.
#[allow(clippy::too_many_arguments)]
fn schedule_pattern_block(
    clip: &crate::graph::PatternClipSpec,
    block_start: f64,
    block_end: f64,
    block_beats: f64,
    frames: usize,
    has_instrument: bool,
    note_scratch: &mut Vec<NoteEvent>,
    step_scratch: &mut Vec<(usize, DrumLane, f32)>,
) {
    if clip.period_beats <= 0.0 || block_beats <= 0.0 {
        return;
    }
    let clip_end = clip.start_beats + clip.length_beats;

    let first_period = (((block_start - clip.start_beats) / clip.period_beats).floor()).max(0.0)
        as i64;
    let last_period = ((block_end - clip.start_beats) / clip.period_beats).floor() as i64;

    for period in first_period..=last_period {
        let base = clip.start_beats + period as f64 * clip.period_beats;
        for step in &clip.steps {
            let absolute = base + step.offset_beats;
            if absolute < block_start || absolute >= block_end || absolute >= clip_end {
                continue;
            }
            let frame = (((absolute - block_start) / block_beats) * frames as f64) as usize;
            let frame = frame.min(frames.saturating_sub(1));
            if has_instrument {
                if note_scratch.len() < note_scratch.capacity() {
                    note_scratch.push(NoteEvent {
                        frame,
                        note: step.lane.note(),
                        velocity: step.velocity,
                    });
                }
            } else if step_scratch.len() < step_scratch.capacity() {
                step_scratch.push((frame, step.lane, step.velocity));
            }
        }
    }
}

//! Engine facade for non-audio threads
//!
//! [`AudioEngine`] owns everything the session orchestrator talks to: the
//! command sender, the graph handoff, slot allocation for processors, the
//! meter/spectrum receivers, and the recording manager. Constructing an
//! engine also yields the [`Renderer`] to be driven by a device callback
//! (or directly, in tests).

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::commands::{command_ring, drain_trash, trash_ring, CommandSender, EngineCommand, Trash};
use crate::device::OutputConfig;
use crate::graph::{GraphHandoff, GraphSpec, SlotIndex, MAX_SLOTS};
use crate::meters::{meter_ring, MeterFrame, MeterReceiver};
use crate::processor::Processor;
use crate::recording::{RecordedTake, RecordingManager};
use crate::render::Renderer;
use crate::spectrum::{spectrum_ring, SpectrumTap, BANDS, WINDOW};
use crate::transport::SharedTransport;

/// Engine construction parameters
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub output: OutputConfig,
    pub initial_bpm: u32,
    /// Where recording spill files land
    pub spill_dir: PathBuf,
    /// Fall back to the null driver when no device exists
    pub allow_null_device: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            initial_bpm: 120,
            spill_dir: std::env::temp_dir().join("thestuu-spill"),
            allow_null_device: true,
        }
    }
}

struct SlotAllocator {
    used: [bool; MAX_SLOTS],
}

impl SlotAllocator {
    fn new() -> Self {
        Self {
            used: [false; MAX_SLOTS],
        }
    }

    fn allocate(&mut self) -> Option<SlotIndex> {
        let slot = self.used.iter().position(|used| !used)?;
        self.used[slot] = true;
        Some(slot)
    }

    fn release(&mut self, slot: SlotIndex) {
        if slot < MAX_SLOTS {
            self.used[slot] = false;
        }
    }
}

/// Non-audio-side handle to the realtime core
///
/// The device stream itself (not `Send` on every platform) is owned by
/// whoever drives the [`Renderer`]; this handle carries only the lock-free
/// plumbing, so it shares freely across threads.
pub struct AudioEngine {
    config: EngineConfig,
    shared: Arc<SharedTransport>,
    handoff: Arc<GraphHandoff>,
    commands: CommandSender,
    meters: Mutex<MeterReceiver>,
    spectrum: Mutex<SpectrumTap>,
    trash: Mutex<rtrb::Consumer<Trash>>,
    recording: Mutex<RecordingManager>,
    slots: Mutex<SlotAllocator>,
}

impl AudioEngine {
    /// Build the engine and its renderer.
    ///
    /// The renderer must then be handed to [`AudioEngine::start_device`] or
    /// driven manually (tests).
    pub fn build(config: EngineConfig) -> (Arc<Self>, Renderer) {
        let shared = SharedTransport::new();
        let handoff = GraphHandoff::new(shared.clone());
        let (command_tx, command_rx) = command_ring();
        let (trash_tx, trash_rx) = trash_ring();
        // ~1 s of block frames at small block sizes
        let (meter_tx, meter_rx) = meter_ring(512);
        let (spectrum_tx, spectrum_rx) = spectrum_ring(WINDOW * 4);

        let renderer = Renderer::new(
            config.output.sample_rate,
            config.output.block_size as usize,
            shared.clone(),
            handoff.clone(),
            command_rx,
            trash_tx,
            meter_tx,
            spectrum_tx,
            config.initial_bpm,
        );

        let engine = Arc::new(Self {
            shared,
            handoff,
            commands: command_tx,
            meters: Mutex::new(meter_rx),
            spectrum: Mutex::new(SpectrumTap::new(config.output.sample_rate, spectrum_rx)),
            trash: Mutex::new(trash_rx),
            recording: Mutex::new(RecordingManager::new(
                config.output.sample_rate,
                config.spill_dir.clone(),
            )),
            slots: Mutex::new(SlotAllocator::new()),
            config,
        });

        (engine, renderer)
    }

    pub fn output_config(&self) -> &OutputConfig {
        &self.config.output
    }

    pub fn allow_null_device(&self) -> bool {
        self.config.allow_null_device
    }

    pub fn transport(&self) -> &Arc<SharedTransport> {
        &self.shared
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.output.sample_rate
    }

    // === Transport ===

    pub fn play(&self) {
        self.commands.send(EngineCommand::Play { recording: false });
    }

    pub fn pause(&self) {
        self.commands.send(EngineCommand::Pause);
    }

    /// Stop playback; if recording, finalize and report the takes.
    pub fn stop(&self, beats_per_bar: f64) -> Vec<RecordedTake> {
        self.commands.send(EngineCommand::StopRecording);
        self.commands.send(EngineCommand::Stop);
        self.recording.lock().unwrap().stop(beats_per_bar)
    }

    pub fn seek_beats(&self, beats: f64) {
        self.commands.send(EngineCommand::SeekBeats(beats.max(0.0)));
    }

    pub fn set_bpm(&self, bpm: u32) {
        self.commands.send(EngineCommand::SetBpm(bpm));
    }

    /// Arm the spill path and start rolling in Recording state
    pub fn play_recording(&self, armed_tracks: &[u32]) -> Result<()> {
        let start_beats = self.shared.position_beats();
        let taps = self
            .recording
            .lock()
            .unwrap()
            .start(armed_tracks, start_beats)?;
        self.commands.send(EngineCommand::StartRecording { taps });
        self.commands.send(EngineCommand::Play { recording: true });
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.recording.lock().unwrap().is_recording()
    }

    // === Graph ===

    /// Publish a new graph description; also reclaims retired ones
    pub fn publish_graph(&self, spec: GraphSpec) {
        self.handoff.publish(spec);
        self.reclaim();
    }

    /// Drop retired graphs and drain the trash ring
    pub fn reclaim(&self) {
        self.handoff.reclaim();
        drain_trash(&mut self.trash.lock().unwrap());
    }

    // === Processors ===

    /// Reserve a pool slot for a processor about to be installed
    pub fn allocate_slot(&self) -> Option<SlotIndex> {
        self.slots.lock().unwrap().allocate()
    }

    /// Install a prepared processor into its slot
    pub fn install_processor(&self, slot: SlotIndex, mut processor: Box<dyn Processor>) {
        processor.prepare(
            self.config.output.sample_rate as f32,
            self.config.output.block_size as usize,
        );
        self.commands
            .send(EngineCommand::InstallProcessor { slot, processor });
    }

    /// Two-phase removal: the graph published without the slot first, then
    /// this tells the callback to hand the box back for off-thread drop.
    pub fn remove_processor(&self, slot: SlotIndex) {
        self.commands.send(EngineCommand::RemoveProcessor { slot });
        self.slots.lock().unwrap().release(slot);
    }

    pub fn set_processor_param(&self, slot: SlotIndex, param_index: usize, normalized: f32) {
        self.commands.send(EngineCommand::SetProcessorParam {
            slot,
            param_index,
            normalized: normalized.clamp(0.0, 1.0),
        });
    }

    // === Taps ===

    /// Freshest meter frame, if any blocks rendered since the last call
    pub fn latest_meters(&self) -> Option<MeterFrame> {
        self.meters.lock().unwrap().latest()
    }

    /// Current spectrum magnitudes (poll advances the analyzer)
    pub fn spectrum(&self) -> [f32; BANDS] {
        let mut tap = self.spectrum.lock().unwrap();
        tap.poll();
        *tap.magnitudes()
    }
}

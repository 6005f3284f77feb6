//! The session worker
//!
//! Single writer of the Project. Requests drain from one FIFO queue; each
//! is validated and applied to a working copy, side effects (audio graph,
//! plugin host, disk) run, then the copy commits and the new state
//! broadcasts. A failing operation leaves the committed project untouched.
//!
//! Plugin host calls park the worker on a reply channel with a bounded
//! wait; expiry surfaces as a `timeout` error without retry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use stu_audio::{AudioEngine, TransportState};
use stu_config::DataPaths;
use stu_model::{
    AudioSource, Bars, ClipContent, MidiSource, NodeInstance, NodeType, ParameterSpec, Project,
    ProjectStore, StoreError, Tempo,
};
use stu_plugins::{PluginHost, PluginHostError, PluginKind};
use stu_proto::{ClientRequest, ServerEvent, WireError};

use crate::graph_build::{build_graph, GraphBindings};
use crate::media::{analyze_file, MediaStore};
use crate::mutations;

/// Coalescing window for `project.update_view` persistence
pub const VIEW_SAVE_DEBOUNCE: Duration = Duration::from_millis(140);

/// Queue depth for client requests
const REQUEST_QUEUE: usize = 256;
/// Broadcast buffer; laggards resubscribe and get a fresh snapshot
const EVENT_BUFFER: usize = 256;

/// Tempo info the event pump needs without touching the project
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoInfo {
    pub bpm: u32,
    pub beats_per_bar: f64,
}

pub enum SessionCommand {
    Apply {
        request: ClientRequest,
        reply: oneshot::Sender<Result<Value, WireError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Project>,
    },
    Shutdown,
}

/// Cheap-to-clone handle the gateway talks to
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<ServerEvent>,
    media: MediaStore,
    tempo: watch::Receiver<TempoInfo>,
    startup_warnings: Arc<Vec<String>>,
}

impl SessionHandle {
    /// Enqueue a mutation and await its ack
    pub async fn request(&self, request: ClientRequest) -> Result<Value, WireError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Apply {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| WireError::backend_unavailable("session worker is gone"))?;
        reply_rx
            .await
            .map_err(|_| WireError::backend_unavailable("session worker dropped the request"))?
    }

    /// Current committed project state
    pub async fn snapshot(&self) -> Result<Project, WireError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| WireError::backend_unavailable("session worker is gone"))?;
        reply_rx
            .await
            .map_err(|_| WireError::backend_unavailable("session worker dropped the request"))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Store and analyze an upload off the session worker
    pub async fn upload_media(
        &self,
        filename: String,
        bytes: Vec<u8>,
    ) -> Result<stu_proto::UploadResponse, WireError> {
        let media = self.media.clone();
        tokio::task::spawn_blocking(move || media.store_upload(&filename, &bytes))
            .await
            .map_err(|_| WireError::backend_unavailable("analysis worker panicked"))?
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    pub fn tempo(&self) -> watch::Receiver<TempoInfo> {
        self.tempo.clone()
    }

    /// Warnings from startup (e.g. project fallback), shown to new clients
    pub fn startup_warnings(&self) -> &[String] {
        &self.startup_warnings
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
    }
}

/// Spawn the session worker and return its handle.
///
/// Loads the named project (collapsing parse failures to a default with a
/// warning), publishes the initial graph, and starts draining requests.
pub fn spawn(
    engine: Arc<AudioEngine>,
    plugin_host: PluginHost,
    paths: &DataPaths,
    project_name: &str,
) -> (SessionHandle, tokio::task::JoinHandle<()>) {
    let store = ProjectStore::new(&paths.projects_dir);
    let media = MediaStore::new(&paths.media_dir);

    let mut warnings = Vec::new();
    let project = match store.load_or_default(project_name) {
        Ok(loaded) => {
            if !loaded.upgrade.is_empty() {
                warnings.push(format!(
                    "project upgraded from a legacy format ({} changes)",
                    loaded.upgrade.changes.len()
                ));
            }
            loaded.project
        }
        Err(StoreError::Invalid(validation)) => {
            warnings.push(format!(
                "project failed validation, starting fresh: {}",
                validation.messages().join("; ")
            ));
            Project::new(project_name)
        }
        Err(e) => {
            warnings.push(format!("project could not be loaded, starting fresh: {}", e));
            Project::new(project_name)
        }
    };

    let (command_tx, command_rx) = mpsc::channel(REQUEST_QUEUE);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
    let tempo = TempoInfo {
        bpm: project.bpm,
        beats_per_bar: project.time_signature.beats_per_bar(),
    };
    let (tempo_tx, tempo_rx) = watch::channel(tempo);

    engine.set_bpm(project.bpm);
    crate::pump::spawn(engine.clone(), event_tx.clone(), tempo_rx.clone());

    let mut worker = SessionWorker {
        project,
        store,
        media: media.clone(),
        engine,
        plugin_host,
        bindings: GraphBindings::new(),
        events: event_tx.clone(),
        tempo: tempo_tx,
        transport: TransportState::Stopped,
        view_save_pending: false,
    };
    worker.rebuild_graph();

    let handle = SessionHandle {
        commands: command_tx,
        events: event_tx,
        media,
        tempo: tempo_rx,
        startup_warnings: Arc::new(warnings),
    };

    let join = tokio::spawn(worker.run(command_rx));
    (handle, join)
}

struct SessionWorker {
    project: Project,
    store: ProjectStore,
    media: MediaStore,
    engine: Arc<AudioEngine>,
    plugin_host: PluginHost,
    bindings: GraphBindings,
    events: broadcast::Sender<ServerEvent>,
    tempo: watch::Sender<TempoInfo>,
    transport: TransportState,
    view_save_pending: bool,
}

impl SessionWorker {
    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        tracing::info!(project.title = %self.project.title, "session worker running");

        loop {
            let debounce = tokio::time::sleep(VIEW_SAVE_DEBOUNCE);
            tokio::pin!(debounce);

            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(SessionCommand::Apply { request, reply }) => {
                            let event_name = request.event_name();
                            let result = self.handle(request);
                            if let Err(error) = &result {
                                tracing::debug!(
                                    request.event = event_name,
                                    error.code = error.code.as_str(),
                                    error.message = %error.message,
                                    "request failed"
                                );
                            }
                            let _ = reply.send(result);
                        }
                        Some(SessionCommand::Snapshot { reply }) => {
                            let _ = reply.send(self.project.clone());
                        }
                        Some(SessionCommand::Shutdown) | None => break,
                    }
                }
                _ = &mut debounce, if self.view_save_pending => {
                    self.flush_view_save();
                }
            }
        }

        self.flush_view_save();
        tracing::info!("session worker stopped");
    }

    /// Validate and apply one request against a working copy
    fn handle(&mut self, request: ClientRequest) -> Result<Value, WireError> {
        use ClientRequest::*;

        match request {
            // === Transport: no document mutation, no working copy ===
            TransportPlay {} => self.transport_play(),
            TransportPause {} => self.transport_pause(),
            TransportStop {} => self.transport_stop(),
            TransportSeek { position_bars } => {
                let bars = if position_bars.is_finite() {
                    position_bars.max(0.0)
                } else {
                    0.0
                };
                self.engine
                    .seek_beats(bars * self.project.time_signature.beats_per_bar());
                Ok(json!({ "position_bars": bars }))
            }
            TransportSetBpm { bpm } => {
                let clamped = bpm.clamp(
                    i64::from(stu_model::limits::BPM_MIN),
                    i64::from(stu_model::limits::BPM_MAX),
                ) as u32;
                let mut working = self.project.clone();
                working.bpm = clamped;
                self.engine.set_bpm(clamped);
                self.commit(working, false);
                Ok(json!({ "bpm": clamped }))
            }

            // === Structure: working-copy mutations ===
            TrackCreate { name } => self.mutate(true, |p| mutations::create_track(p, name)),
            TrackInsert { index, name } => {
                self.mutate(true, |p| mutations::insert_track(p, index, name))
            }
            TrackDuplicate { track_id } => self.track_duplicate(track_id),
            TrackDelete { track_id } => self.track_delete(vec![track_id]),
            TrackBulkDelete { track_ids } => self.track_delete(track_ids),
            TrackReorder { track_id, to_index } => {
                self.mutate(true, |p| mutations::reorder_track(p, track_id, to_index))
            }
            TrackRename { track_id, name } => {
                self.mutate(false, |p| mutations::rename_track(p, track_id, name))
            }
            TrackSetChainEnabled { track_id, enabled } => {
                let ack =
                    self.mutate(false, |p| mutations::set_chain_enabled(p, track_id, enabled))?;
                if let Some(controls) = self.bindings.controls.get(&track_id) {
                    controls
                        .chain_enabled
                        .store(enabled, std::sync::atomic::Ordering::Relaxed);
                }
                Ok(ack)
            }

            // === Mixer: document + atomic push, never a rebuild ===
            TrackSetVolume { track_id, volume } => {
                let ack = self.mutate(false, |p| mutations::set_volume(p, track_id, volume))?;
                if let Some(controls) = self.bindings.controls.get(&track_id) {
                    controls.set_volume(ack["volume"].as_f64().unwrap_or(volume) as f32);
                }
                Ok(ack)
            }
            TrackSetPan { track_id, pan } => {
                let ack = self.mutate(false, |p| mutations::set_pan(p, track_id, pan))?;
                if let Some(controls) = self.bindings.controls.get(&track_id) {
                    controls.set_pan(ack["pan"].as_f64().unwrap_or(pan) as f32);
                }
                Ok(ack)
            }
            TrackSetMute { track_id, mute } => {
                let ack = self.mutate(false, |p| mutations::set_mute(p, track_id, mute))?;
                if let Some(controls) = self.bindings.controls.get(&track_id) {
                    controls
                        .mute
                        .store(mute, std::sync::atomic::Ordering::Relaxed);
                }
                Ok(ack)
            }
            TrackSetSolo { track_id, solo } => {
                let ack = self.mutate(false, |p| mutations::set_solo(p, track_id, solo))?;
                if let Some(controls) = self.bindings.controls.get(&track_id) {
                    controls
                        .solo
                        .store(solo, std::sync::atomic::Ordering::Relaxed);
                }
                Ok(ack)
            }
            TrackSetRecordArm { track_id, armed } => {
                // Armed state rides in the graph description for the tap
                self.mutate(true, |p| mutations::set_record_arm(p, track_id, armed))
            }

            // === Clips ===
            ClipCreate {
                track_id,
                pattern_id,
                start,
                length,
                grid_step,
            } => self.mutate(true, |p| {
                mutations::create_clip(p, track_id, &pattern_id, start, length, grid_step)
            }),
            ClipMove {
                clip_id,
                start,
                track_id,
                grid_step,
            } => self.mutate(true, |p| {
                mutations::move_clip(p, &clip_id, start, track_id, grid_step)
            }),
            ClipResize {
                clip_id,
                length,
                grid_step,
            } => self.mutate(true, |p| {
                mutations::resize_clip(p, &clip_id, length, grid_step)
            }),
            ClipDelete { clip_id } => {
                self.mutate(true, |p| mutations::delete_clip(p, &clip_id))
            }
            ClipImportFile {
                track_id,
                path,
                start,
                grid_step,
            } => self.clip_import(track_id, &path, start, grid_step),

            // === Patterns ===
            PatternCreate { id, length, swing } => {
                self.mutate(true, |p| mutations::create_pattern(p, id, length, swing))
            }
            PatternUpdate {
                pattern_id,
                length,
                swing,
            } => self.mutate(true, |p| {
                mutations::update_pattern(p, &pattern_id, length, swing)
            }),
            PatternUpdateStep {
                pattern_id,
                lane,
                index,
                velocity,
            } => self.mutate(true, |p| {
                mutations::update_step(p, &pattern_id, &lane, index, velocity)
            }),

            // === Plugins ===
            VstScan {} => self.vst_scan(),
            VstAdd {
                track_id,
                plugin_uid,
                insert_index,
            } => self.vst_add(track_id, &plugin_uid, insert_index),
            VstRemove { node_id } => self.vst_remove(&node_id),
            VstReorder { track_id, from, to } => {
                self.mutate(true, |p| mutations::reorder_chain(p, track_id, from, to))
            }
            VstParamSet {
                node_id,
                param_id,
                value,
            } => self.vst_param_set(&node_id, &param_id, value),
            VstBypassSet { node_id, bypassed } => {
                let ack =
                    self.mutate(false, |p| mutations::set_node_bypass(p, &node_id, bypassed))?;
                if let Some(flag) = self.bindings.bypass.get(&node_id) {
                    flag.store(bypassed, std::sync::atomic::Ordering::Relaxed);
                }
                Ok(ack)
            }
            VstOpenEditor { node_id } => self.vst_open_editor(&node_id),

            // === Project ===
            ProjectSave {} => self.project_save(),
            ProjectUpdateView {
                view_bars,
                bar_width,
                show_track_nodes,
                metronome_enabled,
            } => {
                let rebuild = metronome_enabled.is_some();
                let ack = self.mutate(rebuild, |p| {
                    mutations::update_view(p, view_bars, bar_width, show_track_nodes, metronome_enabled)
                })?;
                // Coalesced persistence instead of a write per wheel tick
                self.view_save_pending = true;
                Ok(ack)
            }
        }
    }

    /// Working-copy pipeline for document-only mutations
    fn mutate<F>(&mut self, rebuild: bool, operation: F) -> Result<Value, WireError>
    where
        F: FnOnce(&mut Project) -> Result<Value, WireError>,
    {
        let mut working = self.project.clone();
        let ack = operation(&mut working)?;
        self.commit(working, rebuild);
        Ok(ack)
    }

    fn commit(&mut self, working: Project, rebuild: bool) {
        self.project = working;
        let tempo = TempoInfo {
            bpm: self.project.bpm,
            beats_per_bar: self.project.time_signature.beats_per_bar(),
        };
        let _ = self.tempo.send(tempo);
        if rebuild {
            self.rebuild_graph();
        }
        self.broadcast_state();
    }

    fn rebuild_graph(&mut self) {
        self.bindings.prune(&self.project);
        let spec = build_graph(&self.project, &mut self.bindings);
        self.engine.publish_graph(spec);
    }

    fn broadcast_state(&self) {
        let _ = self.events.send(ServerEvent::State {
            project: self.project.clone(),
        });
    }

    // === Transport ===

    fn transport_play(&mut self) -> Result<Value, WireError> {
        match self.transport {
            TransportState::Playing | TransportState::Recording => {
                // Idempotent while rolling
                Ok(json!({ "playing": true }))
            }
            TransportState::Stopped | TransportState::Paused => {
                let armed: Vec<u32> = self
                    .project
                    .mixer
                    .iter()
                    .filter(|c| c.record_armed)
                    .map(|c| c.track_id)
                    .collect();

                if armed.is_empty() {
                    self.engine.play();
                    self.transport = TransportState::Playing;
                } else {
                    tokio::task::block_in_place(|| self.engine.play_recording(&armed))
                        .map_err(|e| WireError::backend_unavailable(e.to_string()))?;
                    self.transport = TransportState::Recording;
                }
                Ok(json!({ "playing": true, "recording": self.transport == TransportState::Recording }))
            }
        }
    }

    fn transport_pause(&mut self) -> Result<Value, WireError> {
        if self.transport == TransportState::Recording {
            // Finalize the takes but keep the position
            self.finish_recording()?;
        }
        self.engine.pause();
        if self.transport.is_rolling() {
            self.transport = TransportState::Paused;
        }
        Ok(json!({ "playing": false }))
    }

    fn transport_stop(&mut self) -> Result<Value, WireError> {
        let mut ack = json!({ "playing": false });
        if self.transport == TransportState::Recording {
            let takes = self.finish_recording()?;
            if let (Some(ack_obj), Some(takes_obj)) = (ack.as_object_mut(), takes.as_object()) {
                for (key, value) in takes_obj {
                    ack_obj.insert(key.clone(), value.clone());
                }
            }
        } else {
            let _ = tokio::task::block_in_place(|| {
                self.engine
                    .stop(self.project.time_signature.beats_per_bar())
            });
        }
        // Stop always resets, even if take finalization already stopped us
        self.engine.seek_beats(0.0);
        self.transport = TransportState::Stopped;
        Ok(ack)
    }

    /// Stop the spill path and commit one AudioClip per take
    fn finish_recording(&mut self) -> Result<Value, WireError> {
        let beats_per_bar = self.project.time_signature.beats_per_bar();
        let takes = tokio::task::block_in_place(|| self.engine.stop(beats_per_bar));
        self.transport = TransportState::Stopped;

        if takes.is_empty() {
            return Ok(json!({ "takes": 0 }));
        }

        let mut working = self.project.clone();
        let mut created = Vec::new();
        for take in &takes {
            if take.duration_seconds <= 0.0 {
                continue;
            }
            let media_path = self.media.adopt(&take.path)?;
            let analysis = analyze_file(&media_path);
            let tempo = Tempo::new(working.bpm, working.time_signature);
            let length_bars = take.duration_seconds / tempo.bars_to_seconds(Bars(1.0));

            let source = AudioSource {
                source_name: media_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("take.wav")
                    .to_string(),
                source_format: "wav".to_string(),
                source_mime: Some("audio/wav".to_string()),
                source_path: media_path.to_string_lossy().into_owned(),
                source_size_bytes: std::fs::metadata(&media_path).ok().map(|m| m.len()),
                source_duration_seconds: Some(take.duration_seconds),
                waveform_peaks: analysis.waveform_peaks.unwrap_or_default(),
            };
            let ack = mutations::insert_import_clip(
                &mut working,
                take.track_id,
                ClipContent::Audio { source },
                take.start_bars,
                length_bars,
                stu_proto::default_grid_step(),
            )?;
            created.push(ack["clip_id"].clone());

            // Spill file is adopted; drop the original
            let _ = std::fs::remove_file(&take.path);
        }

        self.commit(working, true);
        tracing::info!(takes = created.len(), "recording committed");
        Ok(json!({ "takes": created.len(), "clip_ids": created }))
    }

    // === Clips ===

    fn clip_import(
        &mut self,
        track_id: u32,
        path: &str,
        start: f64,
        grid_step: f64,
    ) -> Result<Value, WireError> {
        let file = std::path::Path::new(path);
        if !self.media.contains(file) {
            return Err(WireError::invalid_request(
                "import path must come from a media upload",
            ));
        }
        if !file.exists() {
            return Err(WireError::not_found("media file", path));
        }

        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("import")
            .to_string();
        let extension = file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let analysis = tokio::task::block_in_place(|| analyze_file(file));
        let duration = analysis.duration_sec.unwrap_or(0.0);
        let tempo = Tempo::new(self.project.bpm, self.project.time_signature);
        let length_bars = (duration / tempo.bars_to_seconds(Bars(1.0))).max(f64::EPSILON);

        let content = if analysis.is_midi {
            ClipContent::Midi {
                source: MidiSource {
                    source_name: name,
                    source_format: extension,
                    source_path: path.to_string(),
                    source_duration_seconds: analysis.duration_sec,
                },
            }
        } else {
            ClipContent::Audio {
                source: AudioSource {
                    source_name: name,
                    source_format: extension.clone(),
                    source_mime: mime_for_extension(&extension),
                    source_path: path.to_string(),
                    source_size_bytes: std::fs::metadata(file).ok().map(|m| m.len()),
                    source_duration_seconds: analysis.duration_sec,
                    waveform_peaks: analysis.waveform_peaks.unwrap_or_default(),
                },
            }
        };

        self.mutate(true, |p| {
            mutations::insert_import_clip(p, track_id, content, start, length_bars, grid_step)
        })
    }

    // === Plugins ===

    fn vst_scan(&mut self) -> Result<Value, WireError> {
        let found = tokio::task::block_in_place(|| self.plugin_host.scan(Vec::new()))
            .map_err(map_plugin_error)?;

        let plugins: Vec<Value> = found
            .iter()
            .map(|descriptor| {
                json!({
                    "uid": descriptor.uid,
                    "name": descriptor.name,
                    "type": descriptor.uid.split(':').next().unwrap_or("internal"),
                    "kind": if descriptor.kind == PluginKind::Instrument { "instrument" } else { "effect" },
                    "is_native": descriptor.is_native,
                    "parameters": descriptor.parameters,
                })
            })
            .collect();
        Ok(json!({ "plugins": plugins }))
    }

    fn vst_add(
        &mut self,
        track_id: u32,
        plugin_uid: &str,
        insert_index: Option<u32>,
    ) -> Result<Value, WireError> {
        if self.project.track(track_id).is_none() {
            return Err(WireError::not_found("track", track_id));
        }

        let node_id = stu_model::generate_id("node");
        let instantiated =
            tokio::task::block_in_place(|| self.plugin_host.instantiate(plugin_uid, &node_id))
                .map_err(map_plugin_error)?;

        let Some(slot) = self.engine.allocate_slot() else {
            let _ = self.plugin_host.release(&node_id);
            return Err(WireError::backend_unavailable("processor pool exhausted"));
        };

        let descriptor = instantiated.descriptor;
        let node = NodeInstance {
            id: node_id.clone(),
            node_type: if descriptor.kind == PluginKind::Instrument {
                NodeType::VstInstrument
            } else {
                NodeType::VstEffect
            },
            plugin_uid: plugin_uid.to_string(),
            track_id,
            plugin_index: 0, // assigned by insert_node
            bypassed: false,
            params: descriptor
                .parameters
                .iter()
                .map(|p| (p.id.clone(), p.default))
                .collect::<BTreeMap<String, f64>>(),
            parameter_schema: descriptor
                .parameters
                .iter()
                .map(|p| ParameterSpec {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    min: p.min,
                    max: p.max,
                    value: p.default,
                })
                .collect(),
        };

        let mut working = self.project.clone();
        let plugin_index = match mutations::insert_node(&mut working, node, insert_index) {
            Ok(index) => index,
            Err(e) => {
                self.engine.remove_processor(slot);
                let _ = self.plugin_host.release(&node_id);
                return Err(e);
            }
        };

        self.engine.install_processor(slot, instantiated.processor);
        self.bindings.slots.insert(node_id.clone(), slot);
        self.commit(working, true);

        Ok(json!({
            "node_id": node_id,
            "plugin_index": plugin_index,
            "parameters": self.project.node(&node_id).map(|n| n.parameter_schema.clone()),
        }))
    }

    fn vst_remove(&mut self, node_id: &str) -> Result<Value, WireError> {
        let mut working = self.project.clone();
        let removed = mutations::remove_node(&mut working, node_id)?;

        // Two-phase teardown: the graph loses the slot first, the processor
        // leaves the pool next, the host releases the instance last.
        self.commit(working, true);
        if let Some(slot) = self.bindings.slots.remove(node_id) {
            self.engine.remove_processor(slot);
        }
        let _ = tokio::task::block_in_place(|| self.plugin_host.release(node_id));

        Ok(json!({ "node_id": removed.id, "track_id": removed.track_id }))
    }

    fn vst_param_set(
        &mut self,
        node_id: &str,
        param_id: &str,
        value: f64,
    ) -> Result<Value, WireError> {
        let mut working = self.project.clone();
        let (ack, param_index, clamped) =
            mutations::set_node_param(&mut working, node_id, param_id, value)?;

        if let Some(&slot) = self.bindings.slots.get(node_id) {
            self.engine
                .set_processor_param(slot, param_index, clamped as f32);
        }
        self.plugin_host.mirror_param(node_id, param_index, clamped);

        self.commit(working, false);
        Ok(ack)
    }

    fn vst_open_editor(&mut self, node_id: &str) -> Result<Value, WireError> {
        if self.project.node(node_id).is_none() {
            return Err(WireError::not_found("node", node_id));
        }
        let view = tokio::task::block_in_place(|| self.plugin_host.open_editor(node_id))
            .map_err(map_plugin_error)?;
        Ok(json!({ "editor": view }))
    }

    // === Persistence ===

    fn project_save(&mut self) -> Result<Value, WireError> {
        let path = tokio::task::block_in_place(|| self.store.save(&self.project))
            .map_err(map_store_error)?;
        self.view_save_pending = false;
        Ok(json!({ "path": path.to_string_lossy() }))
    }

    fn flush_view_save(&mut self) {
        if !self.view_save_pending {
            return;
        }
        self.view_save_pending = false;
        if let Err(e) = self.store.save(&self.project) {
            tracing::warn!(error = %e, "debounced view save failed");
        }
    }
}

fn mime_for_extension(extension: &str) -> Option<String> {
    let mime = match extension {
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "aac" => "audio/aac",
        "aiff" => "audio/aiff",
        _ => return None,
    };
    Some(mime.to_string())
}

fn map_plugin_error(error: PluginHostError) -> WireError {
    match error {
        PluginHostError::Timeout { operation } => WireError::timeout(operation, 10_000),
        PluginHostError::UnknownPlugin(uid) => WireError::not_found("plugin", uid),
        PluginHostError::UnknownNode(node_id) => WireError::not_found("node", node_id),
        PluginHostError::ExternalUnavailable(_) | PluginHostError::HostGone => {
            WireError::plugin(error.to_string())
        }
    }
}

fn map_store_error(error: StoreError) -> WireError {
    match error {
        StoreError::Invalid(validation) => {
            WireError::conflict(format!("project invalid: {}", validation.messages().join("; ")))
        }
        other => WireError::io(other),
    }
}

impl SessionWorker {
    /// Duplicate a track including its plugin chain
    fn track_duplicate(&mut self, track_id: u32) -> Result<Value, WireError> {
        let source_chain: Vec<NodeInstance> = self
            .project
            .track_chain(track_id)
            .into_iter()
            .cloned()
            .collect();

        let mut working = self.project.clone();
        let ack = mutations::duplicate_track(&mut working, track_id)?;
        let new_track_id = ack["track_id"].as_u64().unwrap_or(0) as u32;

        // Clone the chain through the host so each copy owns an instance
        let mut installed: Vec<(String, usize)> = Vec::new();
        for source in &source_chain {
            let node_id = stu_model::generate_id("node");
            let instantiated = match tokio::task::block_in_place(|| {
                self.plugin_host.instantiate(&source.plugin_uid, &node_id)
            }) {
                Ok(instantiated) => instantiated,
                Err(e) => {
                    self.rollback_installs(&installed);
                    return Err(map_plugin_error(e));
                }
            };
            let Some(slot) = self.engine.allocate_slot() else {
                let _ = self.plugin_host.release(&node_id);
                self.rollback_installs(&installed);
                return Err(WireError::backend_unavailable("processor pool exhausted"));
            };

            let mut node = source.clone();
            node.id = node_id.clone();
            node.track_id = new_track_id;
            if mutations::insert_node(&mut working, node, None).is_err() {
                self.engine.remove_processor(slot);
                let _ = self.plugin_host.release(&node_id);
                self.rollback_installs(&installed);
                return Err(WireError::conflict("failed to clone plugin chain"));
            }

            self.engine.install_processor(slot, instantiated.processor);
            // Restore the source's parameter values on the new instance
            for (param_index, spec) in source.parameter_schema.iter().enumerate() {
                self.engine
                    .set_processor_param(slot, param_index, spec.value as f32);
            }
            self.bindings.slots.insert(node_id.clone(), slot);
            installed.push((node_id, slot));
        }

        self.commit(working, true);
        Ok(ack)
    }

    fn rollback_installs(&mut self, installed: &[(String, usize)]) {
        for (node_id, slot) in installed {
            self.engine.remove_processor(*slot);
            let _ = self.plugin_host.release(node_id);
            self.bindings.slots.remove(node_id);
        }
    }

    /// Delete tracks and tear down their plugin instances
    fn track_delete(&mut self, track_ids: Vec<u32>) -> Result<Value, WireError> {
        let mut working = self.project.clone();
        let (ack, removed_nodes) = mutations::delete_tracks(&mut working, &track_ids)?;

        self.commit(working, true);
        for node_id in removed_nodes {
            if let Some(slot) = self.bindings.slots.remove(&node_id) {
                self.engine.remove_processor(slot);
            }
            let _ = tokio::task::block_in_place(|| self.plugin_host.release(&node_id));
        }
        Ok(ack)
    }
}

//! The plugin host thread
//!
//! All plugin instantiation, editor construction, and tear-down execute on
//! one designated host thread, the same thread that owns editor windows.
//! Cross-thread calls are marshaled through a channel; callers block on a
//! reply with a bounded wait and surface a timeout rather than hanging the
//! session worker.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use stu_audio::Processor;

use crate::api::PluginDescriptor;
use crate::builtin;
use crate::editor::EditorView;
use crate::error::PluginHostError;
use crate::scan::PluginRegistry;

/// Bounded wait for host-thread acknowledgment
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A freshly instantiated plugin: schema plus the realtime half
pub struct Instantiated {
    pub descriptor: PluginDescriptor,
    pub processor: Box<dyn Processor>,
}

enum HostRequest {
    Scan {
        extra_dirs: Vec<PathBuf>,
        reply: mpsc::Sender<Vec<PluginDescriptor>>,
    },
    CachedScan {
        reply: mpsc::Sender<Vec<PluginDescriptor>>,
    },
    Instantiate {
        uid: String,
        node_id: String,
        reply: mpsc::Sender<Result<Instantiated, PluginHostError>>,
    },
    Release {
        node_id: String,
        reply: mpsc::Sender<bool>,
    },
    MirrorParam {
        node_id: String,
        param_index: usize,
        value: f64,
    },
    OpenEditor {
        node_id: String,
        reply: mpsc::Sender<Result<EditorView, PluginHostError>>,
    },
    CloseEditor {
        node_id: String,
        reply: mpsc::Sender<bool>,
    },
    Shutdown,
}

struct InstanceState {
    descriptor: PluginDescriptor,
    /// Mirrored normalized values, index-aligned with the schema
    values: Vec<f64>,
}

/// Host-thread state
struct HostThread {
    registry: PluginRegistry,
    instances: HashMap<String, InstanceState>,
    open_editors: HashMap<String, EditorView>,
}

impl HostThread {
    fn run(receiver: mpsc::Receiver<HostRequest>) {
        let mut host = Self {
            registry: PluginRegistry::new(),
            instances: HashMap::new(),
            open_editors: HashMap::new(),
        };

        while let Ok(request) = receiver.recv() {
            match request {
                HostRequest::Scan { extra_dirs, reply } => {
                    let _ = reply.send(host.registry.scan(&extra_dirs));
                }
                HostRequest::CachedScan { reply } => {
                    if host.registry.is_empty() {
                        host.registry.scan(&[]);
                    }
                    let _ = reply.send(host.registry.cached());
                }
                HostRequest::Instantiate {
                    uid,
                    node_id,
                    reply,
                } => {
                    let _ = reply.send(host.instantiate(&uid, &node_id));
                }
                HostRequest::Release { node_id, reply } => {
                    let _ = reply.send(host.release(&node_id));
                }
                HostRequest::MirrorParam {
                    node_id,
                    param_index,
                    value,
                } => {
                    if let Some(instance) = host.instances.get_mut(&node_id) {
                        if let Some(slot) = instance.values.get_mut(param_index) {
                            *slot = value.clamp(0.0, 1.0);
                        }
                    }
                    // Keep an open fallback editor in sync
                    if let Some(instance) = host.instances.get(&node_id) {
                        if let Some(editor) = host.open_editors.get_mut(&node_id) {
                            *editor = EditorView::fallback(
                                &node_id,
                                &instance.descriptor,
                                &instance.values,
                            );
                        }
                    }
                }
                HostRequest::OpenEditor { node_id, reply } => {
                    let _ = reply.send(host.open_editor(&node_id));
                }
                HostRequest::CloseEditor { node_id, reply } => {
                    let _ = reply.send(host.open_editors.remove(&node_id).is_some());
                }
                HostRequest::Shutdown => break,
            }
        }

        tracing::debug!("plugin host thread exiting");
    }

    fn instantiate(&mut self, uid: &str, node_id: &str) -> Result<Instantiated, PluginHostError> {
        if let Some((descriptor, processor)) = builtin::instantiate(uid) {
            let values: Vec<f64> = descriptor.parameters.iter().map(|p| p.default).collect();
            self.instances.insert(
                node_id.to_string(),
                InstanceState {
                    descriptor: descriptor.clone(),
                    values,
                },
            );
            tracing::info!(plugin.uid = uid, node.id = node_id, "plugin instantiated");
            return Ok(Instantiated {
                descriptor,
                processor,
            });
        }

        // Known external bundle but no loaded runtime to host it
        if self.registry.is_empty() {
            self.registry.scan(&[]);
        }
        if self.registry.get(uid).is_some() {
            return Err(PluginHostError::ExternalUnavailable(uid.to_string()));
        }
        Err(PluginHostError::UnknownPlugin(uid.to_string()))
    }

    /// Editors close before the instance goes away
    fn release(&mut self, node_id: &str) -> bool {
        self.open_editors.remove(node_id);
        let removed = self.instances.remove(node_id).is_some();
        if removed {
            tracing::info!(node.id = node_id, "plugin instance released");
        }
        removed
    }

    fn open_editor(&mut self, node_id: &str) -> Result<EditorView, PluginHostError> {
        // Reveal an existing window instead of stacking another
        if let Some(existing) = self.open_editors.get(node_id) {
            return Ok(existing.clone());
        }
        let instance = self
            .instances
            .get(node_id)
            .ok_or_else(|| PluginHostError::UnknownNode(node_id.to_string()))?;

        let view = EditorView::fallback(node_id, &instance.descriptor, &instance.values);
        self.open_editors.insert(node_id.to_string(), view.clone());
        tracing::info!(node.id = node_id, editor.kind = %view.kind, "editor opened");
        Ok(view)
    }
}

/// Handle to the host thread; cloneable across the session side
pub struct PluginHost {
    sender: mpsc::Sender<HostRequest>,
    handle: Option<JoinHandle<()>>,
}

impl PluginHost {
    /// Spawn the host thread
    pub fn spawn() -> Self {
        let (sender, receiver) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("stu-plugin-host".to_string())
            .spawn(move || HostThread::run(receiver))
            .expect("failed to spawn plugin host thread");

        Self {
            sender,
            handle: Some(handle),
        }
    }

    fn dispatch<T>(
        &self,
        operation: &'static str,
        request: HostRequest,
        reply: mpsc::Receiver<T>,
    ) -> Result<T, PluginHostError> {
        self.sender
            .send(request)
            .map_err(|_| PluginHostError::HostGone)?;
        reply
            .recv_timeout(DISPATCH_TIMEOUT)
            .map_err(|_| PluginHostError::Timeout { operation })
    }

    /// Full rescan of built-ins plus external directories
    pub fn scan(&self, extra_dirs: Vec<PathBuf>) -> Result<Vec<PluginDescriptor>, PluginHostError> {
        let (tx, rx) = mpsc::channel();
        self.dispatch(
            "scan",
            HostRequest::Scan {
                extra_dirs,
                reply: tx,
            },
            rx,
        )
    }

    /// Cached results, scanning lazily on first use
    pub fn cached_scan(&self) -> Result<Vec<PluginDescriptor>, PluginHostError> {
        let (tx, rx) = mpsc::channel();
        self.dispatch("cached_scan", HostRequest::CachedScan { reply: tx }, rx)
    }

    pub fn instantiate(
        &self,
        uid: &str,
        node_id: &str,
    ) -> Result<Instantiated, PluginHostError> {
        let (tx, rx) = mpsc::channel();
        self.dispatch(
            "instantiate",
            HostRequest::Instantiate {
                uid: uid.to_string(),
                node_id: node_id.to_string(),
                reply: tx,
            },
            rx,
        )?
    }

    pub fn release(&self, node_id: &str) -> Result<bool, PluginHostError> {
        let (tx, rx) = mpsc::channel();
        self.dispatch(
            "release",
            HostRequest::Release {
                node_id: node_id.to_string(),
                reply: tx,
            },
            rx,
        )
    }

    /// Mirror a normalized value; fire-and-forget, never blocks the caller
    pub fn mirror_param(&self, node_id: &str, param_index: usize, value: f64) {
        let _ = self.sender.send(HostRequest::MirrorParam {
            node_id: node_id.to_string(),
            param_index,
            value,
        });
    }

    pub fn open_editor(&self, node_id: &str) -> Result<EditorView, PluginHostError> {
        let (tx, rx) = mpsc::channel();
        self.dispatch(
            "open_editor",
            HostRequest::OpenEditor {
                node_id: node_id.to_string(),
                reply: tx,
            },
            rx,
        )?
    }

    pub fn close_editor(&self, node_id: &str) -> Result<bool, PluginHostError> {
        let (tx, rx) = mpsc::channel();
        self.dispatch(
            "close_editor",
            HostRequest::CloseEditor {
                node_id: node_id.to_string(),
                reply: tx,
            },
            rx,
        )
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        let _ = self.sender.send(HostRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_lists_builtins() {
        let host = PluginHost::spawn();
        let found = host.cached_scan().unwrap();
        assert!(found.iter().any(|d| d.uid == builtin::ULTRASOUND_UID));
    }

    #[test]
    fn instantiate_and_release_builtin() {
        let host = PluginHost::spawn();
        let instantiated = host
            .instantiate(builtin::REVERB_UID, "node_r1")
            .unwrap();
        assert_eq!(instantiated.descriptor.uid, builtin::REVERB_UID);
        assert_eq!(instantiated.descriptor.parameters.len(), 3);

        assert!(host.release("node_r1").unwrap());
        assert!(!host.release("node_r1").unwrap());
    }

    #[test]
    fn unknown_uid_errors() {
        let host = PluginHost::spawn();
        match host.instantiate("internal:missing", "node_x") {
            Err(PluginHostError::UnknownPlugin(uid)) => assert_eq!(uid, "internal:missing"),
            other => panic!("unexpected {:?}", other.map(|i| i.descriptor.uid)),
        }
    }

    #[test]
    fn editor_opens_with_current_values() {
        let host = PluginHost::spawn();
        host.instantiate(builtin::CHORUS_UID, "node_c1").unwrap();
        host.mirror_param("node_c1", 0, 0.9);

        let view = host.open_editor("node_c1").unwrap();
        assert_eq!(view.kind, "fallback");
        assert_eq!(view.sliders.len(), 3);

        // Opening again reveals the same session
        let again = host.open_editor("node_c1").unwrap();
        assert_eq!(again.node_id, view.node_id);

        assert!(host.close_editor("node_c1").unwrap());
        assert!(!host.close_editor("node_c1").unwrap());
    }

    #[test]
    fn editor_for_unknown_node_errors() {
        let host = PluginHost::spawn();
        assert!(matches!(
            host.open_editor("nope"),
            Err(PluginHostError::UnknownNode(_))
        ));
    }

    #[test]
    fn release_closes_editor_first() {
        let host = PluginHost::spawn();
        host.instantiate(builtin::EQ_UID, "node_e1").unwrap();
        host.open_editor("node_e1").unwrap();

        assert!(host.release("node_e1").unwrap());
        // Editor is gone with the instance
        assert!(!host.close_editor("node_e1").unwrap());
    }
}

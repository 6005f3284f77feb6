//! Plugin host errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginHostError {
    #[error("unknown plugin uid {0:?}")]
    UnknownPlugin(String),

    #[error("external plugin {0:?} cannot be instantiated without a platform plugin runtime")]
    ExternalUnavailable(String),

    #[error("node {0:?} has no plugin instance")]
    UnknownNode(String),

    #[error("plugin host dispatch timed out during {operation}")]
    Timeout { operation: &'static str },

    #[error("plugin host thread is gone")]
    HostGone,
}

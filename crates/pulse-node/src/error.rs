use thiserror::Error;

use pulse_protocol::CodecError;

#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error("invalid heartbeat target '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("failed to open heartbeat stream to {peer}: {reason}")]
    Dial { peer: String, reason: String },

    #[error("invalid heartbeat config: {0}")]
    Config(String),

    #[error("heartbeat service is already being driven")]
    AlreadyRunning,

    #[error("heartbeat service has stopped")]
    Stopped,

    #[error("operation cancelled")]
    Cancelled,

    #[error("network host unavailable: {0}")]
    Host(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl HeartbeatError {
    pub(crate) fn invalid_address(addr: &str, reason: impl ToString) -> Self {
        Self::InvalidAddress { addr: addr.to_string(), reason: reason.to_string() }
    }

    pub(crate) fn config(reason: impl ToString) -> Self {
        Self::Config(reason.to_string())
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("CBOR encode error: {0}")]
    Encode(String),

    #[error("CBOR decode error: {0}")]
    Decode(String),

    #[error("stream ended inside a record ({read} of {expected} bytes)")]
    Truncated { read: usize, expected: usize },

    #[error("record too large: {size} bytes exceeds {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// True for errors caused by the bytes on the wire rather than the
    /// transport. The receiver drops the stream either way.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::Truncated { .. } | Self::FrameTooLarge { .. }
        )
    }
}

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// One status report pushed from a node to the aggregator.
///
/// Built fresh for every beat from a single head sample, so `head` and
/// `height` always describe the same snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// String form of the node's current chain head.
    pub head: String,
    /// Height of that head.
    pub height: u64,
    /// Operator-chosen label, copied from configuration.
    pub nickname: String,
}

impl Heartbeat {
    pub fn new(head: impl Into<String>, height: u64, nickname: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            height,
            nickname: nickname.into(),
        }
    }

    /// CBOR body of the record, without the length prefix.
    pub fn to_cbor(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(64 + self.head.len() + self.nickname.len());
        ciborium::into_writer(self, &mut buf).map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Decode a record body. The body must hold exactly one CBOR value.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut rest = bytes;
        let hb: Self = ciborium::from_reader(&mut rest).map_err(|e| CodecError::Decode(e.to_string()))?;
        if !rest.is_empty() {
            return Err(CodecError::Decode(format!(
                "trailing bytes in record ({} unread)",
                rest.len()
            )));
        }
        Ok(hb)
    }
}

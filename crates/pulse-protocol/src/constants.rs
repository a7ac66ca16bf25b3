// ============================================================================
// Protocol constants
// ============================================================================

use libp2p::StreamProtocol;

/// Protocol identifier string negotiated on every heartbeat stream.
pub const HEARTBEAT_PROTOCOL_ID: &str = "/pulse/heartbeat/1.0.0";

/// libp2p form of [`HEARTBEAT_PROTOCOL_ID`].
pub const HEARTBEAT_PROTOCOL: StreamProtocol = StreamProtocol::new(HEARTBEAT_PROTOCOL_ID);

// --- Framing ----------------------------------------------------------------

/// Size of the little-endian length prefix in front of every record.
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest record body a reader accepts. Heartbeats are a few dozen bytes;
/// anything near this limit is a corrupt or hostile stream.
pub const MAX_HEARTBEAT_SIZE: usize = 16 * 1024;

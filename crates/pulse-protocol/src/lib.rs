pub mod codec;
pub mod constants;
pub mod error;
pub mod message;

pub use codec::{read_heartbeat, write_heartbeat};
pub use constants::*;
pub use error::CodecError;
pub use message::Heartbeat;

use std::fmt;

use async_trait::async_trait;
use futures::io::AsyncWrite;
use libp2p::{multiaddr::Protocol, Multiaddr, PeerId, StreamProtocol};

use crate::error::HeartbeatError;

/// Parsed aggregator address: a multiaddr ending in `/p2p/<PeerId>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialTarget {
    pub peer: PeerId,
    pub addr: Multiaddr,
}

impl DialTarget {
    /// Parse a target address. Performs no network I/O.
    pub fn parse(input: &str) -> Result<Self, HeartbeatError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(HeartbeatError::invalid_address(input, "address is empty"));
        }
        let addr: Multiaddr = trimmed
            .parse()
            .map_err(|e| HeartbeatError::invalid_address(input, e))?;
        match addr.iter().last() {
            Some(Protocol::P2p(peer)) => Ok(Self { peer, addr }),
            _ => Err(HeartbeatError::invalid_address(input, "missing trailing /p2p/<peer id>")),
        }
    }
}

impl fmt::Display for DialTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

/// The slice of a networking host the heartbeat service needs: open an
/// outbound byte stream to a peer under a protocol id.
///
/// Address resolution, transport security and multiplexing belong to the
/// host. Implementations apply whatever dial deadline the transport has and
/// must not retry on their own.
#[async_trait]
pub trait StreamHost: Send + Sync + 'static {
    type Stream: AsyncWrite + Unpin + Send + 'static;

    async fn open_stream(
        &self,
        target: &DialTarget,
        protocol: StreamProtocol,
    ) -> Result<Self::Stream, HeartbeatError>;
}

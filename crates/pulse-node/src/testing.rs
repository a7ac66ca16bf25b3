//! In-memory [`StreamHost`] for exercising the service without a swarm.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use libp2p::{identity::Keypair, StreamProtocol};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use crate::{
    error::HeartbeatError,
    head::{HeadSnapshot, HeadSource},
    host::{DialTarget, StreamHost},
};

pub(crate) type MemoryStream = Compat<DuplexStream>;

/// A well-formed aggregator address for a random peer.
pub(crate) fn target_addr() -> String {
    let peer = Keypair::generate_ed25519().public().to_peer_id();
    format!("/ip4/127.0.0.1/tcp/9100/p2p/{peer}")
}

/// Every successful `open_stream` hands the aggregator end of a duplex pipe
/// to the receiver returned by [`MemoryHost::new`].
#[derive(Clone)]
pub(crate) struct MemoryHost {
    inner: Arc<Inner>,
}

struct Inner {
    reachable: AtomicBool,
    dials: AtomicUsize,
    accepted: mpsc::UnboundedSender<MemoryStream>,
}

impl MemoryHost {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<MemoryStream>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            reachable: AtomicBool::new(true),
            dials: AtomicUsize::new(0),
            accepted,
        };
        (Self { inner: Arc::new(inner) }, rx)
    }

    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    pub(crate) fn dials(&self) -> usize {
        self.inner.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamHost for MemoryHost {
    type Stream = MemoryStream;

    async fn open_stream(
        &self,
        target: &DialTarget,
        _protocol: StreamProtocol,
    ) -> Result<MemoryStream, HeartbeatError> {
        self.inner.dials.fetch_add(1, Ordering::SeqCst);
        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(HeartbeatError::Dial {
                peer: target.peer.to_string(),
                reason: "connection refused".into(),
            });
        }
        let (local, remote) = tokio::io::duplex(4096);
        self.inner
            .accepted
            .send(remote.compat())
            .map_err(|_| HeartbeatError::Dial {
                peer: target.peer.to_string(),
                reason: "aggregator gone".into(),
            })?;
        Ok(local.compat())
    }
}

/// Head source whose height counts how many times it was sampled.
#[derive(Clone, Default)]
pub(crate) struct CountingHead {
    calls: Arc<AtomicU64>,
}

impl CountingHead {
    pub(crate) fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HeadSource for CountingHead {
    fn head(&self) -> HeadSnapshot {
        let height = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        HeadSnapshot::new(format!("head-{height}"), height)
    }
}

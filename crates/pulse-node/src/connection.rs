use std::time::Duration;

use futures::io::AsyncWriteExt;
use pulse_protocol::HEARTBEAT_PROTOCOL;

use crate::{
    error::HeartbeatError,
    host::{DialTarget, StreamHost},
};

/// How long a replaced stream gets to flush and close before it is dropped.
const STREAM_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Owns the single outbound heartbeat stream.
///
/// Opening is one attempt per call; retry cadence belongs to the caller.
pub struct ConnectionManager<H: StreamHost> {
    host: H,
    target: String,
    stream: Option<H::Stream>,
}

impl<H: StreamHost> ConnectionManager<H> {
    pub fn new(host: H, target: impl Into<String>) -> Self {
        Self { host, target: target.into(), stream: None }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn stream_mut(&mut self) -> Option<&mut H::Stream> {
        self.stream.as_mut()
    }

    /// Open a fresh stream to the target, replacing the current one.
    ///
    /// An empty or unparsable target fails before anything touches the
    /// network and leaves the current stream in place. Otherwise the current
    /// stream is closed first, so at most one stream is ever live.
    pub async fn connect(&mut self) -> Result<(), HeartbeatError> {
        let target = DialTarget::parse(&self.target)?;
        self.close().await;

        let stream = self.host.open_stream(&target, HEARTBEAT_PROTOCOL).await?;
        tracing::info!(peer = %target.peer, addr = %target.addr, "heartbeat stream open");
        self.stream = Some(stream);
        Ok(())
    }

    /// Gracefully close the current stream, if any.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            match tokio::time::timeout(STREAM_CLOSE_GRACE, stream.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!("closing heartbeat stream: {e}"),
                Err(_) => tracing::debug!("heartbeat stream close timed out"),
            }
        }
    }

    /// Drop the current stream without waiting on the remote.
    pub fn release(&mut self) {
        self.stream = None;
    }
}

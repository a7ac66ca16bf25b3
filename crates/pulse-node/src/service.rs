use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{HeartbeatConfig, HeartbeatSettings},
    connection::ConnectionManager,
    error::HeartbeatError,
    head::HeadSource,
    host::StreamHost,
    scheduler::{BeatScheduler, LinkState},
};

/// Periodically reports this node's chain head to an aggregator.
///
/// Construct once, [`connect`](Self::connect) once, then [`run`](Self::run)
/// until the cancellation token fires. Delivery is best effort: beats due
/// while the link is down are skipped, never queued.
pub struct HeartbeatService<H: StreamHost> {
    settings: HeartbeatSettings,
    head: Box<dyn HeadSource>,
    /// Held for the whole of `connect` and `run`; a second driver fails fast.
    conn: Mutex<ConnectionManager<H>>,
    state: watch::Sender<LinkState>,
}

impl<H: StreamHost> HeartbeatService<H> {
    /// No I/O happens here. Fails only on malformed durations.
    pub fn new(
        host: H,
        config: &HeartbeatConfig,
        head: impl HeadSource + 'static,
    ) -> Result<Self, HeartbeatError> {
        let settings = config.validate()?;
        let conn = ConnectionManager::new(host, settings.target.clone());
        let (state, _) = watch::channel(LinkState::Disconnected);
        Ok(Self {
            settings,
            head: Box::new(head),
            conn: Mutex::new(conn),
            state,
        })
    }

    pub fn settings(&self) -> &HeartbeatSettings {
        &self.settings
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Open the initial stream to the aggregator.
    ///
    /// Fails with `InvalidAddress` (no network attempt), `Dial`, or
    /// `Cancelled` if `cancel` fires while dialing.
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<(), HeartbeatError> {
        let mut conn = self.conn.try_lock().map_err(|_| HeartbeatError::AlreadyRunning)?;
        if self.state() == LinkState::Stopped {
            return Err(HeartbeatError::Stopped);
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HeartbeatError::Cancelled),
            result = conn.connect() => result,
        };

        let state = if conn.is_connected() { LinkState::Connected } else { LinkState::Disconnected };
        self.state.send_replace(state);
        if let Err(ref e) = result {
            tracing::warn!(target_addr = %self.settings.target, "heartbeat connect failed: {e}");
        }
        result
    }

    /// Send beats until `cancel` fires, reconnecting on failure.
    ///
    /// Steady-state network errors never surface here; a cancelled run
    /// returns `Ok(())`. Only one `run` may be active per instance.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), HeartbeatError> {
        let mut conn = self.conn.try_lock().map_err(|_| HeartbeatError::AlreadyRunning)?;
        if self.state() == LinkState::Stopped {
            return Err(HeartbeatError::Stopped);
        }

        tracing::info!(
            target_addr = %self.settings.target,
            nickname = %self.settings.nickname,
            beat_period = ?self.settings.beat_period,
            "heartbeat service running",
        );

        BeatScheduler {
            conn: &mut *conn,
            head: self.head.as_ref(),
            settings: &self.settings,
            state: &self.state,
        }
        .run(&cancel)
        .await;
        Ok(())
    }
}

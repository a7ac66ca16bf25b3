use std::fmt;

use pulse_protocol::{write_heartbeat, Heartbeat};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    config::HeartbeatSettings,
    connection::ConnectionManager,
    error::HeartbeatError,
    head::HeadSource,
    host::StreamHost,
};

/// Link state of a heartbeat service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
    /// Terminal: the run loop has exited.
    Stopped,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Drives beats and reconnects for one service.
///
/// Everything happens on one task: the beat timer, the reconnect timer (armed
/// only while disconnected) and the cancellation token are awaited together,
/// so a beat and a reconnect attempt never overlap.
pub(crate) struct BeatScheduler<'a, H: StreamHost> {
    pub(crate) conn: &'a mut ConnectionManager<H>,
    pub(crate) head: &'a dyn HeadSource,
    pub(crate) settings: &'a HeartbeatSettings,
    pub(crate) state: &'a watch::Sender<LinkState>,
}

impl<H: StreamHost> BeatScheduler<'_, H> {
    pub(crate) async fn run(mut self, cancel: &CancellationToken) {
        let beat_period = self.settings.beat_period;
        let mut beat = interval_at(Instant::now() + beat_period, beat_period);
        beat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut reconnect = if self.conn.is_connected() {
            self.set_state(LinkState::Connected);
            None
        } else {
            self.set_state(LinkState::Disconnected);
            Some(self.reconnect_timer())
        };

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = beat.tick() => {
                    // Beats due while disconnected are dropped, not deferred.
                    if !self.conn.is_connected() {
                        tracing::trace!("beat skipped while disconnected");
                        continue;
                    }
                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        sent = self.beat() => sent,
                    };
                    match sent {
                        Ok(hb) => {
                            tracing::debug!(head = %hb.head, height = hb.height, "heartbeat sent");
                        }
                        Err(e) => {
                            tracing::warn!("heartbeat write failed, reconnecting every {:?}: {e}",
                                self.settings.reconnect_period);
                            self.conn.release();
                            self.set_state(LinkState::Disconnected);
                            reconnect = Some(self.reconnect_timer());
                        }
                    }
                }

                _ = tick_if_armed(&mut reconnect) => {
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        result = self.conn.connect() => result,
                    };
                    match result {
                        Ok(()) => {
                            tracing::info!("heartbeat link re-established");
                            reconnect = None;
                            self.set_state(LinkState::Connected);
                        }
                        Err(e) => tracing::warn!("heartbeat reconnect failed: {e}"),
                    }
                }
            }
        }

        self.conn.release();
        self.set_state(LinkState::Stopped);
        tracing::info!("heartbeat service stopped");
    }

    /// Sample the head once and write one record.
    async fn beat(&mut self) -> Result<Heartbeat, HeartbeatError> {
        let snapshot = self.head.head();
        let hb = Heartbeat::new(snapshot.head, snapshot.height, self.settings.nickname.as_str());
        let stream = self
            .conn
            .stream_mut()
            .ok_or_else(|| HeartbeatError::Host("no open heartbeat stream".into()))?;
        write_heartbeat(stream, &hb).await?;
        Ok(hb)
    }

    fn reconnect_timer(&self) -> Interval {
        let period = self.settings.reconnect_period;
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    }

    fn set_state(&self, state: LinkState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "heartbeat link state");
        }
    }
}

async fn tick_if_armed(timer: &mut Option<Interval>) -> Instant {
    match timer {
        Some(timer) => timer.tick().await,
        None => std::future::pending().await,
    }
}

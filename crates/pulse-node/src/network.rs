//! libp2p-backed [`StreamHost`].
//!
//! The swarm lives in a background driver task. Handles talk to it over a
//! command channel and open streams through `libp2p_stream::Control`, which
//! only makes progress while the driver keeps polling the swarm.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{
    core::transport::ListenerId,
    identify, identity, noise,
    swarm::{dial_opts::DialOpts, NetworkBehaviour, SwarmEvent},
    tcp, yamux, Multiaddr, PeerId, StreamProtocol, Swarm,
};
use tokio::sync::{mpsc, oneshot};

use crate::{
    error::HeartbeatError,
    host::{DialTarget, StreamHost},
};

/// Identify protocol string advertised by pulse nodes and aggregators.
pub const IDENTIFY_PROTOCOL: &str = "/pulse/identify/1.0.0";

const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);
const COMMAND_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Combined behaviour
// ============================================================================

#[derive(NetworkBehaviour)]
pub struct PulseBehaviour {
    pub identify: identify::Behaviour,
    /// Raw protocol streams (heartbeat records ride on these).
    pub stream: libp2p_stream::Behaviour,
}

/// Build a TCP + noise + yamux swarm carrying [`PulseBehaviour`].
pub fn build_swarm(keypair: identity::Keypair) -> Result<Swarm<PulseBehaviour>, HeartbeatError> {
    let swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(tcp::Config::default(), noise::Config::new, yamux::Config::default)
        .map_err(|e| HeartbeatError::Host(e.to_string()))?
        .with_behaviour(|key| PulseBehaviour {
            identify: identify::Behaviour::new(identify::Config::new(
                IDENTIFY_PROTOCOL.to_string(),
                key.public(),
            )),
            stream: libp2p_stream::Behaviour::new(),
        })
        .map_err(|e| HeartbeatError::Host(e.to_string()))?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(IDLE_CONNECTION_TIMEOUT))
        .build();
    Ok(swarm)
}

// ============================================================================
// Host handle
// ============================================================================

enum SwarmCommand {
    Dial {
        target: DialTarget,
        reply: oneshot::Sender<Result<(), String>>,
    },
    Listen {
        addr: Multiaddr,
        reply: oneshot::Sender<Result<Multiaddr, String>>,
    },
    ConnectedPeers {
        reply: oneshot::Sender<Vec<PeerId>>,
    },
}

/// Cloneable handle to a running swarm.
///
/// The driver task stops once every handle has been dropped.
#[derive(Clone)]
pub struct SwarmHost {
    local_peer_id: PeerId,
    commands: mpsc::Sender<SwarmCommand>,
    control: libp2p_stream::Control,
}

impl SwarmHost {
    /// Move `swarm` into a driver task on the current tokio runtime.
    pub fn spawn(swarm: Swarm<PulseBehaviour>) -> Self {
        let local_peer_id = *swarm.local_peer_id();
        let control = swarm.behaviour().stream.new_control();
        let (commands, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        tokio::spawn(SwarmDriver::new(swarm, rx).run());

        Self { local_peer_id, commands, control }
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Start listening on `addr` and return the first concrete address bound
    /// (so `/tcp/0` resolves to the real port).
    pub async fn listen_on(&self, addr: Multiaddr) -> Result<Multiaddr, HeartbeatError> {
        let (reply, rx) = oneshot::channel();
        self.send(SwarmCommand::Listen { addr, reply }).await?;
        rx.await
            .map_err(|_| driver_gone())?
            .map_err(HeartbeatError::Host)
    }

    pub async fn connected_peers(&self) -> Result<Vec<PeerId>, HeartbeatError> {
        let (reply, rx) = oneshot::channel();
        self.send(SwarmCommand::ConnectedPeers { reply }).await?;
        rx.await.map_err(|_| driver_gone())
    }

    /// Register the handler side of `protocol`: every stream a remote peer
    /// opens under it is yielded by the returned stream.
    pub fn accept(
        &self,
        protocol: StreamProtocol,
    ) -> Result<libp2p_stream::IncomingStreams, HeartbeatError> {
        self.control
            .clone()
            .accept(protocol)
            .map_err(|e| HeartbeatError::Host(e.to_string()))
    }

    /// Make sure a connection to `target` exists, dialing if needed.
    async fn dial(&self, target: &DialTarget) -> Result<(), HeartbeatError> {
        let (reply, rx) = oneshot::channel();
        self.send(SwarmCommand::Dial { target: target.clone(), reply }).await?;
        rx.await
            .map_err(|_| driver_gone())?
            .map_err(|reason| HeartbeatError::Dial { peer: target.peer.to_string(), reason })
    }

    async fn send(&self, cmd: SwarmCommand) -> Result<(), HeartbeatError> {
        self.commands.send(cmd).await.map_err(|_| driver_gone())
    }
}

#[async_trait]
impl StreamHost for SwarmHost {
    type Stream = libp2p::Stream;

    async fn open_stream(
        &self,
        target: &DialTarget,
        protocol: StreamProtocol,
    ) -> Result<libp2p::Stream, HeartbeatError> {
        self.dial(target).await?;
        let mut control = self.control.clone();
        control
            .open_stream(target.peer, protocol)
            .await
            .map_err(|e| HeartbeatError::Dial { peer: target.peer.to_string(), reason: e.to_string() })
    }
}

fn driver_gone() -> HeartbeatError {
    HeartbeatError::Host("swarm driver stopped".into())
}

// ============================================================================
// Driver task
// ============================================================================

struct SwarmDriver {
    swarm: Swarm<PulseBehaviour>,
    commands: mpsc::Receiver<SwarmCommand>,
    /// Dial requests waiting for ConnectionEstablished / OutgoingConnectionError.
    pending_dials: HashMap<PeerId, Vec<oneshot::Sender<Result<(), String>>>>,
    pending_listens: HashMap<ListenerId, oneshot::Sender<Result<Multiaddr, String>>>,
}

impl SwarmDriver {
    fn new(swarm: Swarm<PulseBehaviour>, commands: mpsc::Receiver<SwarmCommand>) -> Self {
        Self {
            swarm,
            commands,
            pending_dials: HashMap::new(),
            pending_listens: HashMap::new(),
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event);
                }
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
            }
        }
        tracing::debug!(peer_id = %self.swarm.local_peer_id(), "swarm driver stopped");
    }

    fn handle_command(&mut self, cmd: SwarmCommand) {
        match cmd {
            SwarmCommand::Dial { target, reply } => {
                if self.swarm.is_connected(&target.peer) {
                    let _ = reply.send(Ok(()));
                    return;
                }
                // A dial to this peer is already in flight; piggy-back on it
                // rather than opening a second connection.
                if let Some(waiters) = self.pending_dials.get_mut(&target.peer) {
                    waiters.push(reply);
                    return;
                }
                let opts = DialOpts::peer_id(target.peer)
                    .addresses(vec![target.addr.clone()])
                    .build();
                match self.swarm.dial(opts) {
                    Ok(()) => {
                        tracing::debug!(peer = %target.peer, addr = %target.addr, "dialing");
                        self.pending_dials.insert(target.peer, vec![reply]);
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e.to_string()));
                    }
                }
            }
            SwarmCommand::Listen { addr, reply } => match self.swarm.listen_on(addr) {
                Ok(id) => {
                    self.pending_listens.insert(id, reply);
                }
                Err(e) => {
                    let _ = reply.send(Err(e.to_string()));
                }
            },
            SwarmCommand::ConnectedPeers { reply } => {
                let _ = reply.send(self.swarm.connected_peers().copied().collect());
            }
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<PulseBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { listener_id, address } => {
                tracing::info!(%address, "listening");
                if let Some(reply) = self.pending_listens.remove(&listener_id) {
                    let _ = reply.send(Ok(address));
                }
            }
            SwarmEvent::ListenerError { listener_id, error } => {
                tracing::warn!("listener error: {error}");
                if let Some(reply) = self.pending_listens.remove(&listener_id) {
                    let _ = reply.send(Err(error.to_string()));
                }
            }
            SwarmEvent::ListenerClosed { listener_id, reason, .. } => {
                if let Some(reply) = self.pending_listens.remove(&listener_id) {
                    let reason = match reason {
                        Ok(()) => "listener closed".to_string(),
                        Err(e) => e.to_string(),
                    };
                    let _ = reply.send(Err(reason));
                }
            }
            SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
                tracing::debug!(peer = %peer_id, addr = %endpoint.get_remote_address(), "connection established");
                if let Some(waiters) = self.pending_dials.remove(&peer_id) {
                    for reply in waiters {
                        let _ = reply.send(Ok(()));
                    }
                }
            }
            SwarmEvent::OutgoingConnectionError { peer_id: Some(peer_id), error, .. } => {
                tracing::debug!(peer = %peer_id, "outgoing connection failed: {error}");
                if let Some(waiters) = self.pending_dials.remove(&peer_id) {
                    let reason = error.to_string();
                    for reply in waiters {
                        let _ = reply.send(Err(reason.clone()));
                    }
                }
            }
            SwarmEvent::ConnectionClosed { peer_id, cause, .. } => {
                tracing::debug!(peer = %peer_id, ?cause, "connection closed");
            }
            SwarmEvent::Behaviour(PulseBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                tracing::debug!(peer = %peer_id, agent = %info.agent_version, "identified peer");
            }
            _ => {}
        }
    }
}

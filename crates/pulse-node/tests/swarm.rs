use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use libp2p::{identity::Keypair, multiaddr::Protocol};
use pulse_node::{build_swarm, HeadSnapshot, HeartbeatConfig, HeartbeatService, LinkState, SwarmHost};
use pulse_protocol::{read_heartbeat, HEARTBEAT_PROTOCOL};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const DEADLINE: Duration = Duration::from_secs(10);

fn spawn_host() -> SwarmHost {
    SwarmHost::spawn(build_swarm(Keypair::generate_ed25519()).unwrap())
}

async fn aggregator() -> (SwarmHost, String) {
    let host = spawn_host();
    let addr = host.listen_on("/ip4/127.0.0.1/tcp/0".parse().unwrap()).await.unwrap();
    let target = addr.with(Protocol::P2p(host.local_peer_id()));
    (host, target.to_string())
}

fn config(target: String) -> HeartbeatConfig {
    HeartbeatConfig {
        beat_target: target,
        beat_period: "200ms".into(),
        reconnect_period: "1s".into(),
        nickname: "BobHoblaw".into(),
    }
}

#[tokio::test]
async fn connect_establishes_a_single_link() {
    let (aggregator, target) = aggregator().await;
    let _incoming = aggregator.accept(HEARTBEAT_PROTOCOL).unwrap();

    let node = spawn_host();
    let service = HeartbeatService::new(node.clone(), &config(target), || HeadSnapshot::new("genesis", 0))
        .unwrap();
    timeout(DEADLINE, service.connect(&CancellationToken::new()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(service.state(), LinkState::Connected);

    let peers = timeout(DEADLINE, async {
        loop {
            let peers = aggregator.connected_peers().await.unwrap();
            if !peers.is_empty() {
                return peers;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(peers, vec![node.local_peer_id()]);
    assert_eq!(node.connected_peers().await.unwrap(), vec![aggregator.local_peer_id()]);
}

#[tokio::test]
async fn connect_to_missing_aggregator_fails() {
    let node = spawn_host();
    let absent = Keypair::generate_ed25519().public().to_peer_id();
    let service = HeartbeatService::new(
        node,
        &config(format!("/ip4/127.0.0.1/tcp/1/p2p/{absent}")),
        || HeadSnapshot::new("genesis", 0),
    )
    .unwrap();
    let err = timeout(DEADLINE, service.connect(&CancellationToken::new()))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, pulse_node::HeartbeatError::Dial { .. }), "{err}");
}

#[tokio::test]
async fn beat_reaches_registered_handler() {
    let (aggregator, target) = aggregator().await;
    let mut incoming = aggregator.accept(HEARTBEAT_PROTOCOL).unwrap();

    let node = spawn_host();
    let service = Arc::new(
        HeartbeatService::new(node.clone(), &config(target), || HeadSnapshot::new("bafy-head", 444))
            .unwrap(),
    );
    timeout(DEADLINE, service.connect(&CancellationToken::new()))
        .await
        .unwrap()
        .unwrap();

    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let service = service.clone();
        let cancel = cancel.clone();
        async move { service.run(cancel).await }
    });

    let (peer, mut stream) = timeout(DEADLINE, incoming.next()).await.unwrap().unwrap();
    assert_eq!(peer, node.local_peer_id());

    let hb = timeout(DEADLINE, read_heartbeat(&mut stream))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(hb.head, "bafy-head");
    assert_eq!(hb.height, 444);
    assert_eq!(hb.nickname, "BobHoblaw");

    cancel.cancel();
    timeout(DEADLINE, run).await.unwrap().unwrap().unwrap();
    assert_eq!(service.state(), LinkState::Stopped);
}

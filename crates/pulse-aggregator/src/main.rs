mod identity;
mod ingest;
mod store;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use libp2p::{multiaddr::Protocol, Multiaddr};
use pulse_node::{build_swarm, config::parse_duration, SwarmHost};
use pulse_protocol::HEARTBEAT_PROTOCOL;

use store::BeatStore;

#[derive(Parser, Debug)]
#[command(name = "pulse-aggregator", about = "Collects heartbeat reports from pulse nodes")]
struct Config {
    /// libp2p listen multiaddr.
    #[arg(long, default_value = "/ip4/0.0.0.0/tcp/9100", env = "PULSE_AGGREGATOR_LISTEN")]
    listen: Multiaddr,

    /// Path to the 32-byte ed25519 secret key file. Created if missing.
    /// Keeping it stable keeps the aggregator's PeerId (and the nodes'
    /// configured heartbeat target) valid across restarts.
    #[arg(long, default_value = "pulse-aggregator.key", env = "PULSE_AGGREGATOR_KEYPAIR")]
    keypair_path: PathBuf,

    /// How often to log a summary of reporting nodes (e.g. "60s", "5m").
    #[arg(long, default_value = "60s", value_parser = parse_duration, env = "PULSE_AGGREGATOR_SUMMARY")]
    summary_interval: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("pulse_aggregator=info,pulse_node=info,libp2p=warn")
                }),
        )
        .init();

    let config = Config::parse();
    let keypair = identity::load_or_generate(&config.keypair_path)?;

    let host = SwarmHost::spawn(build_swarm(keypair)?);
    let bound = host.listen_on(config.listen.clone()).await?;
    let incoming = host.accept(HEARTBEAT_PROTOCOL)?;

    // Nodes use this as their heartbeat target.
    tracing::info!(
        peer_id = %host.local_peer_id(),
        "pulse-aggregator target: {}",
        bound.with(Protocol::P2p(host.local_peer_id())),
    );

    let store = BeatStore::new();
    tokio::spawn(ingest::serve(incoming, store.clone()));

    let mut summary = tokio::time::interval(config.summary_interval);
    summary.tick().await;
    let stale_after = config.summary_interval.as_secs().max(1) * 3;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
            _ = summary.tick() => log_summary(&store, stale_after),
        }
    }

    Ok(())
}

fn log_summary(store: &BeatStore, stale_after: u64) {
    let nodes = store.snapshot();
    let stale = store.stale(stale_after).len();
    tracing::info!(nodes = nodes.len(), stale, "heartbeat summary");
    for node in nodes {
        tracing::info!(
            peer = %node.peer,
            nickname = %node.nickname,
            height = node.height,
            head = %node.head,
            beats = node.beats,
            "node status",
        );
    }
}

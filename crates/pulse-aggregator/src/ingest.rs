use futures::io::AsyncRead;
use futures::StreamExt;
use libp2p::PeerId;
use pulse_protocol::read_heartbeat;

use crate::store::BeatStore;

/// Accept heartbeat streams until the host goes away.
pub async fn serve(mut incoming: libp2p_stream::IncomingStreams, store: BeatStore) {
    while let Some((peer, stream)) = incoming.next().await {
        tracing::info!(%peer, "heartbeat stream opened");
        let store = store.clone();
        tokio::spawn(async move {
            let beats = handle_stream(peer, stream, &store).await;
            tracing::info!(%peer, beats, "heartbeat stream ended");
        });
    }
}

/// Read records off one stream until it ends. Returns how many were stored.
///
/// A malformed record ends the stream: the sender reconnects on its own.
pub async fn handle_stream<S>(peer: PeerId, mut stream: S, store: &BeatStore) -> u64
where
    S: AsyncRead + Unpin,
{
    let mut beats = 0;
    loop {
        match read_heartbeat(&mut stream).await {
            Ok(Some(hb)) => {
                tracing::debug!(%peer, nickname = %hb.nickname, height = hb.height, head = %hb.head, "beat");
                store.record(peer, hb);
                beats += 1;
            }
            Ok(None) => break,
            Err(e) if e.is_malformed() => {
                tracing::warn!(%peer, "dropping heartbeat stream: {e}");
                break;
            }
            Err(e) => {
                tracing::debug!(%peer, "heartbeat stream error: {e}");
                break;
            }
        }
    }
    beats
}

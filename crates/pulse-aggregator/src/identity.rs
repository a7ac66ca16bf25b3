use std::path::Path;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use libp2p::identity;

/// Load the aggregator's ed25519 key (32 raw secret bytes) from `path`,
/// generating and saving one if the file does not exist.
///
/// A stable key keeps the aggregator's PeerId, and therefore the target
/// address configured on every node, the same across restarts.
pub fn load_or_generate(path: &Path) -> anyhow::Result<identity::Keypair> {
    if path.exists() {
        let keypair = load(path)?;
        tracing::info!(
            peer_id = %keypair.public().to_peer_id(),
            "Loaded identity from {:?}", path,
        );
        Ok(keypair)
    } else {
        let keypair = identity::ed25519::Keypair::generate();
        save(&keypair, path)?;
        let keypair = identity::Keypair::from(keypair);
        tracing::info!(
            peer_id = %keypair.public().to_peer_id(),
            "Generated new identity, saved to {:?}", path,
        );
        Ok(keypair)
    }
}

fn load(path: &Path) -> anyhow::Result<identity::Keypair> {
    let mut bytes = std::fs::read(path)?;
    if bytes.len() != 32 {
        anyhow::bail!("invalid key file: expected 32 bytes, found {}", bytes.len());
    }
    let secret = identity::ed25519::SecretKey::try_from_bytes(&mut bytes)
        .map_err(|e| anyhow::anyhow!("invalid key file: {e}"))?;
    Ok(identity::Keypair::from(identity::ed25519::Keypair::from(secret)))
}

fn save(keypair: &identity::ed25519::Keypair, path: &Path) -> anyhow::Result<()> {
    use std::io::Write;
    // mode 0o600: owner read/write only.
    #[cfg(unix)]
    let mut file = std::fs::OpenOptions::new()
        .write(true).create(true).truncate(true).mode(0o600)
        .open(path)?;
    #[cfg(not(unix))]
    let mut file = std::fs::OpenOptions::new()
        .write(true).create(true).truncate(true)
        .open(path)?;
    file.write_all(keypair.secret().as_ref())?;
    Ok(())
}

// Peers-file membership lookup.
// Cluster membership is static for the life of the process: every peer loads
// the same list before the lock engine is initialized.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use tracing::warn;

use baton_api::PeerInfo;
use baton_common::BatonError;

/// Parse the peers file: one `id@host:port` entry per line, `#` comments
/// and blank lines skipped. Duplicate ids keep the first entry.
pub fn load_peers_file(path: &Path) -> Result<Vec<PeerInfo>, BatonError> {
    if !path.exists() {
        return Err(BatonError::Config(format!(
            "peers file not found: {}",
            path.display()
        )));
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        entries.push(line.parse::<PeerInfo>()?);
    }

    Ok(dedup_by_id(entries))
}

/// Parse a comma-separated peer list, e.g. from the `baton.peer.list`
/// configuration key: `1@host:port,2@host:port`
pub fn parse_peer_list(list: &str) -> Result<Vec<PeerInfo>, BatonError> {
    let entries = list
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<PeerInfo>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(dedup_by_id(entries))
}

fn dedup_by_id(entries: Vec<PeerInfo>) -> Vec<PeerInfo> {
    let mut seen = std::collections::BTreeSet::new();
    let mut result = Vec::with_capacity(entries.len());
    for entry in entries {
        if seen.insert(entry.id) {
            result.push(entry);
        } else {
            warn!("Duplicate peer id {} in membership list, keeping first entry", entry.id);
        }
    }
    result
}

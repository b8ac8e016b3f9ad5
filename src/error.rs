use std::io;

use thiserror::Error;

/// Crate-wide error type. Binaries wrap this in `anyhow::Result` at the top level;
/// library code returns `Result<T, Error>` so callers can match on failure kind.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed frame: {0}")]
    Framing(String),

    #[error("invalid metainfo: {0}")]
    Metainfo(String),

    #[error("failed to decode bencode: {0}")]
    Bencode(#[from] serde_bencode::Error),

    #[error("tracker unreachable: {0}")]
    Tracker(String),

    #[error("peer {0} disconnected")]
    PeerGone(String),
}

pub type Result<T> = std::result::Result<T, Error>;

//! Torrent metainfo: the external, bencoded description of a swarm's payload.
//!
//! Deliberately non-standard relative to BEP-3: piece hashes are 40-char hex
//! strings rather than concatenated 20-byte digests, and `files` is always a
//! list (no single/multi-file ambiguity to resolve).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileEntry {
    pub filename: String,
    pub length: i64,
    #[serde(default)]
    pub md5sum: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Info {
    pub name: String,
    #[serde(rename = "piece length")]
    pub piece_length: i64,
    /// 40-char hex SHA-1 strings, one per piece.
    pub pieces: Vec<String>,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Metainfo {
    pub announce: String,
    pub info: Info,
}

impl Metainfo {
    pub fn from_bytes(bytes: &[u8]) -> Result<Metainfo> {
        let metainfo: Metainfo = serde_bencode::from_bytes(bytes)?;
        metainfo.validate()?;
        Ok(metainfo)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Metainfo> {
        let bytes = fs::read(path)?;
        Metainfo::from_bytes(&bytes)
    }

    fn validate(&self) -> Result<()> {
        if self.info.piece_length <= 0 {
            return Err(Error::Metainfo("piece length must be positive".into()));
        }
        for hash in &self.info.pieces {
            if hash.len() != 40 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(Error::Metainfo(format!(
                    "piece hash {hash:?} is not a 40-char hex string"
                )));
            }
        }
        let total: i64 = self.info.files.iter().map(|f| f.length).sum();
        if !self.info.pieces.is_empty() {
            let all_but_last = self.piece_count().saturating_sub(1) as i64 * self.info.piece_length;
            let max_total = self.piece_count() as i64 * self.info.piece_length;
            if total <= all_but_last || total > max_total {
                return Err(Error::Metainfo(
                    "piece count inconsistent with total file length".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn piece_count(&self) -> usize {
        self.info.pieces.len()
    }

    pub fn piece_length(&self) -> u64 {
        self.info.piece_length as u64
    }

    pub fn piece_hashes(&self) -> &[String] {
        &self.info.pieces
    }

    pub fn total_length(&self) -> u64 {
        self.info.files.iter().map(|f| f.length as u64).sum()
    }

    /// The length of piece `index`, accounting for a possibly-shorter last piece.
    pub fn piece_len(&self, index: usize) -> u64 {
        let full = self.piece_length();
        if index + 1 == self.piece_count() {
            self.total_length() - full * index as u64
        } else {
            full
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.info.files
    }

    pub fn announce(&self) -> &str {
        &self.announce
    }
}

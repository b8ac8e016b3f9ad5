//! Local piece store: the set of verified pieces (`have`) and their bytes
//! (`downloaded`), plus post-completion file reassembly.
//!
//! `have` and `downloaded` grow together under one lock so that
//! `|downloaded| = |have|` holds at every observation, not merely
//! eventually — a hash mismatch never inserts bytes in the first place.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::metainfo::Metainfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Bytes verified and were inserted; this is a newly-acquired piece.
    Committed,
    /// This piece was already in `have`; bytes were dropped, duplicate counted.
    AlreadyHad,
    /// SHA-1 did not match; bytes were discarded, piece remains missing.
    HashMismatch,
}

struct Inner {
    have: std::collections::HashSet<usize>,
    downloaded: HashMap<usize, Vec<u8>>,
    duplicates: u64,
    mismatches: u64,
}

/// Guarded local store. Exposes `try_commit` as the sole way to add a piece,
/// so the have/downloaded invariant cannot be violated by a caller forgetting
/// a step.
pub struct LocalStore {
    piece_count: usize,
    piece_hashes: Vec<String>,
    inner: Mutex<Inner>,
}

impl LocalStore {
    pub fn empty(metainfo: &Metainfo) -> LocalStore {
        LocalStore {
            piece_count: metainfo.piece_count(),
            piece_hashes: metainfo.piece_hashes().to_vec(),
            inner: Mutex::new(Inner {
                have: Default::default(),
                downloaded: HashMap::new(),
                duplicates: 0,
                mismatches: 0,
            }),
        }
    }

    /// Verifies `data` against the expected hash for `index` and, on match,
    /// inserts it into both `have` and `downloaded` under one critical
    /// section.
    pub fn try_commit(&self, index: usize, data: Vec<u8>) -> CommitOutcome {
        let mut inner = self.inner.lock().unwrap();
        if inner.have.contains(&index) {
            inner.duplicates += 1;
            return CommitOutcome::AlreadyHad;
        }

        let expected = match self.piece_hashes.get(index) {
            Some(h) => h,
            None => {
                inner.mismatches += 1;
                return CommitOutcome::HashMismatch;
            }
        };

        let mut hasher = Sha1::new();
        hasher.update(&data);
        let actual = hex::encode(hasher.finalize());

        if &actual == expected {
            inner.have.insert(index);
            inner.downloaded.insert(index, data);
            CommitOutcome::Committed
        } else {
            inner.mismatches += 1;
            CommitOutcome::HashMismatch
        }
    }

    /// Inserts an already-verified piece without re-hashing — used by the
    /// seeder at startup, where the bytes just came off local disk and were
    /// sliced by `seeder::slice_files` against these same hashes.
    pub fn insert_verified(&self, index: usize, data: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        inner.have.insert(index);
        inner.downloaded.insert(index, data);
    }

    pub fn has(&self, index: usize) -> bool {
        self.inner.lock().unwrap().have.contains(&index)
    }

    pub fn get(&self, index: usize) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().downloaded.get(&index).cloned()
    }

    pub fn have_count(&self) -> usize {
        self.inner.lock().unwrap().have.len()
    }

    pub fn missing(&self) -> Vec<usize> {
        let inner = self.inner.lock().unwrap();
        (0..self.piece_count)
            .filter(|i| !inner.have.contains(i))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.have_count() == self.piece_count
    }

    pub fn duplicate_count(&self) -> u64 {
        self.inner.lock().unwrap().duplicates
    }

    pub fn mismatch_count(&self) -> u64 {
        self.inner.lock().unwrap().mismatches
    }

    pub fn piece_count(&self) -> usize {
        self.piece_count
    }
}

/// Maps the completed `downloaded` map back onto the original file layout,
/// splitting a piece across a file boundary where necessary. Deterministic:
/// running this twice over the same store produces byte-identical output.
pub fn reassemble(store: &LocalStore, metainfo: &Metainfo, download_folder: &Path) -> Result<()> {
    let root = download_folder.join(metainfo.name());
    fs::create_dir_all(&root)?;

    let mut piece_index = 0usize;
    let mut offset_in_piece = 0usize;
    let mut current_piece = store
        .get(piece_index)
        .ok_or_else(|| Error::Metainfo("reassembly started before any piece downloaded".into()))?;

    for file in metainfo.files() {
        let path = root.join(&file.filename);
        let mut out = File::create(&path)?;
        let mut remaining = file.length as u64;

        while remaining > 0 {
            if offset_in_piece == current_piece.len() {
                piece_index += 1;
                current_piece = store.get(piece_index).ok_or_else(|| {
                    Error::Metainfo(format!("missing piece {piece_index} during reassembly"))
                })?;
                offset_in_piece = 0;
            }

            let available = current_piece.len() as u64 - offset_in_piece as u64;
            let take = available.min(remaining) as usize;
            out.write_all(&current_piece[offset_in_piece..offset_in_piece + take])?;
            remaining -= take as u64;
            offset_in_piece += take;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metainfo::{FileEntry, Info, Metainfo};
    use sha1::{Digest, Sha1};
    use tempfile::tempdir;

    fn hash_of(bytes: &[u8]) -> String {
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    fn sample_metainfo(pieces: &[&[u8]], files: Vec<FileEntry>) -> Metainfo {
        Metainfo {
            announce: "http://tracker.example/".to_string(),
            info: Info {
                name: "store".to_string(),
                piece_length: pieces.first().map(|p| p.len() as i64).unwrap_or(4),
                pieces: pieces.iter().map(|p| hash_of(p)).collect(),
                files,
            },
        }
    }

    #[test]
    fn commit_then_duplicate_then_mismatch() {
        let metainfo = sample_metainfo(
            &[b"ABCD"],
            vec![FileEntry {
                filename: "f".into(),
                length: 4,
                md5sum: None,
            }],
        );
        let store = LocalStore::empty(&metainfo);

        assert_eq!(store.try_commit(0, b"ABCD".to_vec()), CommitOutcome::Committed);
        assert_eq!(store.have_count(), 1);

        assert_eq!(
            store.try_commit(0, b"ABCD".to_vec()),
            CommitOutcome::AlreadyHad
        );
        assert_eq!(store.duplicate_count(), 1);
        assert_eq!(store.have_count(), 1, "duplicate commit must not grow have");
    }

    #[test]
    fn mismatch_never_populates_downloaded() {
        let metainfo = sample_metainfo(
            &[b"ABCD"],
            vec![FileEntry {
                filename: "f".into(),
                length: 4,
                md5sum: None,
            }],
        );
        let store = LocalStore::empty(&metainfo);
        assert_eq!(
            store.try_commit(0, b"WRONG".to_vec()),
            CommitOutcome::HashMismatch
        );
        assert_eq!(store.mismatch_count(), 1);
        assert!(store.get(0).is_none());
        assert_eq!(store.have_count(), 0);
        assert!(!store.has(0));
    }

    #[test]
    fn reassembles_single_file_three_pieces() {
        // S1: "ABCDEFGHIJ", piece_length=4 -> "ABCD","EFGH","IJ"
        let metainfo = sample_metainfo(
            &[b"ABCD", b"EFGH", b"IJ"],
            vec![FileEntry {
                filename: "out.bin".into(),
                length: 10,
                md5sum: None,
            }],
        );
        let store = LocalStore::empty(&metainfo);
        assert_eq!(store.try_commit(0, b"ABCD".to_vec()), CommitOutcome::Committed);
        assert_eq!(store.try_commit(1, b"EFGH".to_vec()), CommitOutcome::Committed);
        assert_eq!(store.try_commit(2, b"IJ".to_vec()), CommitOutcome::Committed);
        assert!(store.is_complete());

        let dir = tempdir().unwrap();
        reassemble(&store, &metainfo, dir.path()).unwrap();

        let out = fs::read(dir.path().join("store").join("out.bin")).unwrap();
        assert_eq!(out, b"ABCDEFGHIJ");
    }

    #[test]
    fn reassembles_piece_spanning_two_files() {
        // S2: a.txt(5) + b.txt(5), piece_length=4:
        // piece0 = a[0..4], piece1 = a[4..5] ++ b[0..3], piece2 = b[3..5]
        let a = b"AAAAB"; // 5 bytes: a.txt
        let b = b"CCCCD"; // 5 bytes: b.txt
        let piece0 = &a[0..4];
        let mut piece1 = a[4..5].to_vec();
        piece1.extend_from_slice(&b[0..3]);
        let piece2 = &b[3..5];

        let metainfo = sample_metainfo(
            &[piece0, &piece1, piece2],
            vec![
                FileEntry {
                    filename: "a.txt".into(),
                    length: 5,
                    md5sum: None,
                },
                FileEntry {
                    filename: "b.txt".into(),
                    length: 5,
                    md5sum: None,
                },
            ],
        );
        let store = LocalStore::empty(&metainfo);
        store.try_commit(0, piece0.to_vec());
        store.try_commit(1, piece1.clone());
        store.try_commit(2, piece2.to_vec());

        let dir = tempdir().unwrap();
        reassemble(&store, &metainfo, dir.path()).unwrap();

        assert_eq!(fs::read(dir.path().join("store").join("a.txt")).unwrap(), a);
        assert_eq!(fs::read(dir.path().join("store").join("b.txt")).unwrap(), b);
    }

    #[test]
    fn reassembly_is_deterministic() {
        let metainfo = sample_metainfo(
            &[b"ABCD", b"EF"],
            vec![FileEntry {
                filename: "f".into(),
                length: 6,
                md5sum: None,
            }],
        );
        let store = LocalStore::empty(&metainfo);
        store.try_commit(0, b"ABCD".to_vec());
        store.try_commit(1, b"EF".to_vec());

        let dir1 = tempdir().unwrap();
        let dir2 = tempdir().unwrap();
        reassemble(&store, &metainfo, dir1.path()).unwrap();
        reassemble(&store, &metainfo, dir2.path()).unwrap();

        let out1 = fs::read(dir1.path().join("store").join("f")).unwrap();
        let out2 = fs::read(dir2.path().join("store").join("f")).unwrap();
        assert_eq!(out1, out2);
    }
}

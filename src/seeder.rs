//! Seeder initialization: turns a folder of already-complete source files
//! into a fully-populated `LocalStore`, the way the original download would
//! have looked once finished. A seeder is just the peer engine started with
//! `have = [0, N)` instead of empty.

use std::fs;
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::error::Result;
use crate::metainfo::{FileEntry, Info, Metainfo};
use crate::store::LocalStore;

/// Scans `source_folder` for regular files (sorted by name, for a
/// deterministic layout) and builds the metainfo that describes them: file
/// list, piece hashes, and the given `announce` URL. There is no existing
/// metainfo to read on the seeder side — it is the one producing it.
pub fn build_metainfo(source_folder: &Path, piece_length: u32, announce: &str) -> Result<Metainfo> {
    let name = source_folder
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("seed")
        .to_string();

    let mut entries: Vec<_> = fs::read_dir(source_folder)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .collect();
    entries.sort_by_key(|entry| entry.file_name());

    let mut files = Vec::new();
    let mut buffer = Vec::new();
    for entry in &entries {
        let bytes = fs::read(entry.path())?;
        files.push(FileEntry {
            filename: entry.file_name().to_string_lossy().into_owned(),
            length: bytes.len() as i64,
            md5sum: None,
        });
        buffer.extend(bytes);
    }

    let piece_length_usize = piece_length as usize;
    let mut pieces = Vec::new();
    let mut offset = 0;
    while offset < buffer.len() {
        let end = (offset + piece_length_usize).min(buffer.len());
        let mut hasher = Sha1::new();
        hasher.update(&buffer[offset..end]);
        pieces.push(hex::encode(hasher.finalize()));
        offset = end;
    }

    Ok(Metainfo {
        announce: announce.to_string(),
        info: Info {
            name,
            piece_length: piece_length as i64,
            pieces,
            files,
        },
    })
}

/// Reads every file named in `metainfo` from `source_folder`, in metainfo
/// order, and slices the concatenated bytes into `piece_length`-sized
/// pieces (the last shorter, per `Metainfo::piece_len`). Pieces are
/// inserted with `insert_verified`: the bytes just came off local disk
/// against the very hashes in this metainfo, so re-hashing here would only
/// duplicate work the original encode already did.
pub fn slice_files(metainfo: &Metainfo, source_folder: &Path) -> Result<LocalStore> {
    let store = LocalStore::empty(metainfo);

    let mut buffer = Vec::with_capacity(metainfo.total_length() as usize);
    for file in metainfo.files() {
        let path = source_folder.join(&file.filename);
        buffer.extend(fs::read(&path)?);
    }

    let piece_length = metainfo.piece_length() as usize;
    for index in 0..metainfo.piece_count() {
        let start = index * piece_length;
        let end = (start + metainfo.piece_len(index) as usize).min(buffer.len());
        store.insert_verified(index, buffer[start..end].to_vec());
    }

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metainfo::{FileEntry, Info};
    use sha1::{Digest, Sha1};
    use std::fs;
    use tempfile::tempdir;

    fn hash_of(bytes: &[u8]) -> String {
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn slices_two_files_into_expected_pieces() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"AAAAB").unwrap();
        fs::write(dir.path().join("b.txt"), b"CCCCD").unwrap();

        let piece0 = b"AAAA".to_vec();
        let mut piece1 = b"B".to_vec();
        piece1.extend_from_slice(b"CCC");
        let piece2 = b"D".to_vec();

        let metainfo = Metainfo {
            announce: "http://tracker.example/".to_string(),
            info: Info {
                name: "seed".to_string(),
                piece_length: 4,
                pieces: vec![hash_of(&piece0), hash_of(&piece1), hash_of(&piece2)],
                files: vec![
                    FileEntry { filename: "a.txt".into(), length: 5, md5sum: None },
                    FileEntry { filename: "b.txt".into(), length: 5, md5sum: None },
                ],
            },
        };

        let store = slice_files(&metainfo, dir.path()).unwrap();
        assert!(store.is_complete());
        assert_eq!(store.get(0).unwrap(), piece0);
        assert_eq!(store.get(1).unwrap(), piece1);
        assert_eq!(store.get(2).unwrap(), piece2);
    }
}

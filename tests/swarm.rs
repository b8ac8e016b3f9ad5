//! One-seeder, one-leecher transfer over real loopback TCP sockets, wired
//! directly (no tracker process involved) — scenario S1 from the design
//! notes: a single file, three pieces, the last shorter than the rest.

use std::net::{Ipv4Addr, TcpListener};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha1::{Digest, Sha1};
use tempfile::tempdir;

use piecemeal::engine::{self, Engine};
use piecemeal::metainfo::{FileEntry, Info, Metainfo};
use piecemeal::picker::{self, Mode};
use piecemeal::seeder;
use piecemeal::store::{self, LocalStore};

fn hash_of(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn sample_metainfo() -> Metainfo {
    Metainfo {
        announce: "http://tracker.example/".to_string(),
        info: Info {
            name: "swarm-test".to_string(),
            piece_length: 4,
            pieces: vec![hash_of(b"ABCD"), hash_of(b"EFGH"), hash_of(b"IJ")],
            files: vec![FileEntry {
                filename: "out.bin".to_string(),
                length: 10,
                md5sum: None,
            }],
        },
    }
}

fn wait_until<F: Fn() -> bool>(timeout: Duration, check: F) {
    let deadline = Instant::now() + timeout;
    while !check() {
        assert!(Instant::now() < deadline, "condition never became true");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn one_seeder_one_leecher_completes_transfer() {
    let metainfo = sample_metainfo();

    let source = tempdir().unwrap();
    std::fs::write(source.path().join("out.bin"), b"ABCDEFGHIJ").unwrap();
    let seeder_store = Arc::new(seeder::slice_files(&metainfo, source.path()).unwrap());
    assert!(seeder_store.is_complete());

    let seeder_listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let seeder_addr = seeder_listener.local_addr().unwrap();
    let seeder_engine = Engine::new(seeder_addr, metainfo.piece_count(), seeder_store, true);
    engine::listen(seeder_engine.clone(), seeder_listener);

    let leecher_store = Arc::new(LocalStore::empty(&metainfo));
    let leecher_listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let leecher_addr = leecher_listener.local_addr().unwrap();
    let leecher_engine = Engine::new(
        leecher_addr,
        metainfo.piece_count(),
        leecher_store.clone(),
        false,
    );
    engine::listen(leecher_engine.clone(), leecher_listener);

    engine::connect(&leecher_engine, seeder_addr);

    // Wait for the BITFIELD / BITFIELD_NO_LOOP exchange to land before
    // driving acquisition, instead of guessing a sleep duration.
    wait_until(Duration::from_secs(5), || {
        !leecher_engine.availability.holders(0).is_empty()
    });

    picker::run(&leecher_engine, Mode::Sequential, false);

    assert!(leecher_store.is_complete());
    assert_eq!(leecher_store.duplicate_count(), 0);
    assert_eq!(leecher_store.mismatch_count(), 0);

    let out_dir = tempdir().unwrap();
    store::reassemble(&leecher_store, &metainfo, out_dir.path()).unwrap();
    let bytes = std::fs::read(out_dir.path().join("swarm-test").join("out.bin")).unwrap();
    assert_eq!(bytes, b"ABCDEFGHIJ");

    leecher_engine.shutdown();
    seeder_engine.shutdown();
}

//! Piece acquisition policy: a coarse rate-limited re-request loop, not a
//! per-request timeout scheme. There is no in-flight tracking beyond
//! `have`/`downloaded` themselves — a request that never gets a reply is
//! simply re-issued on the next pass.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::unbounded;
use log::info;
use rand::seq::SliceRandom;

use crate::engine::Engine;

/// Upper bound on re-request passes before the download loop gives up and
/// falls through to the completion wait (which blocks regardless, so a
/// swarm with no seed for some piece simply hangs there — matching the
/// distilled spec's "no per-request timeout" design).
pub const MAX_PASSES: u32 = 30;

/// Worker pool size for `Mode::Parallel`.
pub const PARALLEL_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sequential,
    Parallel,
}

/// Drives piece acquisition to completion: runs the chosen request
/// strategy for up to `MAX_PASSES` passes, then blocks until every piece is
/// verified.
pub fn run(engine: &Arc<Engine>, mode: Mode, random: bool) {
    match mode {
        Mode::Sequential => sequential_loop(engine, random),
        Mode::Parallel => parallel_loop(engine, random),
    }
    wait_for_completion(engine);
}

fn next_pass_missing(engine: &Arc<Engine>, random: bool) -> Vec<usize> {
    let mut missing = engine.store.missing();
    if random {
        missing.shuffle(&mut rand::thread_rng());
    }
    missing
}

fn sleep_for_pass(missing_len: usize) {
    thread::sleep(Duration::from_secs_f64(missing_len as f64 / 10000.0));
}

fn sequential_loop(engine: &Arc<Engine>, random: bool) {
    for pass in 0..MAX_PASSES {
        let missing = next_pass_missing(engine, random);
        if missing.is_empty() {
            break;
        }
        info!("pass {pass}: {} pieces still missing", missing.len());
        for index in &missing {
            if let Some(peer) = engine.availability.random_holder(*index) {
                engine.request(peer, *index);
            }
        }
        sleep_for_pass(missing.len());
    }
}

fn parallel_loop(engine: &Arc<Engine>, random: bool) {
    for pass in 0..MAX_PASSES {
        let missing = next_pass_missing(engine, random);
        if missing.is_empty() {
            break;
        }
        info!("pass {pass}: {} pieces still missing (parallel)", missing.len());

        let (tx, rx) = unbounded::<usize>();
        for index in &missing {
            let _ = tx.send(*index);
        }
        drop(tx);

        let workers: Vec<_> = (0..PARALLEL_CONCURRENCY)
            .map(|_| {
                let engine = engine.clone();
                let rx = rx.clone();
                thread::spawn(move || {
                    for index in rx {
                        if let Some(peer) = engine.availability.random_holder(index) {
                            engine.request(peer, index);
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            let _ = worker.join();
        }

        sleep_for_pass(missing.len());
    }
}

fn wait_for_completion(engine: &Arc<Engine>) {
    while !engine.store.is_complete() {
        thread::sleep(Duration::from_millis(100));
    }
}

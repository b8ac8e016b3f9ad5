//! Inverted index from piece index to the set of peers known to possess it.
//!
//! Updated on BITFIELD/BITFIELD_NO_LOOP (all set bits at once) and on HAVE
//! (a single index). A peer is only ever added here because it announced the
//! piece on the wire — the table is never used to *infer* possession.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Mutex;

use rand::seq::IteratorRandom;

use crate::bitfield::Bitfield;

#[derive(Default)]
struct Inner {
    piece_has: HashMap<usize, HashSet<SocketAddr>>,
    bitfields: HashMap<SocketAddr, Bitfield>,
}

/// Guarded availability table. Exposes small typed operations rather than a
/// raw lock, per the swarm's lock-order discipline (availability is always
/// acquired first).
pub struct Availability {
    inner: Mutex<Inner>,
}

impl Availability {
    pub fn new() -> Availability {
        Availability {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Records `peer`'s full bitfield and updates the inverted index for
    /// every piece it claims to have.
    pub fn adopt_bitfield(&self, peer: SocketAddr, bitfield: Bitfield) {
        let mut inner = self.inner.lock().unwrap();
        for index in bitfield.pieces() {
            inner.piece_has.entry(index).or_default().insert(peer);
        }
        inner.bitfields.insert(peer, bitfield);
    }

    /// Records a single HAVE announcement. Idempotent: announcing the same
    /// piece twice leaves the table unchanged after the first call.
    pub fn add(&self, peer: SocketAddr, index: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .bitfields
            .entry(peer)
            .or_insert_with(|| Bitfield::empty(index + 1))
            .set(index);
        inner.piece_has.entry(index).or_default().insert(peer);
    }

    /// Drops all knowledge of `peer` (called on disconnect).
    pub fn remove_peer(&self, peer: SocketAddr) {
        let mut inner = self.inner.lock().unwrap();
        inner.bitfields.remove(&peer);
        for peers in inner.piece_has.values_mut() {
            peers.remove(&peer);
        }
    }

    /// Picks one peer uniformly at random among those known to have `index`.
    pub fn random_holder(&self, index: usize) -> Option<SocketAddr> {
        let inner = self.inner.lock().unwrap();
        inner
            .piece_has
            .get(&index)
            .into_iter()
            .flatten()
            .choose(&mut rand::thread_rng())
            .copied()
    }

    pub fn holders(&self, index: usize) -> HashSet<SocketAddr> {
        let inner = self.inner.lock().unwrap();
        inner.piece_has.get(&index).cloned().unwrap_or_default()
    }

    pub fn bitfield_of(&self, peer: SocketAddr) -> Option<Bitfield> {
        let inner = self.inner.lock().unwrap();
        inner.bitfields.get(&peer).cloned()
    }
}

impl Default for Availability {
    fn default() -> Self {
        Availability::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn adopt_bitfield_populates_every_claimed_piece() {
        let availability = Availability::new();
        let mut bf = Bitfield::empty(3);
        bf.set(0);
        bf.set(2);
        availability.adopt_bitfield(addr(1), bf);
        assert!(availability.holders(0).contains(&addr(1)));
        assert!(!availability.holders(1).contains(&addr(1)));
        assert!(availability.holders(2).contains(&addr(1)));
    }

    #[test]
    fn have_is_idempotent() {
        let availability = Availability::new();
        availability.add(addr(1), 5);
        availability.add(addr(1), 5);
        assert_eq!(availability.holders(5).len(), 1);
    }

    #[test]
    fn remove_peer_clears_all_entries() {
        let availability = Availability::new();
        availability.add(addr(1), 0);
        availability.add(addr(1), 1);
        availability.remove_peer(addr(1));
        assert!(availability.holders(0).is_empty());
        assert!(availability.holders(1).is_empty());
        assert!(availability.bitfield_of(addr(1)).is_none());
    }

    #[test]
    fn random_holder_is_none_when_nobody_has_it() {
        let availability = Availability::new();
        assert_eq!(availability.random_holder(0), None);
    }
}

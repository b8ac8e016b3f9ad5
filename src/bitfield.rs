//! Piece-availability bitfield.
//!
//! The wire format normatively spends one whole byte per piece (0x00 / 0x01)
//! rather than packing eight pieces per byte — wasteful, but part of the
//! on-wire contract this swarm speaks (see `wire::Message::Bitfield`).

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bits: Vec<u8>,
}

impl Bitfield {
    /// A bitfield of `len` pieces, all unset.
    pub fn empty(len: usize) -> Bitfield {
        Bitfield {
            bits: vec![0; len],
        }
    }

    /// A bitfield of `len` pieces, all set — the seeder's starting state.
    pub fn full(len: usize) -> Bitfield {
        Bitfield {
            bits: vec![1; len],
        }
    }

    /// Builds a bitfield from raw wire bytes (one byte per piece).
    pub fn from_bytes(bytes: &[u8]) -> Bitfield {
        Bitfield {
            bits: bytes.iter().map(|&b| if b != 0 { 1 } else { 0 }).collect(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits.clone()
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn has_piece(&self, index: usize) -> bool {
        self.bits.get(index).copied().unwrap_or(0) != 0
    }

    pub fn set(&mut self, index: usize) {
        if index >= self.bits.len() {
            self.bits.resize(index + 1, 0);
        }
        self.bits[index] = 1;
    }

    pub fn unset(&mut self, index: usize) {
        if let Some(b) = self.bits.get_mut(index) {
            *b = 0;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits.iter().map(|&b| b != 0)
    }

    pub fn pieces(&self) -> Vec<usize> {
        self.iter()
            .enumerate()
            .filter(|&(_, b)| b)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.iter().all(|b| b)
    }
}

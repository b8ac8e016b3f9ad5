//! `SwarmView`: the ordered set of live peers, as last reported by the
//! tracker. Replaced wholesale on each tracker broadcast; readers take a
//! snapshot and release the lock before acting on it.

use std::net::SocketAddr;
use std::sync::Mutex;

pub type PeerId = SocketAddr;

pub struct SwarmView {
    inner: Mutex<Vec<PeerId>>,
}

impl SwarmView {
    pub fn new() -> SwarmView {
        SwarmView {
            inner: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the view and returns the peers that were present before but
    /// are gone now (the caller is expected to tear down their connections).
    pub fn replace(&self, new_view: Vec<PeerId>) -> Vec<PeerId> {
        let mut inner = self.inner.lock().unwrap();
        let departed: Vec<PeerId> = inner
            .iter()
            .filter(|p| !new_view.contains(p))
            .copied()
            .collect();
        *inner = new_view;
        departed
    }

    pub fn snapshot(&self) -> Vec<PeerId> {
        self.inner.lock().unwrap().clone()
    }
}

impl Default for SwarmView {
    fn default() -> Self {
        SwarmView::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> PeerId {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn replace_reports_departed_peers() {
        let view = SwarmView::new();
        view.replace(vec![addr(1), addr(2)]);
        let departed = view.replace(vec![addr(2), addr(3)]);
        assert_eq!(departed, vec![addr(1)]);
        assert_eq!(view.snapshot(), vec![addr(2), addr(3)]);
    }

    #[test]
    fn first_broadcast_has_nothing_departed() {
        let view = SwarmView::new();
        let departed = view.replace(vec![addr(1)]);
        assert!(departed.is_empty());
    }
}

//! Peer-side tracker client: register, read the initial membership, then
//! hand subsequent broadcasts to a caller-supplied callback.
//!
//! Grounded on the original Python `leecher.py`'s `register_with_tracker` /
//! `receive_tracker_updates`, with the pickle blob replaced by
//! `tracker::protocol`'s length-prefixed codec. Unlike the Python source,
//! the update thread here does not own `SwarmView` directly — it hands each
//! broadcast to the engine, which also needs to diff departed peers against
//! its live connection table.

use std::net::{SocketAddr, TcpStream};
use std::thread::{self, JoinHandle};

use log::{info, warn};

use crate::error::Result;
use crate::swarm::PeerId;
use crate::tracker::protocol::read_membership;

/// A live registration with the tracker: the socket that must stay open for
/// the duration of membership, and the thread feeding update callbacks.
pub struct Registration {
    socket: TcpStream,
    updates: JoinHandle<()>,
}

impl Registration {
    /// Sends the graceful-leave marker and joins the update thread.
    pub fn quit(mut self) -> Result<()> {
        use std::io::Write;
        self.socket.write_all(b"quit")?;
        self.socket.shutdown(std::net::Shutdown::Write).ok();
        let _ = self.updates.join();
        Ok(())
    }
}

/// Connects to the tracker, announces `listening_port`, and returns the
/// initial membership snapshot plus a `Registration` whose background
/// thread invokes `on_update` for every subsequent broadcast.
pub fn register<F>(
    tracker_addr: SocketAddr,
    listening_port: u16,
    mut on_update: F,
) -> Result<(Registration, Vec<PeerId>)>
where
    F: FnMut(Vec<PeerId>) + Send + 'static,
{
    use std::io::Write;

    let mut socket = TcpStream::connect(tracker_addr)?;
    socket.write_all(listening_port.to_string().as_bytes())?;
    info!("registered with tracker at {tracker_addr} as port {listening_port}");

    let initial = read_membership(&mut socket)?;

    let mut updates_socket = socket.try_clone()?;
    let updates = thread::spawn(move || loop {
        match read_membership(&mut updates_socket) {
            Ok(membership) => {
                info!("tracker update: {membership:?}");
                on_update(membership);
            }
            Err(e) => {
                warn!("tracker connection lost: {e}");
                break;
            }
        }
    });

    Ok((Registration { socket, updates }, initial))
}

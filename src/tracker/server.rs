//! The tracker process: single source of truth for swarm membership.
//!
//! Grounded on the original Python `tracker/manager.py` (one thread per peer
//! connection, a single lock guarding the peer list and socket map, broadcast
//! on every join/leave) with the pickle blob replaced by
//! `tracker::protocol`'s length-prefixed codec.

use std::collections::HashMap;
use std::io::Read;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::Mutex;
use std::thread;

use log::{debug, info, warn};

use crate::error::Result;
use crate::tracker::protocol::write_membership;

struct Inner {
    peers: Vec<SocketAddr>,
    sockets: HashMap<SocketAddr, TcpStream>,
}

/// Guarded membership registry: one mutex over the ordered peer list and the
/// socket map, exactly as the spec calls for — mutation and broadcast happen
/// under the same critical section.
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    fn new() -> Registry {
        Registry {
            inner: Mutex::new(Inner {
                peers: Vec::new(),
                sockets: HashMap::new(),
            }),
        }
    }

    fn register(&self, id: SocketAddr, socket: TcpStream) {
        let mut inner = self.inner.lock().unwrap();
        inner.peers.push(id);
        inner.sockets.insert(id, socket);
        self.broadcast_locked(&mut inner);
    }

    fn deregister(&self, id: SocketAddr) {
        let mut inner = self.inner.lock().unwrap();
        inner.peers.retain(|p| *p != id);
        inner.sockets.remove(&id);
        self.broadcast_locked(&mut inner);
    }

    fn broadcast_locked(&self, inner: &mut Inner) {
        let membership = inner.peers.clone();
        info!("broadcasting membership: {membership:?}");
        for (peer, socket) in inner.sockets.iter_mut() {
            if let Err(e) = write_membership(socket, &membership) {
                warn!("failed to send membership to {peer}: {e}");
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

/// Runs the tracker's membership listener on `port` until the process is
/// killed. Never returns under normal operation.
pub fn run(port: u16) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    info!("tracker listening on port {port}");
    let registry = std::sync::Arc::new(Registry::new());

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };
        let registry = registry.clone();
        thread::spawn(move || handle_peer(registry, stream));
    }

    Ok(())
}

fn handle_peer(registry: std::sync::Arc<Registry>, mut stream: TcpStream) {
    let remote_ip = match stream.peer_addr() {
        Ok(addr) => addr.ip(),
        Err(e) => {
            warn!("could not read peer address: {e}");
            return;
        }
    };

    let announced_port = match read_announced_port(&mut stream) {
        Ok(port) => port,
        Err(e) => {
            warn!("peer {remote_ip} did not announce a valid port: {e}");
            return;
        }
    };

    let id = SocketAddr::new(remote_ip, announced_port);
    let writer_socket = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            warn!("could not clone socket for {id}: {e}");
            return;
        }
    };
    registry.register(id, writer_socket);
    info!("peer {id} joined the swarm");

    loop {
        let mut buf = [0u8; 1024];
        match stream.read(&mut buf) {
            Ok(0) => {
                debug!("peer {id} closed the connection");
                break;
            }
            Ok(n) if &buf[..n] == b"quit" => {
                info!("peer {id} left gracefully");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("connection to {id} lost: {e}");
                break;
            }
        }
    }

    registry.deregister(id);
}

fn read_announced_port(stream: &mut TcpStream) -> Result<u16> {
    let mut buf = [0u8; 64];
    let n = stream.read(&mut buf)?;
    let text = std::str::from_utf8(&buf[..n])
        .map_err(|e| crate::error::Error::Tracker(format!("non-utf8 port announcement: {e}")))?;
    text.trim()
        .parse::<u16>()
        .map_err(|e| crate::error::Error::Tracker(format!("bad port announcement {text:?}: {e}")))
}

/// Tiny HTTP server that answers `GET /tracker.txt` with `"<ip> <port>"` of
/// the membership listener, matching the distilled spec's announce
/// discovery interface. Hand-rolled, matching the teacher's own style of
/// talking raw HTTP without pulling in a client/server crate for one route.
pub fn run_tracker_txt(http_port: u16, tracker_ip: IpAddr, tracker_port: u16) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", http_port))?;
    info!("tracker.txt published on port {http_port}");
    let line = format!("{tracker_ip} {tracker_port}");

    for stream in listener.incoming() {
        let mut stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!("tracker.txt accept failed: {e}");
                continue;
            }
        };
        let line = line.clone();
        thread::spawn(move || {
            use std::io::Write;
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request);
            let body = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                line.len(),
                line
            );
            let _ = stream.write_all(body.as_bytes());
        });
    }

    Ok(())
}

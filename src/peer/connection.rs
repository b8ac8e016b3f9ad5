//! Per-peer connection: a receive thread with exclusive read access to the
//! socket, and a writer thread draining a per-peer outbound queue. Any other
//! thread that wants to talk to this peer sends onto the queue; none of them
//! touch the socket directly. This resolves per-socket send concurrency by
//! construction rather than a shared send mutex.

use std::io;
use std::net::TcpStream;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Sender};
use log::{debug, warn};

use crate::swarm::PeerId;
use crate::wire::{self, Message};

#[derive(Default)]
pub struct PeerStats {
    pub sent_pieces: u64,
    pub received_pieces: u64,
}

/// Handle to a live peer connection. The socket itself is owned by the
/// reader/writer threads; callers only ever see this handle.
pub struct PeerHandle {
    pub id: PeerId,
    outbound: Sender<Message>,
    stats: Mutex<PeerStats>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl PeerHandle {
    /// Queues `message` for the writer thread. Silently dropped if the
    /// connection has already torn down — there is no reject/ack message on
    /// this wire anyway.
    pub fn send(&self, message: Message) {
        if self.outbound.send(message).is_err() {
            debug!("dropped message to {}: connection already closed", self.id);
        }
    }

    pub fn note_sent_piece(&self) {
        self.stats.lock().unwrap().sent_pieces += 1;
    }

    pub fn note_received_piece(&self) {
        self.stats.lock().unwrap().received_pieces += 1;
    }

    pub fn stats(&self) -> (u64, u64) {
        let s = self.stats.lock().unwrap();
        (s.sent_pieces, s.received_pieces)
    }

    /// Waits for both threads to exit. Only meaningful after the socket has
    /// been closed (swarm exit) or the peer has gone away on its own.
    pub fn join(self) {
        let _ = self.reader.join();
        let _ = self.writer.join();
    }
}

/// Spawns the reader and writer threads for an already-connected socket.
/// `on_message` runs on the reader thread for every decoded frame; the
/// reader thread exits on the first framing/IO error, ending that peer's
/// connection without affecting the rest of the swarm.
pub fn spawn<F>(id: PeerId, stream: TcpStream, mut on_message: F) -> io::Result<PeerHandle>
where
    F: FnMut(Message) + Send + 'static,
{
    let mut read_stream = stream.try_clone()?;
    let mut write_stream = stream;
    let (tx, rx) = unbounded::<Message>();

    let reader = thread::spawn(move || loop {
        match wire::read_message(&mut read_stream) {
            Ok(message) => on_message(message),
            Err(e) => {
                debug!("peer {id} read loop ending: {e}");
                break;
            }
        }
    });

    let writer = thread::spawn(move || {
        for message in rx {
            if let Err(e) = wire::write_message(&mut write_stream, &message) {
                warn!("peer {id} write loop ending: {e}");
                break;
            }
        }
    });

    Ok(PeerHandle {
        id,
        outbound: tx,
        stats: Mutex::new(PeerStats::default()),
        reader,
        writer,
    })
}

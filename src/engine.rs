//! The peer engine: connection lifecycle, message dispatch, and HAVE
//! broadcast. Binaries `peer` and `seeder` both drive the same `Engine`,
//! differing only in the `LocalStore` they start with and the `is_seeder`
//! flag that turns off Availability bookkeeping for pure uploaders.

use std::collections::{HashMap, HashSet};
use std::net::{TcpListener, TcpStream};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, info, warn};

use crate::availability::Availability;
use crate::bitfield::Bitfield;
use crate::error::Result;
use crate::peer::connection::{self, PeerHandle};
use crate::store::{CommitOutcome, LocalStore};
use crate::swarm::{PeerId, SwarmView};
use crate::tracker::client::{self, Registration};
use crate::wire::Message;

pub struct Engine {
    pub self_id: PeerId,
    pub piece_count: usize,
    pub is_seeder: bool,
    pub availability: Availability,
    pub store: Arc<LocalStore>,
    pub swarm: SwarmView,
    peers: Mutex<HashMap<PeerId, Arc<PeerHandle>>>,
    exit: AtomicBool,
}

impl Engine {
    pub fn new(self_id: PeerId, piece_count: usize, store: Arc<LocalStore>, is_seeder: bool) -> Arc<Engine> {
        Arc::new(Engine {
            self_id,
            piece_count,
            is_seeder,
            availability: Availability::new(),
            store,
            swarm: SwarmView::new(),
            peers: Mutex::new(HashMap::new()),
            exit: AtomicBool::new(false),
        })
    }

    pub fn current_bitfield_bytes(&self) -> Vec<u8> {
        let mut bf = Bitfield::empty(self.piece_count);
        for i in 0..self.piece_count {
            if self.store.has(i) {
                bf.set(i);
            }
        }
        bf.to_bytes()
    }

    pub fn send_to(&self, peer: PeerId, message: Message) {
        if let Some(handle) = self.peers.lock().unwrap().get(&peer) {
            handle.send(message);
        }
    }

    /// Broadcasts HAVE(index) to SwarmView ∪ currently-open peer sockets, so
    /// inbound-only connections see it even though they never appeared in a
    /// tracker broadcast addressed to us.
    pub fn broadcast_have(&self, index: usize) {
        let peers = self.peers.lock().unwrap();
        let mut targets: HashSet<PeerId> = self.swarm.snapshot().into_iter().collect();
        targets.extend(peers.keys().copied());
        for peer in targets {
            if let Some(handle) = peers.get(&peer) {
                handle.send(Message::Have(index as u32));
            }
        }
    }

    pub fn request(&self, peer: PeerId, index: usize) {
        self.send_to(peer, Message::Request(index as u32));
    }

    pub fn open_peer_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    fn remove_peer(&self, peer: PeerId) {
        self.availability.remove_peer(peer);
        self.peers.lock().unwrap().remove(&peer);
    }

    fn handle_message(&self, peer: PeerId, message: Message) {
        match message {
            Message::Bitfield(bits) => {
                if !self.is_seeder {
                    self.availability.adopt_bitfield(peer, Bitfield::from_bytes(&bits));
                }
                self.send_to(peer, Message::BitfieldNoLoop(self.current_bitfield_bytes()));
            }
            Message::BitfieldNoLoop(bits) => {
                if !self.is_seeder {
                    self.availability.adopt_bitfield(peer, Bitfield::from_bytes(&bits));
                }
            }
            Message::Have(index) => {
                if !self.is_seeder {
                    self.availability.add(peer, index as usize);
                }
            }
            Message::Request(index) => {
                let idx = index as usize;
                let already_has = self
                    .availability
                    .bitfield_of(peer)
                    .map(|bf| bf.has_piece(idx))
                    .unwrap_or(false);
                if already_has {
                    debug!("{peer} requested piece {idx} it already has; ignoring");
                    return;
                }
                match self.store.get(idx) {
                    Some(data) => {
                        if let Some(handle) = self.peers.lock().unwrap().get(&peer) {
                            handle.send(Message::Piece(index, data));
                            handle.note_sent_piece();
                        }
                    }
                    None => debug!("{peer} requested piece {idx} we don't have; ignoring"),
                }
            }
            Message::Piece(index, data) => {
                let idx = index as usize;
                match self.store.try_commit(idx, data) {
                    CommitOutcome::Committed => {
                        info!("piece {idx} verified, received from {peer}");
                        if let Some(handle) = self.peers.lock().unwrap().get(&peer) {
                            handle.note_received_piece();
                        }
                        self.broadcast_have(idx);
                    }
                    CommitOutcome::AlreadyHad => {
                        debug!("piece {idx} arrived twice, this time from {peer}");
                    }
                    CommitOutcome::HashMismatch => {
                        warn!("piece {idx} from {peer} failed verification");
                    }
                }
            }
        }
    }

    /// Sets the exit flag and drops every peer handle, which drops the
    /// outbound sender and lets each writer thread drain and exit; sockets
    /// close on drop, so receive threads observe EOF on their next read.
    pub fn shutdown(&self) {
        self.exit.store(true, Ordering::SeqCst);
        self.peers.lock().unwrap().clear();
    }

    fn is_shutting_down(&self) -> bool {
        self.exit.load(Ordering::SeqCst)
    }
}

fn register_connection(engine: &Arc<Engine>, peer: PeerId, stream: TcpStream, send_bitfield: bool) {
    let dispatch_engine = engine.clone();
    let handle = match connection::spawn(peer, stream, move |message| {
        dispatch_engine.handle_message(peer, message);
    }) {
        Ok(h) => Arc::new(h),
        Err(e) => {
            warn!("failed to spawn connection threads for {peer}: {e}");
            return;
        }
    };

    if send_bitfield {
        handle.send(Message::Bitfield(engine.current_bitfield_bytes()));
    }
    engine.peers.lock().unwrap().insert(peer, handle);
}

/// Dials `peer` directly and sends it our current BITFIELD, the same as an
/// outbound connection made during tracker-driven startup. Exposed so
/// tests (and any caller wiring peers without a tracker) can build a swarm
/// by hand.
pub fn connect(engine: &Arc<Engine>, peer: PeerId) {
    match TcpStream::connect(peer) {
        Ok(stream) => {
            info!("connected outbound to {peer}");
            register_connection(engine, peer, stream, true);
        }
        Err(e) => warn!("could not connect to {peer}: {e}"),
    }
}

fn on_tracker_update(engine: &Arc<Engine>, membership: Vec<PeerId>) {
    let departed = engine.swarm.replace(membership.clone());
    for peer in departed {
        engine.remove_peer(peer);
    }
    for peer in membership {
        if peer == engine.self_id {
            continue;
        }
        if !engine.peers.lock().unwrap().contains_key(&peer) {
            connect(engine, peer);
        }
    }
}

/// Spawns the inbound-connection acceptor on `listener` and returns
/// immediately; accepted connections register themselves the same way
/// outbound ones do. Used directly by `start`, and by callers (tests)
/// wiring a swarm without a tracker.
pub fn listen(engine: Arc<Engine>, listener: TcpListener) {
    thread::spawn(move || accept_loop(engine, listener));
}

fn accept_loop(engine: Arc<Engine>, listener: TcpListener) {
    for stream in listener.incoming() {
        if engine.is_shutting_down() {
            break;
        }
        match stream {
            Ok(stream) => match stream.peer_addr() {
                Ok(peer) => {
                    info!("accepted inbound connection from {peer}");
                    register_connection(&engine, peer, stream, false);
                }
                Err(e) => warn!("inbound connection with no peer address: {e}"),
            },
            Err(e) => warn!("accept failed: {e}"),
        }
    }
}

/// Registers `engine` with the tracker, connects outbound to the initial
/// membership, and starts the inbound acceptor and tracker-update threads.
/// Returns the tracker `Registration` so the caller can send a graceful
/// quit later.
pub fn start(engine: &Arc<Engine>, tracker_addr: SocketAddr, listener: TcpListener) -> Result<Registration> {
    listen(engine.clone(), listener);

    let update_engine = engine.clone();
    let (registration, initial) = client::register(tracker_addr, engine.self_id.port(), move |membership| {
        on_tracker_update(&update_engine, membership);
    })?;

    on_tracker_update(engine, initial);
    Ok(registration)
}

//! # Download Supervisor
//!
//! The supervisor owns the piece manager and the peer registry, runs a
//! fixed pool of worker threads that consume peer endpoints from the
//! registry, and re-announces to the tracker on its advertised interval.
//!
//! Each worker repeatedly takes an endpoint and runs a peer session
//! against it, swallowing and logging session errors. When the piece
//! manager reports completion (or a fatal storage error), the supervisor
//! raises the shutdown flag, enqueues one sentinel endpoint per worker to
//! release any blocked `take`, and joins every thread before returning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::manager::PieceManager;
use crate::registry::PeerRegistry;
use crate::session::PeerSession;
use crate::torrent::Torrent;
use crate::tracker;

// Number of worker slots running peer sessions
const NB_WORKERS: usize = 40;

// Port advertised to the tracker
const LISTEN_PORT: u16 = 6881;

// Delay before retrying after a failed announce
const ANNOUNCE_BACKOFF_SECS: u64 = 30;

// Announce attempts before giving up at startup
const INITIAL_ANNOUNCE_ATTEMPTS: u32 = 5;

// How often the main thread checks for completion
const COMPLETION_POLL: Duration = Duration::from_secs(1);

/// Coordinates workers, tracker refreshes and shutdown for one download.
pub struct Supervisor {
    torrent: Torrent,
    manager: Arc<PieceManager>,
    registry: Arc<PeerRegistry>,
    shutdown: Arc<AtomicBool>,
}

impl Supervisor {
    /// Build a new supervisor.
    pub fn new(torrent: Torrent, manager: PieceManager) -> Supervisor {
        Supervisor {
            torrent,
            manager: Arc::new(manager),
            registry: Arc::new(PeerRegistry::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run the download to completion.
    pub fn download(self) -> Result<()> {
        println!(
            "Downloading {:?} ({} pieces)",
            self.torrent.name(),
            self.manager.piece_count()
        );

        // Seed the registry with the first batch of peers
        let interval = self.initial_announce()?;

        // Start worker slots
        let mut workers = vec![];
        for slot in 0..NB_WORKERS {
            let registry = Arc::clone(&self.registry);
            let manager = Arc::clone(&self.manager);
            let shutdown = Arc::clone(&self.shutdown);
            let peer_id = self.torrent.peer_id().to_vec();
            let info_hash = self.torrent.info_hash().to_vec();

            workers.push(thread::spawn(move || {
                worker_loop(slot, &registry, &manager, &shutdown, &peer_id, &info_hash);
            }));
        }

        // Start the periodic tracker refresh
        let refresher = {
            let torrent = self.torrent.clone();
            let registry = Arc::clone(&self.registry);
            let manager = Arc::clone(&self.manager);
            let shutdown = Arc::clone(&self.shutdown);

            thread::spawn(move || {
                refresh_loop(&torrent, &registry, &manager, &shutdown, interval);
            })
        };

        // Wait until every piece is in, or storage gave out
        while self.manager.failure().is_none() && !self.manager.is_complete() {
            thread::sleep(COMPLETION_POLL);
        }

        // Release every worker slot and wind the pool down
        self.shutdown.store(true, Ordering::Relaxed);
        for _ in 0..NB_WORKERS {
            self.registry.add_sentinel();
        }
        for worker in workers {
            let _ = worker.join();
        }
        let _ = refresher.join();

        if let Some(failure) = self.manager.failure() {
            return Err(anyhow!(failure));
        }

        info!("Downloaded {:?} successfully", self.torrent.name());

        Ok(())
    }

    /// Announce to the tracker until it yields a first peer set.
    fn initial_announce(&self) -> Result<u64> {
        for attempt in 1..=INITIAL_ANNOUNCE_ATTEMPTS {
            match tracker::announce(
                self.torrent.announce(),
                self.torrent.info_hash(),
                self.torrent.peer_id(),
                LISTEN_PORT,
                self.torrent.length(),
                0,
            ) {
                Ok(response) => {
                    info!("Tracker returned {} peers", response.peers.len());
                    for peer in response.peers {
                        self.registry.add(peer);
                    }
                    return Ok(response.interval);
                }
                Err(error) => {
                    warn!(
                        "Announce failed (attempt {}/{}): {}",
                        attempt, INITIAL_ANNOUNCE_ATTEMPTS, error
                    );
                    if attempt < INITIAL_ANNOUNCE_ATTEMPTS {
                        thread::sleep(Duration::from_secs(ANNOUNCE_BACKOFF_SECS));
                    }
                }
            }
        }

        Err(anyhow!("could not reach tracker"))
    }
}

/// One worker slot: run peer sessions until shutdown or completion.
fn worker_loop(
    slot: usize,
    registry: &PeerRegistry,
    manager: &Arc<PieceManager>,
    shutdown: &AtomicBool,
    peer_id: &[u8],
    info_hash: &[u8],
) {
    while !shutdown.load(Ordering::Relaxed) && !manager.is_complete() {
        let peer = match registry.take() {
            Ok(peer) => peer,
            Err(_) => return,
        };

        // A sentinel releases this slot for good
        if peer.is_sentinel() {
            debug!("Worker {} released", slot);
            return;
        }

        let mut session = match PeerSession::connect(
            peer.clone(),
            peer_id.to_vec(),
            info_hash.to_vec(),
            Arc::clone(manager),
        ) {
            Ok(session) => session,
            Err(error) => {
                debug!("Worker {}: {}", slot, error);
                continue;
            }
        };

        if let Err(error) = session.run(shutdown) {
            debug!("Worker {}: session with {} ended: {}", slot, peer, error);
        }

        // Whatever happened, the peer's bitfield must not linger
        manager.remove_peer(session.remote_id());
    }
}

/// Re-announce to the tracker on its advertised cadence.
fn refresh_loop(
    torrent: &Torrent,
    registry: &PeerRegistry,
    manager: &PieceManager,
    shutdown: &AtomicBool,
    mut interval: u64,
) {
    loop {
        // Sleep through the interval, waking early on shutdown
        for _ in 0..interval.max(1) {
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            thread::sleep(Duration::from_secs(1));
        }

        match tracker::announce(
            torrent.announce(),
            torrent.info_hash(),
            torrent.peer_id(),
            LISTEN_PORT,
            torrent.length(),
            manager.bytes_downloaded(),
        ) {
            Ok(response) => {
                debug!("Tracker refresh returned {} peers", response.peers.len());
                for peer in response.peers {
                    registry.add(peer);
                }
                interval = response.interval;
            }
            Err(error) => {
                warn!("Announce failed: {}", error);
                interval = ANNOUNCE_BACKOFF_SECS;
            }
        }
    }
}

//! # Peer Registry
//!
//! A thread-safe FIFO queue of peer endpoints discovered through the
//! tracker. Worker threads block on `take` until an endpoint is available;
//! producers never block. Endpoints are de-duplicated by `(ip, port)` so a
//! peer returned by several announces is only handed out once.
//!
//! At shutdown the supervisor enqueues one sentinel endpoint per worker;
//! the sentinel bypasses de-duplication and releases a blocked consumer.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::peer::Peer;

/// Thread-safe queue of discovered peer endpoints.
pub struct PeerRegistry {
    sender: Sender<Peer>,
    receiver: Receiver<Peer>,
    seen: Mutex<HashSet<Peer>>,
}

impl PeerRegistry {
    /// Build a new, empty registry.
    pub fn new() -> PeerRegistry {
        let (sender, receiver) = unbounded();

        PeerRegistry {
            sender,
            receiver,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Enqueue a peer endpoint.
    ///
    /// Duplicate endpoints are dropped. Never blocks.
    pub fn add(&self, peer: Peer) {
        // Only hand out each endpoint once
        if !self.seen.lock().unwrap().insert(peer.clone()) {
            return;
        }

        // Receiver lives as long as the registry, send cannot fail
        let _ = self.sender.send(peer);
    }

    /// Enqueue one shutdown sentinel, releasing one blocked consumer.
    pub fn add_sentinel(&self) {
        let _ = self.sender.send(Peer::sentinel());
    }

    /// Dequeue the next peer endpoint, blocking while the queue is empty.
    pub fn take(&self) -> Result<Peer> {
        self.receiver
            .recv()
            .map_err(|_| anyhow!("peer registry is closed"))
    }
}

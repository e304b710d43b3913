//! # BitTorrent Peer Endpoints
//!
//! This module defines the `Peer` endpoint type and the parsing of the
//! compact peer format returned by trackers.
//!
//! ## Compact Peer Format
//!
//! The compact format consists of 6-byte entries:
//!
//! ```text
//! <IP: 4 bytes><Port: 2 bytes>
//! ```
//!
//! - IP address in network byte order (big-endian)
//! - Port number in network byte order (big-endian)
//!
//! The reserved address `0.0.0.0` is never a real peer; it is used as a
//! sentinel endpoint to release workers blocked on the peer registry at
//! shutdown.

use std::fmt;
use std::io::Cursor;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::{anyhow, Result};
use byteorder::{BigEndian, ReadBytesExt};

const PEER_SIZE: usize = 6;

/// A peer endpoint discovered through the tracker.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Peer {
    /// IPv4 address of the peer
    pub ip: Ipv4Addr,
    /// Port number for connecting to the peer
    pub port: u16,
}

impl Peer {
    /// Build a new peer endpoint.
    pub fn new(ip: Ipv4Addr, port: u16) -> Peer {
        Peer { ip, port }
    }

    /// Build the sentinel endpoint used to release blocked workers.
    pub fn sentinel() -> Peer {
        Peer {
            ip: Ipv4Addr::UNSPECIFIED,
            port: 0,
        }
    }

    /// Returns whether this endpoint is the shutdown sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.ip == Ipv4Addr::UNSPECIFIED
    }

    /// Returns the socket address of this endpoint.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.ip), self.port)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Parse a compact peer list from a tracker response.
///
/// # Arguments
///
/// * `tracker_peers` - Compact binary peer list where each peer is 6 bytes:
///   4 bytes of IPv4 address followed by a 2-byte big-endian port.
///
pub fn build_peers(tracker_peers: &[u8]) -> Result<Vec<Peer>> {
    // Check tracker peers are valid
    if !tracker_peers.len().is_multiple_of(PEER_SIZE) {
        return Err(anyhow!("received invalid peers from tracker"));
    }

    // Get number of peers
    let nb_peers = tracker_peers.len() / PEER_SIZE;

    // Build peers
    let mut peers: Vec<Peer> = Vec::with_capacity(nb_peers);

    for i in 0..nb_peers {
        let offset = i * PEER_SIZE;

        // Read peer IP address
        let ip = Ipv4Addr::new(
            tracker_peers[offset],
            tracker_peers[offset + 1],
            tracker_peers[offset + 2],
            tracker_peers[offset + 3],
        );

        // Read peer port
        let port_bytes = &tracker_peers[offset + 4..offset + 6];
        let mut port_cursor = Cursor::new(port_bytes);
        let port = port_cursor.read_u16::<BigEndian>()?;

        peers.push(Peer::new(ip, port));
    }

    Ok(peers)
}

//! # BitTorrent Handshake Protocol
//!
//! This module implements the fixed 68-byte opening exchange that
//! authenticates the torrent and identifies the peer.
//!
//! ## Message Format
//!
//! ```text
//! <pstrlen><pstr><reserved><info_hash><peer_id>
//! ```
//!
//! - **pstrlen**: 1 byte - Length of protocol string (19)
//! - **pstr**: 19 bytes - Protocol identifier ("BitTorrent protocol")
//! - **reserved**: 8 bytes - All zeros (for future extensions)
//! - **info_hash**: 20 bytes - SHA-1 hash of torrent info dictionary
//! - **peer_id**: 20 bytes - Unique identifier for the peer
//!
//! The info hash is what ties a connection to a torrent: a peer whose
//! handshake carries a different info hash is on the wrong swarm and the
//! connection must be dropped.

use anyhow::{anyhow, Result};

const PROTOCOL_ID: &str = "BitTorrent protocol";

/// The opening frame exchanged with every peer.
///
/// Both sides send one as soon as the TCP connection is up; nothing else
/// may cross the wire before it.
pub struct Handshake {
    /// Protocol string length, 19 on the standard protocol
    pub pstrlen: usize,
    /// The protocol string itself
    pub pstr: Vec<u8>,
    /// Extension bits, all zero for this client
    pub reserved: Vec<u8>,
    /// Identifies the torrent this connection is about
    pub info_hash: Vec<u8>,
    /// Identifies the peer that sent the frame
    pub peer_id: Vec<u8>,
}

impl Handshake {
    /// Build a new handshake.
    ///
    /// # Arguments
    ///
    /// * `peer_id` - 20-byte unique identifier for this client.
    /// * `info_hash` - 20-byte SHA-1 hash of the torrent's info dictionary.
    ///
    pub fn new(peer_id: Vec<u8>, info_hash: Vec<u8>) -> Self {
        let pstr = PROTOCOL_ID.as_bytes().to_vec();

        Handshake {
            pstrlen: pstr.len(),
            pstr,
            reserved: vec![0; 8],
            info_hash,
            peer_id,
        }
    }

    /// Serialize handshake.
    ///
    /// Total size is 49 + pstrlen bytes, 68 bytes for the standard protocol.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut serialized: Vec<u8> = vec![];

        // Add pstrlen
        serialized.push(self.pstrlen as u8);

        // Add pstr
        serialized.extend_from_slice(&self.pstr);

        // Add reserved
        serialized.extend_from_slice(&self.reserved);

        // Add info hash
        serialized.extend_from_slice(&self.info_hash);

        // Add peer id
        serialized.extend_from_slice(&self.peer_id);

        Ok(serialized)
    }
}

/// Deserialize a received handshake.
///
/// The buffer holds everything after the pstrlen byte: the protocol string,
/// 8 reserved bytes, the 20-byte info hash and the 20-byte peer id.
///
/// # Arguments
///
/// * `buf` - Byte buffer containing the handshake minus its first byte.
/// * `pstrlen` - Length of the protocol string (first byte of handshake).
///
pub fn deserialize_handshake(buf: &[u8], pstrlen: usize) -> Result<Handshake> {
    // Check the buffer holds all handshake fields
    if buf.len() != pstrlen + 48 {
        return Err(anyhow!("received invalid handshake length from peer"));
    }

    // Get pstr
    let pstr = buf[0..pstrlen].to_vec();
    // Get reserved
    let reserved = buf[pstrlen..(pstrlen + 8)].to_vec();
    // Get info hash
    let info_hash = buf[(pstrlen + 8)..(pstrlen + 8 + 20)].to_vec();
    // Get peer id
    let peer_id = buf[(pstrlen + 8 + 20)..].to_vec();

    // Build handshake
    let handshake = Handshake {
        pstrlen,
        pstr,
        reserved,
        info_hash,
        peer_id,
    };

    Ok(handshake)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_is_68_bytes() {
        let handshake = Handshake::new(vec![1; 20], vec![2; 20]);
        let serialized = handshake.serialize().unwrap();

        assert_eq!(serialized.len(), 68);
        assert_eq!(serialized[0], 19);
        assert_eq!(&serialized[1..20], PROTOCOL_ID.as_bytes());
        assert_eq!(&serialized[20..28], &[0; 8]);
    }

    #[test]
    fn roundtrip_preserves_info_hash_and_peer_id() {
        let info_hash: Vec<u8> = (0..20).collect();
        let peer_id: Vec<u8> = (20..40).collect();
        let serialized = Handshake::new(peer_id.clone(), info_hash.clone())
            .serialize()
            .unwrap();

        let pstrlen = serialized[0] as usize;
        let decoded = deserialize_handshake(&serialized[1..], pstrlen).unwrap();

        assert_eq!(decoded.pstr, PROTOCOL_ID.as_bytes());
        assert_eq!(decoded.info_hash, info_hash);
        assert_eq!(decoded.peer_id, peer_id);
    }

    #[test]
    fn deserialize_rejects_truncated_buffer() {
        let serialized = Handshake::new(vec![1; 20], vec![2; 20]).serialize().unwrap();
        assert!(deserialize_handshake(&serialized[1..60], 19).is_err());
    }
}

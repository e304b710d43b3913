//! # Peer Session
//!
//! One session drives the full conversation with a single remote peer:
//! dialing, the 68-byte handshake, the initial bitfield, then the message
//! exchange loop that feeds received blocks to the piece manager and pumps
//! out block requests while unchoked.
//!
//! ## Lifecycle
//!
//! 1. **Dialing**: TCP connect with a 15-second timeout
//! 2. **Handshaking**: exchange handshakes, verify the info hash matches
//! 3. **Bitfield**: the first frame should be the peer's bitfield; peers
//!    that skip it are registered with an all-zero bitfield instead
//! 4. **Exchanging**: read one frame at a time, dispatch it, then request
//!    the next block if allowed
//!
//! At most one block request is outstanding at any time, so a PIECE frame
//! always answers the most recent request unambiguously. Any failure
//! closes the session; the worker that ran it simply picks up the next
//! peer endpoint from the registry.

use std::io::{Cursor, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use byteorder::{BigEndian, ReadBytesExt};

use crate::handshake::{deserialize_handshake, Handshake};
use crate::manager::PieceManager;
use crate::message::*;
use crate::peer::Peer;

// Timeout for establishing the TCP connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

// Socket timeout while exchanging handshakes
const HANDSHAKE_TIMEOUT_SECS: u64 = 15;

// Socket timeout for any single read or write after the handshake
const EXCHANGE_TIMEOUT_SECS: u64 = 120;

// Largest legal frame is a block plus its header
const MESSAGE_LEN_MAX: usize = 1 << 17;

/// A connection to one remote peer, driving the wire protocol for it.
pub struct PeerSession {
    /// Endpoint of the remote peer
    peer: Peer,
    /// TCP stream connection to the peer
    conn: TcpStream,
    /// 20-byte identifier of this client instance
    our_id: Vec<u8>,
    /// 20-byte SHA-1 hash of the torrent's info dictionary
    info_hash: Vec<u8>,
    /// The peer's self-declared 20-byte id, learned during the handshake
    remote_id: Vec<u8>,
    /// Whether the peer has choked this client
    choked: bool,
    /// Whether a block request is outstanding
    request_pending: bool,
    /// Whether the peer currently believes we are interested
    interested: bool,
    /// Shared piece and block state
    manager: Arc<PieceManager>,
}

impl PeerSession {
    /// Establish a TCP connection to a peer.
    ///
    /// # Arguments
    ///
    /// * `peer` - Endpoint of the remote peer.
    /// * `our_id` - 20-byte unique identifier for this client.
    /// * `info_hash` - 20-byte SHA-1 hash of the torrent's info dictionary.
    /// * `manager` - Shared piece manager fed by this session.
    ///
    pub fn connect(
        peer: Peer,
        our_id: Vec<u8>,
        info_hash: Vec<u8>,
        manager: Arc<PieceManager>,
    ) -> Result<PeerSession> {
        // Open connection with remote peer
        let conn = match TcpStream::connect_timeout(&peer.socket_addr(), CONNECT_TIMEOUT) {
            Ok(conn) => conn,
            Err(_) => return Err(anyhow!("could not connect to peer {}", peer)),
        };

        debug!("Connected to peer {}", peer);

        Ok(PeerSession {
            peer,
            conn,
            our_id,
            info_hash,
            remote_id: vec![],
            choked: true,
            request_pending: false,
            interested: false,
            manager,
        })
    }

    /// Returns the peer's self-declared id, empty before the handshake.
    pub fn remote_id(&self) -> &[u8] {
        &self.remote_id
    }

    /// Drive the session until completion, shutdown or an error.
    ///
    /// The caller must call `PieceManager::remove_peer` once this returns,
    /// whatever the outcome.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        self.set_connection_timeout(HANDSHAKE_TIMEOUT_SECS)?;
        self.handshake_with_peer()?;

        // We are always interested and never choke in a download-only client
        self.send_message(&Message::new(MESSAGE_INTERESTED))?;
        self.interested = true;
        self.send_message(&Message::new(MESSAGE_UNCHOKE))?;

        self.set_connection_timeout(EXCHANGE_TIMEOUT_SECS)?;
        self.await_bitfield()?;
        self.pump_requests()?;

        while !shutdown.load(Ordering::Relaxed) && !self.manager.is_complete() {
            let message = self.read_message()?;
            self.dispatch(message)?;
            self.pump_requests()?;
        }

        Ok(())
    }

    /// Perform the BitTorrent handshake with the remote peer.
    ///
    /// A peer whose handshake carries a different info hash is on the
    /// wrong swarm and the session fails.
    fn handshake_with_peer(&mut self) -> Result<()> {
        // Send our handshake
        let handshake = Handshake::new(self.our_id.clone(), self.info_hash.clone());
        let handshake_encoded: Vec<u8> = handshake.serialize()?;
        if self.conn.write_all(&handshake_encoded).is_err() {
            return Err(anyhow!("could not send handshake to peer"));
        }

        // Read handshake received from remote peer
        let handshake_len: usize = self.read_handshake_len()?;
        let mut handshake_buf: Vec<u8> = vec![0; 48 + handshake_len];
        if self.conn.read_exact(&mut handshake_buf).is_err() {
            return Err(anyhow!("could not read handshake received from peer"));
        }

        // Check info hash received from remote peer
        let handshake_decoded: Handshake = deserialize_handshake(&handshake_buf, handshake_len)?;
        if handshake_decoded.info_hash != self.info_hash {
            return Err(anyhow!("info hash mismatch in handshake received from peer"));
        }

        // Store the peer's self-declared id
        self.remote_id = handshake_decoded.peer_id;

        Ok(())
    }

    /// Read the first byte of the peer's handshake, the protocol string length.
    fn read_handshake_len(&mut self) -> Result<usize> {
        // Read 1 byte into buffer
        let mut buf = [0; 1];
        if self.conn.read_exact(&mut buf).is_err() {
            return Err(anyhow!(
                "could not read handshake length received from peer"
            ));
        }

        // Get handshake length
        let handshake_len = buf[0];
        if handshake_len == 0 {
            return Err(anyhow!("invalid handshake length received from peer"));
        }

        Ok(handshake_len as usize)
    }

    /// Register the peer's piece inventory from its first frame.
    ///
    /// The first frame should be a bitfield. A peer that opens with any
    /// other valid message gets an all-zero bitfield and the frame is
    /// processed normally.
    fn await_bitfield(&mut self) -> Result<()> {
        let message: Message = self.read_message()?;

        if message.id == MESSAGE_BITFIELD {
            debug!("Receive MESSAGE_BITFIELD from peer {}", self.peer);
            return self.manager.add_peer(&self.remote_id, message.payload);
        }

        self.manager
            .add_peer(&self.remote_id, self.manager.empty_bitfield())?;
        self.dispatch(message)
    }

    /// Process one message received from the peer.
    fn dispatch(&mut self, message: Message) -> Result<()> {
        match message.id {
            MESSAGE_KEEPALIVE => {}
            MESSAGE_CHOKE => {
                debug!("Receive MESSAGE_CHOKE from peer {}", self.peer);
                self.choked = true;
            }
            MESSAGE_UNCHOKE => {
                debug!("Receive MESSAGE_UNCHOKE from peer {}", self.peer);
                self.choked = false;
            }
            MESSAGE_HAVE => {
                let index = message.have_index()?;
                debug!("Receive MESSAGE_HAVE {} from peer {}", index, self.peer);
                self.manager.update_peer(&self.remote_id, index);
            }
            MESSAGE_PIECE => {
                let (index, begin, block) = message.piece_block()?;
                debug!(
                    "Download piece {} [{}:{}] from peer {}",
                    index,
                    begin,
                    begin + block.len() as u32,
                    self.peer
                );
                self.request_pending = false;
                self.manager
                    .block_received(&self.remote_id, index, begin, block)?;
            }
            // Valid but meaningless to a download-only client
            _ => debug!(
                "Ignoring message id {} from peer {}",
                message.id, self.peer
            ),
        }

        Ok(())
    }

    /// Issue the next block request if the session is allowed to.
    ///
    /// Requests are pumped one at a time: only when the peer has unchoked
    /// us, no request is outstanding, and the download is incomplete.
    fn pump_requests(&mut self) -> Result<()> {
        if self.choked || self.request_pending || self.manager.is_complete() {
            return Ok(());
        }

        match self.manager.next_request(&self.remote_id) {
            Some(request) => {
                if !self.interested {
                    self.send_message(&Message::new(MESSAGE_INTERESTED))?;
                    self.interested = true;
                }
                debug!(
                    "Send MESSAGE_REQUEST for piece {} [{}:{}] to peer {}",
                    request.piece_index,
                    request.begin,
                    request.begin + request.length,
                    self.peer
                );
                let message = Message::request(request.piece_index, request.begin, request.length)?;
                self.send_message(&message)?;
                self.request_pending = true;
            }
            None => {
                // The peer has nothing useful for us right now
                if self.interested {
                    self.send_message(&Message::new(MESSAGE_NOT_INTERESTED))?;
                    self.interested = false;
                }
            }
        }

        Ok(())
    }

    /// Read and parse one frame from the peer.
    fn read_message(&mut self) -> Result<Message> {
        let message_len: usize = self.read_message_len()?;

        // If message length is 0, it's a keep-alive
        if message_len == 0 {
            debug!("Receive KEEP_ALIVE from peer {}", self.peer);
            return Ok(Message::new(MESSAGE_KEEPALIVE));
        }

        if message_len > MESSAGE_LEN_MAX {
            return Err(anyhow!("received oversized message from peer"));
        }

        // Read message
        let mut message_buf: Vec<u8> = vec![0; message_len];
        if self.conn.read_exact(&mut message_buf).is_err() {
            return Err(anyhow!("could not read message received from peer"));
        }

        // Deserialize message
        deserialize_message(&message_buf)
    }

    /// Read the 4-byte big-endian length prefix of an incoming frame.
    fn read_message_len(&mut self) -> Result<usize> {
        // Read bytes into buffer
        let mut buf = vec![0; 4];
        if self.conn.read_exact(&mut buf).is_err() {
            return Err(anyhow!("could not read message length received from peer"));
        }

        // Get message length
        let mut cursor = Cursor::new(buf);
        let message_len = cursor.read_u32::<BigEndian>()?;

        Ok(message_len as usize)
    }

    /// Serialize and send one message to the peer.
    fn send_message(&mut self, message: &Message) -> Result<()> {
        let message_encoded = message.serialize()?;
        if self.conn.write_all(&message_encoded).is_err() {
            return Err(anyhow!("could not send message to peer"));
        }
        Ok(())
    }

    /// Set read and write timeouts on the TCP connection.
    fn set_connection_timeout(&self, secs: u64) -> Result<()> {
        // Set write timeout
        if self
            .conn
            .set_write_timeout(Some(Duration::from_secs(secs)))
            .is_err()
        {
            return Err(anyhow!("could not set write timeout"));
        }

        // Set read timeout
        if self
            .conn
            .set_read_timeout(Some(Duration::from_secs(secs)))
            .is_err()
        {
            return Err(anyhow!("could not set read timeout"));
        }

        Ok(())
    }
}

//! # BitTorrent Peer Wire Messages
//!
//! Framing and parsing for the peer protocol. Every frame on the wire is
//! a 4-byte big-endian length prefix followed by that many bytes: one
//! message id byte, then the payload. A zero-length frame is a keep-alive
//! and carries neither.
//!
//! The ids this client understands are choke (0), unchoke (1),
//! interested (2), not-interested (3), have (4), bitfield (5),
//! request (6), piece (7), cancel (8) and port (9). Only choke/unchoke,
//! have, bitfield and piece change the course of a download; the rest
//! exist to be sent, or to be tolerated when received. Decoding a frame
//! whose id is greater than 10 fails: that is a protocol violation, and
//! the session that read it closes.

use std::io::Cursor;

use anyhow::{anyhow, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

type MessageId = u8;
type MessagePayload = Vec<u8>;

pub const MESSAGE_CHOKE: MessageId = 0;
pub const MESSAGE_UNCHOKE: MessageId = 1;
pub const MESSAGE_INTERESTED: MessageId = 2;
pub const MESSAGE_NOT_INTERESTED: MessageId = 3;
pub const MESSAGE_HAVE: MessageId = 4;
pub const MESSAGE_BITFIELD: MessageId = 5;
pub const MESSAGE_REQUEST: MessageId = 6;
pub const MESSAGE_PIECE: MessageId = 7;
#[allow(dead_code)]
pub const MESSAGE_CANCEL: MessageId = 8;
#[allow(dead_code)]
pub const MESSAGE_PORT: MessageId = 9;
pub const MESSAGE_KEEPALIVE: MessageId = 255; // Special value for keep-alive (length 0)

// Highest message id tolerated on the wire
const MESSAGE_ID_MAX: MessageId = 10;

#[derive(Default, Debug, PartialEq, Eq)]
pub struct Message {
    /// Message type identifier
    pub id: MessageId,
    /// Message payload data
    pub payload: MessagePayload,
}

impl Message {
    /// Build a new message.
    ///
    /// # Arguments
    ///
    /// * `id` - The type of the message.
    ///
    pub fn new(id: MessageId) -> Self {
        Message {
            id,
            payload: vec![],
        }
    }

    /// Build a new message with a payload.
    ///
    /// # Arguments
    ///
    /// * `id` - The type of the message.
    /// * `payload` - The content of the message.
    ///
    pub fn new_with_payload(id: MessageId, payload: MessagePayload) -> Self {
        Message { id, payload }
    }

    /// Build a REQUEST message for a block.
    ///
    /// # Arguments
    ///
    /// * `index` - Zero-based piece index.
    /// * `begin` - Zero-based byte offset within the piece.
    /// * `length` - Number of bytes requested.
    ///
    pub fn request(index: u32, begin: u32, length: u32) -> Result<Self> {
        let mut payload: Vec<u8> = vec![];
        payload.write_u32::<BigEndian>(index)?;
        payload.write_u32::<BigEndian>(begin)?;
        payload.write_u32::<BigEndian>(length)?;

        Ok(Message::new_with_payload(MESSAGE_REQUEST, payload))
    }

    /// Get the piece index carried by a HAVE message.
    pub fn have_index(&self) -> Result<u32> {
        // Check if message id and payload are valid
        if self.id != MESSAGE_HAVE || self.payload.len() != 4 {
            return Err(anyhow!("received invalid MESSAGE_HAVE from peer"));
        }

        // Get piece index
        let mut payload_cursor = Cursor::new(&self.payload);
        let index = payload_cursor.read_u32::<BigEndian>()?;

        Ok(index)
    }

    /// Get the block coordinates and data carried by a PIECE message.
    ///
    /// The payload layout is a 4-byte piece index, a 4-byte byte offset
    /// within the piece, then the block bytes.
    pub fn piece_block(&self) -> Result<(u32, u32, Vec<u8>)> {
        // Check if message id and payload are valid
        if self.id != MESSAGE_PIECE || self.payload.len() < 8 {
            return Err(anyhow!("received invalid MESSAGE_PIECE from peer"));
        }

        // Get piece index and byte offset within piece
        let mut payload_cursor = Cursor::new(&self.payload[0..8]);
        let index = payload_cursor.read_u32::<BigEndian>()?;
        let begin = payload_cursor.read_u32::<BigEndian>()?;

        // Get piece block
        let block: Vec<u8> = self.payload[8..].to_vec();

        Ok((index, begin, block))
    }

    /// Serialize message.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        // A keep-alive is a bare zero length prefix
        if self.id == MESSAGE_KEEPALIVE {
            let mut serialized: Vec<u8> = vec![];
            serialized.write_u32::<BigEndian>(0)?;
            return Ok(serialized);
        }

        // Get message length
        let message_len = 1 + self.payload.len();

        // Create a new buffer
        let mut serialized: Vec<u8> = vec![];

        // Add message length
        serialized.write_u32::<BigEndian>(message_len as u32)?;

        // Add message id
        serialized.push(self.id);

        // Add message payload
        serialized.extend_from_slice(&self.payload);

        Ok(serialized)
    }
}

/// Deserialize message.
///
/// Fails on an empty frame body or a message id greater than 10, which is
/// a protocol violation.
///
/// # Arguments
///
/// * `message_buf` - The frame body to deserialize (message id + payload).
///
pub fn deserialize_message(message_buf: &[u8]) -> Result<Message> {
    // Check the frame carries at least a message id
    if message_buf.is_empty() {
        return Err(anyhow!("received empty message from peer"));
    }

    // Get message id
    let id: MessageId = message_buf[0];
    if id > MESSAGE_ID_MAX {
        return Err(anyhow!("received invalid message id {} from peer", id));
    }

    // Get message payload
    let payload: MessagePayload = message_buf[1..].to_vec();

    // Build message
    let message: Message = Message::new_with_payload(id, payload);

    Ok(message)
}

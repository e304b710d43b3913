//! # Piece and Block Data Model
//!
//! A piece is a fixed-size region of the payload with an a-priori SHA-1
//! hash; the last piece may be shorter. Each piece is subdivided into
//! 16 KiB blocks, the unit of network transfer; the last block of the last
//! piece may be shorter still.
//!
//! Block state transitions are driven exclusively by the piece manager
//! under its lock.

use std::time::Instant;

// Standard block size for piece downloads (16KB)
pub const BLOCK_SIZE_MAX: u32 = 16384;

/// Download state of a single block or piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Missing,
    Pending,
    Retrieved,
}

/// A fixed-size subdivision of a piece, the unit of network transfer.
#[derive(Debug, Clone)]
pub struct Block {
    /// Zero-based index of the owning piece
    pub piece_index: u32,
    /// Byte offset of this block within the piece
    pub begin: u32,
    /// Length of this block in bytes
    pub length: u32,
    /// Download state of this block
    pub state: BlockState,
    /// Received payload bytes, only populated once retrieved
    pub data: Vec<u8>,
    /// Peer id the block was last requested from
    pub requested_from: Option<Vec<u8>>,
    /// When the block entered the pending state
    pub requested_at: Option<Instant>,
}

/// A contiguous fixed-size region of the output payload.
#[derive(Debug, Clone)]
pub struct Piece {
    /// Zero-based index of this piece in the torrent
    pub index: u32,
    /// Total length of the piece in bytes
    pub length: u32,
    /// Expected SHA-1 hash of the piece (20 bytes)
    pub hash: Vec<u8>,
    /// Download state of this piece; `Retrieved` only after verification
    pub state: BlockState,
    /// Blocks within the piece, ordered by offset
    pub blocks: Vec<Block>,
}

impl Piece {
    /// Build a new piece, subdivided into 16 KiB blocks.
    ///
    /// # Arguments
    ///
    /// * `index` - Zero-based piece index in the torrent.
    /// * `length` - Total size of the piece in bytes.
    /// * `hash` - Expected SHA-1 hash of the piece data.
    ///
    pub fn new(index: u32, length: u32, hash: Vec<u8>) -> Piece {
        let mut blocks: Vec<Block> = vec![];
        let mut begin: u32 = 0;

        // Subdivide the piece into blocks, the last may be shorter
        while begin < length {
            let block_length = BLOCK_SIZE_MAX.min(length - begin);

            blocks.push(Block {
                piece_index: index,
                begin,
                length: block_length,
                state: BlockState::Missing,
                data: vec![],
                requested_from: None,
                requested_at: None,
            });

            begin += block_length;
        }

        Piece {
            index,
            length,
            hash,
            state: BlockState::Missing,
            blocks,
        }
    }

    /// Returns whether every block of this piece has been retrieved.
    pub fn all_blocks_retrieved(&self) -> bool {
        self.blocks
            .iter()
            .all(|block| block.state == BlockState::Retrieved)
    }

    /// Returns whether any block of this piece is still missing.
    pub fn has_missing_block(&self) -> bool {
        self.blocks
            .iter()
            .any(|block| block.state == BlockState::Missing)
    }

    /// Concatenate the block payloads in offset order.
    pub fn assemble(&self) -> Vec<u8> {
        let mut data: Vec<u8> = Vec::with_capacity(self.length as usize);
        for block in &self.blocks {
            data.extend_from_slice(&block.data);
        }
        data
    }

    /// Reset every block to missing, clearing payloads and request stamps.
    ///
    /// Used to roll a piece back after a hash mismatch so it is downloaded
    /// again, possibly from other peers.
    pub fn reset(&mut self) {
        self.state = BlockState::Missing;
        for block in self.blocks.iter_mut() {
            block.state = BlockState::Missing;
            block.data = vec![];
            block.requested_from = None;
            block.requested_at = None;
        }
    }

    /// Drop retrieved payloads once the piece has been written to disk.
    pub fn clear_block_data(&mut self) {
        for block in self.blocks.iter_mut() {
            block.data = vec![];
        }
    }
}

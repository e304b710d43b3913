//! # Piece Manager
//!
//! The piece manager is the single owner of authoritative piece and block
//! state, called concurrently by every peer session. It tracks which
//! pieces are outstanding, which blocks have been received and which peers
//! hold which pieces, hands out block requests in rarest-first order,
//! verifies completed pieces against their SHA-1 hashes and writes them to
//! the output file.
//!
//! ## Concurrency
//!
//! All state-mutating operations execute under one coarse mutex, so every
//! observer sees a consistent snapshot. The lock is held for
//! O(pieces x peers) work in the worst case (the rarity tally feeding the
//! rarest-first scan) and for the disk write of a verified piece; a
//! successful write happens at most once per piece and is not on the hot
//! request path.
//!
//! ## Request Policy
//!
//! `next_request` prefers pieces held by the fewest known peers, breaking
//! ties by lowest piece index, and hands out the first missing block of
//! the chosen piece. When a peer has nothing missing to offer, a pending
//! block that has been outstanding longer than the stall threshold may be
//! re-issued; this is the only duplication of work permitted.
//!
//! ## Integrity
//!
//! A piece only reaches the retrieved state after its assembled bytes
//! hash to the expected digest. On a mismatch every block of the piece is
//! rolled back to missing and the piece is downloaded again, possibly
//! from other peers.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use boring::sha::Sha1;
use indicatif::{ProgressBar, ProgressStyle};

use crate::piece::{BlockState, Piece};

// Pending blocks older than this may be re-issued to another peer
const STALL_THRESHOLD: Duration = Duration::from_secs(5);

/// Coordinates of the next block to request from a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequest {
    pub piece_index: u32,
    pub begin: u32,
    pub length: u32,
}

/// Piece and block state shared by all peer sessions.
pub struct PieceManager {
    state: Mutex<ManagerState>,
    /// Size of each piece in bytes (except possibly the last)
    piece_length: u32,
    /// Number of pieces in the torrent
    nb_pieces: usize,
    /// Progress bar advanced once per verified piece
    progress: ProgressBar,
}

struct ManagerState {
    /// All pieces of the torrent, indexed by piece index
    pieces: Vec<Piece>,
    /// Bitfield of every known peer, keyed by its 20-byte id
    peers: HashMap<Vec<u8>, Vec<u8>>,
    /// Preallocated output file
    output: File,
    /// Number of pieces verified and written so far
    nb_pieces_done: usize,
    /// Sum of verified piece lengths
    bytes_done: u64,
    /// First storage error encountered, fatal for the download
    failure: Option<String>,
}

/// Check for piece index into a bitfield.
fn has_piece(bitfield: &[u8], index: usize) -> bool {
    let byte_index = index / 8;
    let offset = index % 8;

    // Prevent unbounded values
    if byte_index < bitfield.len() {
        return bitfield[byte_index] >> (7 - offset) & 1 != 0;
    }
    false
}

/// Set piece index into a bitfield.
fn set_piece(bitfield: &mut [u8], index: usize) {
    let byte_index = index / 8;
    let offset = index % 8;

    if byte_index < bitfield.len() {
        bitfield[byte_index] |= 1 << (7 - offset);
    }
}

impl PieceManager {
    /// Build a new piece manager and preallocate the output file.
    ///
    /// # Arguments
    ///
    /// * `pieces_hashes` - Expected SHA-1 hash of each piece.
    /// * `piece_length` - Size of each piece in bytes (except possibly the last).
    /// * `total_length` - Total file size in bytes.
    /// * `output_path` - Path where the downloaded payload is written.
    ///
    pub fn new(
        pieces_hashes: &[Vec<u8>],
        piece_length: u32,
        total_length: u64,
        output_path: &Path,
    ) -> Result<PieceManager> {
        // Check piece hashes cover the file
        let nb_pieces = total_length.div_ceil(piece_length as u64) as usize;
        if nb_pieces != pieces_hashes.len() {
            return Err(anyhow!("piece hashes do not match file size"));
        }

        // Build pieces, the last may be shorter
        let mut pieces: Vec<Piece> = Vec::with_capacity(nb_pieces);
        for (index, hash) in pieces_hashes.iter().enumerate() {
            let begin = index as u64 * piece_length as u64;
            let length = (piece_length as u64).min(total_length - begin) as u32;
            pieces.push(Piece::new(index as u32, length, hash.clone()));
        }

        // Create output file preallocated to the payload size
        let output = match File::create(output_path) {
            Ok(file) => file,
            Err(error) => {
                return Err(anyhow!(
                    "could not create output file {:?}: {}",
                    output_path,
                    error
                ))
            }
        };
        if let Err(error) = output.set_len(total_length) {
            return Err(anyhow!(
                "could not preallocate output file {:?}: {}",
                output_path,
                error
            ));
        }

        // Create progress bar
        let progress = ProgressBar::new(total_length);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {bytes}/{total_bytes} [{bar:40.cyan/blue}] {percent}%")
                .unwrap()
                .progress_chars("#>-"),
        );

        Ok(PieceManager {
            state: Mutex::new(ManagerState {
                pieces,
                peers: HashMap::new(),
                output,
                nb_pieces_done: 0,
                bytes_done: 0,
                failure: None,
            }),
            piece_length,
            nb_pieces,
            progress,
        })
    }

    /// Returns the number of pieces in the torrent.
    pub fn piece_count(&self) -> usize {
        self.nb_pieces
    }

    /// Returns an all-zero bitfield sized for this torrent.
    pub fn empty_bitfield(&self) -> Vec<u8> {
        vec![0; self.nb_pieces.div_ceil(8)]
    }

    /// Record the pieces a newly connected peer holds.
    ///
    /// The bitfield must span exactly the piece count rounded up to whole
    /// bytes, and the spare bits of the final byte must be zero; a
    /// violating peer is rejected.
    pub fn add_peer(&self, peer_id: &[u8], bitfield: Vec<u8>) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        // Check bitfield length against the piece count
        let expected_len = self.nb_pieces.div_ceil(8);
        if bitfield.len() != expected_len {
            return Err(anyhow!("received invalid bitfield length from peer"));
        }

        // Check spare bits in the final byte are zero
        let spare_bits = expected_len * 8 - self.nb_pieces;
        if spare_bits > 0 && bitfield[expected_len - 1] & ((1 << spare_bits) - 1) != 0 {
            return Err(anyhow!("received bitfield with spare bits set from peer"));
        }

        state.peers.insert(peer_id.to_vec(), bitfield);

        Ok(())
    }

    /// Record that a peer now holds one more piece.
    pub fn update_peer(&self, peer_id: &[u8], piece_index: u32) {
        let mut state = self.state.lock().unwrap();

        if piece_index as usize >= self.nb_pieces {
            warn!("ignoring HAVE for unknown piece {}", piece_index);
            return;
        }

        match state.peers.get_mut(peer_id) {
            Some(bitfield) => set_piece(bitfield, piece_index as usize),
            None => debug!("ignoring HAVE from unknown peer"),
        }
    }

    /// Forget a peer entirely.
    pub fn remove_peer(&self, peer_id: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.peers.remove(peer_id);
    }

    /// Select the next block to request from a peer.
    ///
    /// Walks pieces the peer holds that still have a missing block,
    /// preferring those held by the fewest known peers and breaking ties
    /// by lowest index, and hands out the first missing block of the
    /// chosen piece. Falls back to re-issuing a pending block older than
    /// the stall threshold. Returns `None` when the peer has nothing
    /// useful to offer.
    pub fn next_request(&self, peer_id: &[u8]) -> Option<BlockRequest> {
        let mut state = self.state.lock().unwrap();
        let bitfield = state.peers.get(peer_id)?.clone();
        let now = Instant::now();

        // Tally how many known peers hold each piece, one pass over the swarm
        let mut rarity = vec![0usize; self.nb_pieces];
        for peer_bitfield in state.peers.values() {
            for (index, count) in rarity.iter_mut().enumerate() {
                if has_piece(peer_bitfield, index) {
                    *count += 1;
                }
            }
        }

        // Rarest first: prefer pieces held by the fewest known peers
        let mut chosen: Option<(usize, usize)> = None;
        for (index, piece) in state.pieces.iter().enumerate() {
            if !has_piece(&bitfield, index) || !piece.has_missing_block() {
                continue;
            }
            if chosen.map_or(true, |(best_rarity, _)| rarity[index] < best_rarity) {
                chosen = Some((rarity[index], index));
            }
        }

        if let Some((_, index)) = chosen {
            let piece = &mut state.pieces[index];
            if piece.state == BlockState::Missing {
                piece.state = BlockState::Pending;
            }
            let block = piece
                .blocks
                .iter_mut()
                .find(|block| block.state == BlockState::Missing)?;
            block.state = BlockState::Pending;
            block.requested_from = Some(peer_id.to_vec());
            block.requested_at = Some(now);
            return Some(BlockRequest {
                piece_index: block.piece_index,
                begin: block.begin,
                length: block.length,
            });
        }

        // Nothing missing: re-issue a pending block that has stalled
        let mut stalled: Option<(usize, usize)> = None;
        'pieces: for (index, piece) in state.pieces.iter().enumerate() {
            if !has_piece(&bitfield, index) || piece.state == BlockState::Retrieved {
                continue;
            }
            for (block_index, block) in piece.blocks.iter().enumerate() {
                if block.state != BlockState::Pending {
                    continue;
                }
                let is_stalled = block
                    .requested_at
                    .map_or(true, |at| now.duration_since(at) >= STALL_THRESHOLD);
                if is_stalled {
                    stalled = Some((index, block_index));
                    break 'pieces;
                }
            }
        }

        if let Some((index, block_index)) = stalled {
            let block = &mut state.pieces[index].blocks[block_index];
            debug!(
                "re-issuing stalled block {} [{}] last requested from {:?}",
                block.piece_index, block.begin, block.requested_from
            );
            block.requested_from = Some(peer_id.to_vec());
            block.requested_at = Some(now);
            return Some(BlockRequest {
                piece_index: block.piece_index,
                begin: block.begin,
                length: block.length,
            });
        }

        None
    }

    /// Record a block payload received from a peer.
    ///
    /// Blocks for unknown pieces or unknown coordinates are discarded.
    /// When the last block of a piece arrives the piece is assembled,
    /// verified against its expected hash, and either written to the
    /// output file or rolled back to missing.
    pub fn block_received(
        &self,
        peer_id: &[u8],
        piece_index: u32,
        begin: u32,
        data: Vec<u8>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        {
            // Locate the piece; discard a block for an unknown one
            let piece = match state.pieces.get_mut(piece_index as usize) {
                Some(piece) => piece,
                None => {
                    warn!("discarding block for unknown piece {}", piece_index);
                    return Ok(());
                }
            };

            // A verified piece is never rewritten
            if piece.state == BlockState::Retrieved {
                debug!("discarding block for completed piece {}", piece_index);
                return Ok(());
            }

            // Locate the block by offset and length; discard unknown coordinates
            let block = match piece
                .blocks
                .iter_mut()
                .find(|block| block.begin == begin && block.length == data.len() as u32)
            {
                Some(block) => block,
                None => {
                    warn!(
                        "discarding unknown block {} [{}] ({} bytes) from peer",
                        piece_index,
                        begin,
                        data.len()
                    );
                    return Ok(());
                }
            };

            // Store the payload whatever the block's prior state
            block.data = data;
            block.state = BlockState::Retrieved;
            block.requested_from = None;
            block.requested_at = None;

            if !piece.all_blocks_retrieved() {
                return Ok(());
            }
        }

        // Assemble the piece and verify its integrity
        let assembled;
        let verified_len;
        {
            let piece = &mut state.pieces[piece_index as usize];
            assembled = piece.assemble();

            let mut hasher = Sha1::new();
            hasher.update(&assembled);
            let hash = hasher.finish().to_vec();

            if hash != piece.hash {
                warn!(
                    "could not verify integrity of piece {} downloaded from peer {:?}, retrying",
                    piece_index, peer_id
                );
                piece.reset();
                return Ok(());
            }

            verified_len = piece.length;
            piece.state = BlockState::Retrieved;
            piece.clear_block_data();
        }

        // Persist the verified piece at its offset in the output file
        let offset = piece_index as u64 * self.piece_length as u64;
        let written = state
            .output
            .seek(SeekFrom::Start(offset))
            .and_then(|_| state.output.write_all(&assembled));
        if let Err(error) = written {
            let message = format!("could not write piece {} to output file: {}", piece_index, error);
            error!("{}", message);
            state.failure = Some(message.clone());
            return Err(anyhow!(message));
        }

        state.nb_pieces_done += 1;
        state.bytes_done += verified_len as u64;
        self.progress.inc(verified_len as u64);
        info!(
            "Downloaded piece {} ({}/{})",
            piece_index, state.nb_pieces_done, self.nb_pieces
        );

        if state.nb_pieces_done == self.nb_pieces {
            self.progress.finish();
            info!("Downloaded all {} pieces", self.nb_pieces);
        }

        Ok(())
    }

    /// Returns whether every piece has been verified and written.
    pub fn is_complete(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.nb_pieces_done == self.nb_pieces
    }

    /// Returns the sum of verified piece lengths.
    pub fn bytes_downloaded(&self) -> u64 {
        let state = self.state.lock().unwrap();
        state.bytes_done
    }

    /// Returns the storage error that poisoned the download, if any.
    pub fn failure(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.failure.clone()
    }

    /// Backdate every pending block so stall re-issue can be exercised.
    #[cfg(test)]
    fn age_pending_blocks(&self, age: Duration) {
        let mut state = self.state.lock().unwrap();
        for piece in state.pieces.iter_mut() {
            for block in piece.blocks.iter_mut() {
                if let Some(at) = block.requested_at {
                    block.requested_at = at.checked_sub(age);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    fn sha1(data: &[u8]) -> Vec<u8> {
        let mut hasher = Sha1::new();
        hasher.update(data);
        hasher.finish().to_vec()
    }

    fn output_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("out.bin")
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn single_piece_two_blocks_happy_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = output_path(&dir);
        let data = payload(32768);
        let manager = PieceManager::new(&[sha1(&data)], 32768, 32768, &path).unwrap();
        let peer = vec![1; 20];

        manager.add_peer(&peer, vec![0x80]).unwrap();

        let first = manager.next_request(&peer).unwrap();
        assert_eq!(
            first,
            BlockRequest {
                piece_index: 0,
                begin: 0,
                length: 16384
            }
        );
        let second = manager.next_request(&peer).unwrap();
        assert_eq!(second.begin, 16384);
        assert_eq!(second.length, 16384);

        // Everything is pending now and nothing has stalled yet
        assert!(manager.next_request(&peer).is_none());

        manager
            .block_received(&peer, 0, 0, data[..16384].to_vec())
            .unwrap();
        assert!(!manager.is_complete());
        assert_eq!(manager.bytes_downloaded(), 0);

        manager
            .block_received(&peer, 0, 16384, data[16384..].to_vec())
            .unwrap();

        assert!(manager.is_complete());
        assert_eq!(manager.bytes_downloaded(), 32768);
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[test]
    fn hash_mismatch_rolls_back_and_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = output_path(&dir);
        let data = payload(32768);
        let manager = PieceManager::new(&[sha1(&data)], 32768, 32768, &path).unwrap();
        let bad_peer = vec![1; 20];
        let good_peer = vec![2; 20];

        manager.add_peer(&bad_peer, vec![0x80]).unwrap();
        manager.add_peer(&good_peer, vec![0x80]).unwrap();

        // Corrupt data hashes wrong, so the piece rolls back to missing
        manager
            .block_received(&bad_peer, 0, 0, vec![0xff; 16384])
            .unwrap();
        manager
            .block_received(&bad_peer, 0, 16384, vec![0xff; 16384])
            .unwrap();
        assert!(!manager.is_complete());
        assert_eq!(manager.bytes_downloaded(), 0);

        // The blocks are missing again and can be handed out immediately
        let request = manager.next_request(&good_peer).unwrap();
        assert_eq!(request.begin, 0);

        manager
            .block_received(&good_peer, 0, 0, data[..16384].to_vec())
            .unwrap();
        manager
            .block_received(&good_peer, 0, 16384, data[16384..].to_vec())
            .unwrap();

        assert!(manager.is_complete());
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[test]
    fn unknown_blocks_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let data = payload(32768);
        let manager =
            PieceManager::new(&[sha1(&data)], 32768, 32768, &output_path(&dir)).unwrap();
        let peer = vec![1; 20];
        manager.add_peer(&peer, vec![0x80]).unwrap();

        // Unknown piece index
        manager
            .block_received(&peer, 9, 0, vec![0; 16384])
            .unwrap();
        // Unknown block coordinates within a known piece
        manager.block_received(&peer, 0, 3, vec![0; 5]).unwrap();

        // Nothing was consumed: the first block is still up for grabs
        let request = manager.next_request(&peer).unwrap();
        assert_eq!((request.piece_index, request.begin), (0, 0));
    }

    #[test]
    fn add_peer_validates_bitfield() {
        let dir = tempfile::tempdir().unwrap();
        let data = payload(16384);
        let manager =
            PieceManager::new(&[sha1(&data)], 16384, 16384, &output_path(&dir)).unwrap();
        let peer = vec![1; 20];

        // Wrong lengths
        assert!(manager.add_peer(&peer, vec![]).is_err());
        assert!(manager.add_peer(&peer, vec![0x80, 0x00]).is_err());
        // Spare bits in the final byte must be zero
        assert!(manager.add_peer(&peer, vec![0x41]).is_err());
        // Well-formed
        assert!(manager.add_peer(&peer, vec![0x80]).is_ok());
    }

    #[test]
    fn next_request_never_serves_pieces_the_peer_lacks() {
        let dir = tempfile::tempdir().unwrap();
        let data = payload(32768);
        let hashes = vec![sha1(&data[..16384]), sha1(&data[16384..])];
        let manager = PieceManager::new(&hashes, 16384, 32768, &output_path(&dir)).unwrap();

        let empty_handed = vec![1; 20];
        manager.add_peer(&empty_handed, vec![0x00]).unwrap();
        assert!(manager.next_request(&empty_handed).is_none());

        let second_only = vec![2; 20];
        manager.add_peer(&second_only, vec![0x40]).unwrap();
        let request = manager.next_request(&second_only).unwrap();
        assert_eq!(request.piece_index, 1);
    }

    #[test]
    fn next_request_prefers_rarest_piece() {
        let dir = tempfile::tempdir().unwrap();
        let data = payload(32768);
        let hashes = vec![sha1(&data[..16384]), sha1(&data[16384..])];
        let manager = PieceManager::new(&hashes, 16384, 32768, &output_path(&dir)).unwrap();

        let seeder = vec![1; 20];
        let partial = vec![2; 20];
        manager.add_peer(&seeder, vec![0xc0]).unwrap();
        manager.add_peer(&partial, vec![0x80]).unwrap();

        // Piece 0 is on two peers, piece 1 only on the seeder
        let request = manager.next_request(&seeder).unwrap();
        assert_eq!(request.piece_index, 1);
    }

    #[test]
    fn next_request_breaks_rarity_ties_by_lowest_index() {
        let dir = tempfile::tempdir().unwrap();
        let data = payload(32768);
        let hashes = vec![sha1(&data[..16384]), sha1(&data[16384..])];
        let manager = PieceManager::new(&hashes, 16384, 32768, &output_path(&dir)).unwrap();

        let seeder = vec![1; 20];
        manager.add_peer(&seeder, vec![0xc0]).unwrap();

        let request = manager.next_request(&seeder).unwrap();
        assert_eq!(request.piece_index, 0);
    }

    #[test]
    fn stalled_pending_blocks_are_reissued() {
        let dir = tempfile::tempdir().unwrap();
        let data = payload(32768);
        let manager =
            PieceManager::new(&[sha1(&data)], 32768, 32768, &output_path(&dir)).unwrap();
        let slow_peer = vec![1; 20];
        let fast_peer = vec![2; 20];
        manager.add_peer(&slow_peer, vec![0x80]).unwrap();
        manager.add_peer(&fast_peer, vec![0x80]).unwrap();

        // The slow peer claims both blocks
        manager.next_request(&slow_peer).unwrap();
        manager.next_request(&slow_peer).unwrap();

        // Fresh pending blocks are not duplicated
        assert!(manager.next_request(&fast_peer).is_none());

        // Once past the stall threshold they go to whoever asks
        manager.age_pending_blocks(STALL_THRESHOLD + Duration::from_secs(1));
        let request = manager.next_request(&fast_peer).unwrap();
        assert_eq!(request.begin, 0);

        // The second stalled block is re-issuable as well
        let request = manager.next_request(&slow_peer).unwrap();
        assert_eq!(request.begin, 16384);

        // Every re-issue was re-stamped, nothing is left to duplicate
        assert!(manager.next_request(&fast_peer).is_none());
    }

    #[test]
    fn update_peer_unlocks_new_pieces() {
        let dir = tempfile::tempdir().unwrap();
        let data = payload(16384);
        let manager =
            PieceManager::new(&[sha1(&data)], 16384, 16384, &output_path(&dir)).unwrap();
        let peer = vec![1; 20];
        manager.add_peer(&peer, vec![0x00]).unwrap();

        assert!(manager.next_request(&peer).is_none());
        manager.update_peer(&peer, 0);
        assert_eq!(manager.next_request(&peer).unwrap().piece_index, 0);
    }

    #[test]
    fn removed_peers_are_never_served() {
        let dir = tempfile::tempdir().unwrap();
        let data = payload(16384);
        let manager =
            PieceManager::new(&[sha1(&data)], 16384, 16384, &output_path(&dir)).unwrap();
        let peer = vec![1; 20];
        manager.add_peer(&peer, vec![0x80]).unwrap();
        manager.remove_peer(&peer);

        assert!(manager.next_request(&peer).is_none());
    }

    #[test]
    fn last_piece_and_block_may_be_short() {
        let dir = tempfile::tempdir().unwrap();
        let path = output_path(&dir);
        // 2 pieces: 32768 then 8192, the last a single short block
        let data = payload(40960);
        let hashes = vec![sha1(&data[..32768]), sha1(&data[32768..])];
        let manager = PieceManager::new(&hashes, 32768, 40960, &path).unwrap();
        let peer = vec![1; 20];
        manager.add_peer(&peer, vec![0xc0]).unwrap();

        manager
            .block_received(&peer, 0, 0, data[..16384].to_vec())
            .unwrap();
        manager
            .block_received(&peer, 0, 16384, data[16384..32768].to_vec())
            .unwrap();
        manager
            .block_received(&peer, 1, 0, data[32768..].to_vec())
            .unwrap();

        assert!(manager.is_complete());
        assert_eq!(manager.bytes_downloaded(), 40960);
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[test]
    fn duplicate_blocks_for_completed_piece_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = output_path(&dir);
        let data = payload(16384);
        let manager = PieceManager::new(&[sha1(&data)], 16384, 16384, &path).unwrap();
        let peer = vec![1; 20];
        manager.add_peer(&peer, vec![0x80]).unwrap();

        manager.block_received(&peer, 0, 0, data.clone()).unwrap();
        assert!(manager.is_complete());

        // A racing peer delivering the same block must not disturb the result
        manager
            .block_received(&peer, 0, 0, vec![0xff; 16384])
            .unwrap();
        assert!(manager.is_complete());
        assert_eq!(manager.bytes_downloaded(), 16384);
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[test]
    fn new_rejects_mismatched_hash_count() {
        let dir = tempfile::tempdir().unwrap();
        let hashes = vec![vec![0; 20]; 3];
        assert!(PieceManager::new(&hashes, 16384, 32768, &output_path(&dir)).is_err());
    }
}

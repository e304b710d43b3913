//! # Torrent Metainfo
//!
//! This module parses the bencoded metainfo file and derives the torrent
//! identity from it.
//!
//! The fields consumed from the metainfo are:
//!
//! - **announce**: Tracker URL for peer discovery
//! - **info.name**: Suggested filename
//! - **info.length**: Total file size (single-file torrents)
//! - **info.piece length**: Size of each piece
//! - **info.pieces**: Concatenated 20-byte SHA-1 piece hashes
//!
//! The info hash, the stable identifier of the torrent, is the SHA-1 of
//! the bencoded `info` sub-dictionary, verbatim. A random 20-byte client
//! id in the Azureus style (`-MM0100-` followed by random alphanumerics)
//! is generated alongside it.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use boring::sha::Sha1;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_bencode::{de, ser};
use serde_bytes::ByteBuf;

// Size of SHA-1 hash in bytes
const SHA1_HASH_SIZE: usize = 20;

// Azureus-style client id prefix
const CLIENT_PREFIX: &[u8] = b"-MM0100-";

/// Parsed metainfo plus the identity of this client in the swarm.
#[derive(Default, Clone)]
pub struct Torrent {
    /// URL of the tracker
    announce: String,
    /// 20-byte SHA-1 hash of the bencoded info dictionary
    info_hash: Vec<u8>,
    /// Vector of 20-byte SHA-1 hashes, one for each piece
    pieces_hashes: Vec<Vec<u8>>,
    /// Size of each piece in bytes (except possibly the last)
    piece_length: u32,
    /// Total size of the file in bytes
    length: u64,
    /// Suggested filename from torrent metadata
    name: String,
    /// 20-byte unique identifier for this client instance
    peer_id: Vec<u8>,
}

/// BencodeInfo structure.
#[derive(Deserialize, Serialize)]
struct BencodeInfo {
    // Concatenation of all pieces 20-byte SHA-1 hashes
    #[serde(rename = "pieces")]
    pieces: ByteBuf,
    // Size of each piece in bytes
    #[serde(rename = "piece length")]
    piece_length: u32,
    // Size of the file in bytes
    #[serde(rename = "length")]
    length: u64,
    // Suggested filename where to save the file
    #[serde(rename = "name")]
    name: String,
}

/// BencodeTorrent structure.
#[derive(Deserialize, Serialize)]
struct BencodeTorrent {
    // URL of the tracker
    #[serde(default)]
    announce: String,
    // Informations about file
    info: BencodeInfo,
}

impl BencodeInfo {
    /// Hash bencoded informations to uniquely identify a file.
    fn hash(&self) -> Result<Vec<u8>> {
        // Serialize bencoded informations
        let buf: Vec<u8> = ser::to_bytes::<BencodeInfo>(self)?;

        // Hash bencoded informations
        let mut hasher = Sha1::new();
        hasher.update(&buf);

        // Read hash digest
        let hash = hasher.finish().to_vec();

        Ok(hash)
    }

    /// Split bencoded pieces into vectors of SHA-1 hashes.
    fn split_pieces_hashes(&self) -> Result<Vec<Vec<u8>>> {
        let pieces = self.pieces.to_owned();
        let nb_pieces = pieces.len();

        // Check torrent pieces
        if nb_pieces == 0 || !nb_pieces.is_multiple_of(SHA1_HASH_SIZE) {
            return Err(anyhow!("torrent is invalid"));
        }
        let nb_hashes = nb_pieces / SHA1_HASH_SIZE;
        let mut hashes: Vec<Vec<u8>> = vec![vec![0; 20]; nb_hashes];

        // Split pieces
        for i in 0..nb_hashes {
            hashes[i] = pieces[i * SHA1_HASH_SIZE..(i + 1) * SHA1_HASH_SIZE].to_vec();
        }

        Ok(hashes)
    }
}

/// Generate a random Azureus-style 20-byte client id.
fn generate_peer_id() -> Vec<u8> {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

    let mut peer_id: Vec<u8> = CLIENT_PREFIX.to_vec();
    let mut rng = rand::thread_rng();
    while peer_id.len() < SHA1_HASH_SIZE {
        peer_id.push(CHARSET[rng.gen_range(0..CHARSET.len())]);
    }

    peer_id
}

impl Torrent {
    /// Open and parse a metainfo file.
    ///
    /// # Arguments
    ///
    /// * `filepath` - Path to the torrent.
    ///
    pub fn open(filepath: PathBuf) -> Result<Torrent> {
        // Open torrent
        let mut file = match File::open(filepath) {
            Ok(file) => file,
            Err(_) => return Err(anyhow!("could not open torrent")),
        };

        // Read torrent content in a buffer
        let mut buf = vec![];
        if file.read_to_end(&mut buf).is_err() {
            return Err(anyhow!("could not read torrent"));
        }

        // Deserialize bencoded data from torrent
        let bencode = match de::from_bytes::<BencodeTorrent>(&buf) {
            Ok(bencode) => bencode,
            Err(_) => return Err(anyhow!("could not decode torrent")),
        };

        if bencode.announce.is_empty() {
            return Err(anyhow!("torrent has no announce URL"));
        }
        if bencode.info.piece_length == 0 || bencode.info.length == 0 {
            return Err(anyhow!("torrent is invalid"));
        }

        // Add torrent informations
        let torrent = Torrent {
            announce: bencode.announce.to_owned(),
            info_hash: bencode.info.hash()?,
            pieces_hashes: bencode.info.split_pieces_hashes()?,
            piece_length: bencode.info.piece_length,
            length: bencode.info.length,
            name: bencode.info.name.to_owned(),
            peer_id: generate_peer_id(),
        };

        Ok(torrent)
    }

    /// Returns the tracker announce URL.
    pub fn announce(&self) -> &str {
        &self.announce
    }

    /// Returns the 20-byte SHA-1 hash of the bencoded info dictionary.
    pub fn info_hash(&self) -> &[u8] {
        &self.info_hash
    }

    /// Returns the expected SHA-1 hashes of all pieces.
    pub fn pieces_hashes(&self) -> &[Vec<u8>] {
        &self.pieces_hashes
    }

    /// Returns the size of each piece in bytes (except possibly the last).
    pub fn piece_length(&self) -> u32 {
        self.piece_length
    }

    /// Returns the total size of the file in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Returns the suggested filename from the torrent metadata.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the 20-byte identifier of this client instance.
    pub fn peer_id(&self) -> &[u8] {
        &self.peer_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    fn write_torrent_file(bencode: &BencodeTorrent) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let buf = ser::to_bytes(bencode).unwrap();
        file.write_all(&buf).unwrap();
        file.flush().unwrap();
        file
    }

    fn sample_torrent(pieces: Vec<u8>) -> BencodeTorrent {
        BencodeTorrent {
            announce: "http://tracker.example.com/announce".to_string(),
            info: BencodeInfo {
                pieces: ByteBuf::from(pieces),
                piece_length: 32768,
                length: 65536,
                name: "payload.bin".to_string(),
            },
        }
    }

    #[test]
    fn open_parses_metainfo_fields() {
        let file = write_torrent_file(&sample_torrent(vec![7; 40]));
        let torrent = Torrent::open(file.path().to_path_buf()).unwrap();

        assert_eq!(torrent.announce(), "http://tracker.example.com/announce");
        assert_eq!(torrent.name(), "payload.bin");
        assert_eq!(torrent.piece_length(), 32768);
        assert_eq!(torrent.length(), 65536);
        assert_eq!(torrent.pieces_hashes().len(), 2);
        assert_eq!(torrent.pieces_hashes()[0], vec![7; 20]);
    }

    #[test]
    fn info_hash_is_sha1_of_bencoded_info() {
        let bencode = sample_torrent(vec![7; 40]);
        let expected = {
            let buf = ser::to_bytes(&bencode.info).unwrap();
            let mut hasher = Sha1::new();
            hasher.update(&buf);
            hasher.finish().to_vec()
        };

        let file = write_torrent_file(&bencode);
        let torrent = Torrent::open(file.path().to_path_buf()).unwrap();

        assert_eq!(torrent.info_hash(), expected.as_slice());
        assert_eq!(torrent.info_hash().len(), 20);
    }

    #[test]
    fn open_rejects_inconsistent_pieces_length() {
        let file = write_torrent_file(&sample_torrent(vec![7; 30]));
        assert!(Torrent::open(file.path().to_path_buf()).is_err());
    }

    #[test]
    fn open_rejects_missing_file() {
        assert!(Torrent::open(PathBuf::from("/nonexistent/file.torrent")).is_err());
    }

    #[test]
    fn peer_id_is_20_bytes_with_client_prefix() {
        let peer_id = generate_peer_id();
        assert_eq!(peer_id.len(), 20);
        assert!(peer_id.starts_with(CLIENT_PREFIX));
    }
}

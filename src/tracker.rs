//! # Tracker Client
//!
//! The tracker is the HTTP service that maintains the swarm's known peer
//! set. An announce is a GET request on the metainfo's announce URL with
//! the torrent identity and our download state as query parameters; the
//! response is a bencoded dictionary carrying the refresh `interval` and
//! the peer set, either as a compact byte string (6 bytes per peer) or as
//! a list of dictionaries with `ip` and `port` keys.
//!
//! Announce failures are not fatal here: the caller logs them and retries
//! on the next scheduled announce.

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_bencode::de;
use url::Url;

use crate::peer::{build_peers, Peer};

// Timeout applied to the whole announce request
const TRACKER_TIMEOUT: Duration = Duration::from_secs(15);

// Refresh delay used when the tracker does not provide one
const DEFAULT_INTERVAL: u64 = 1800;

/// A successfully decoded announce response.
#[derive(Debug, PartialEq, Eq)]
pub struct TrackerResponse {
    /// Seconds until the next scheduled announce
    pub interval: u64,
    /// Peer endpoints known to the tracker
    pub peers: Vec<Peer>,
}

/// BencodeTrackerResponse structure.
#[derive(Debug, Deserialize)]
struct BencodeTrackerResponse {
    // Reason the tracker refused the announce, if any
    #[serde(rename = "failure reason", default)]
    failure_reason: Option<String>,
    // Interval time to refresh the list of peers in seconds
    #[serde(default)]
    interval: Option<u64>,
    // Peers, compact byte string or list of dictionaries
    #[serde(default)]
    peers: Option<BencodePeers>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BencodePeers {
    Compact(#[serde(with = "serde_bytes")] Vec<u8>),
    Dicts(Vec<BencodePeerDict>),
}

#[derive(Debug, Deserialize)]
struct BencodePeerDict {
    ip: String,
    port: u16,
}

/// Announce to the tracker and collect the peers it returns.
///
/// # Arguments
///
/// * `announce` - The tracker URL.
/// * `info_hash` - The 20-byte SHA-1 hash of the info dictionary.
/// * `peer_id` - 20-byte unique ID for the client.
/// * `port` - Port number that the client is listening on.
/// * `length` - Total file size in bytes.
/// * `downloaded` - Verified bytes downloaded so far.
///
pub fn announce(
    announce: &str,
    info_hash: &[u8],
    peer_id: &[u8],
    port: u16,
    length: u64,
    downloaded: u64,
) -> Result<TrackerResponse> {
    // Build tracker URL
    let full_url = build_announce_url(announce, info_hash, peer_id, port, length, downloaded)?;

    // Build blocking HTTP client
    let client = reqwest::blocking::Client::builder()
        .timeout(TRACKER_TIMEOUT)
        .build()?;

    // Send GET request to the tracker
    let response = client.get(&full_url).send()?;
    if !response.status().is_success() {
        return Err(anyhow!(
            "tracker returned status {} for announce",
            response.status()
        ));
    }
    let body = response.bytes()?;

    decode_response(&body)
}

/// Build the announce URL with its query parameters.
fn build_announce_url(
    announce: &str,
    info_hash: &[u8],
    peer_id: &[u8],
    port: u16,
    length: u64,
    downloaded: u64,
) -> Result<String> {
    // Parse tracker URL from torrent
    let base_url = match Url::parse(announce) {
        Ok(url) => url,
        Err(_) => return Err(anyhow!("could not parse tracker url")),
    };

    // Build query string manually to handle binary data properly
    let query = format!(
        "info_hash={}&peer_id={}&port={}&uploaded=0&downloaded={}&left={}&compact=1",
        percent_encode_binary(info_hash),
        percent_encode_binary(peer_id),
        port,
        downloaded,
        length - downloaded,
    );

    let mut url = base_url.to_string();
    if url.contains('?') {
        url.push('&');
    } else {
        url.push('?');
    }
    url.push_str(&query);

    Ok(url)
}

/// Percent-encode arbitrary bytes for use in a query string.
///
/// Unreserved URL characters pass through untouched, every other byte
/// becomes %XX. Needed because the info hash and peer id are raw bytes,
/// not UTF-8 text.
fn percent_encode_binary(data: &[u8]) -> String {
    data.iter()
        .map(|&byte| match byte {
            b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'.' | b'-' | b'_' | b'~' => {
                (byte as char).to_string()
            }
            _ => format!("%{:02X}", byte),
        })
        .collect()
}

/// Decode a bencoded announce response body.
fn decode_response(body: &[u8]) -> Result<TrackerResponse> {
    // Deserialize bencoded tracker response
    let bencode = match de::from_bytes::<BencodeTrackerResponse>(body) {
        Ok(bencode) => bencode,
        Err(_) => return Err(anyhow!("could not decode tracker response")),
    };

    // A failure reason voids the rest of the response
    if let Some(reason) = bencode.failure_reason {
        return Err(anyhow!("tracker refused announce: {}", reason));
    }

    // Decode peers in either representation
    let peers = match bencode.peers {
        Some(BencodePeers::Compact(bytes)) => build_peers(&bytes)?,
        Some(BencodePeers::Dicts(dicts)) => {
            let mut peers = vec![];
            for dict in dicts {
                match dict.ip.parse() {
                    Ok(ip) => peers.push(Peer::new(ip, dict.port)),
                    // Skip endpoints this client cannot dial (e.g. IPv6)
                    Err(_) => warn!("skipping non-IPv4 peer {}", dict.ip),
                }
            }
            peers
        }
        None => vec![],
    };

    Ok(TrackerResponse {
        interval: bencode.interval.unwrap_or(DEFAULT_INTERVAL),
        peers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::Ipv4Addr;

    #[test]
    fn decode_response_parses_compact_peers() {
        let mut body = b"d8:intervali900e5:peers12:".to_vec();
        body.extend_from_slice(&[
            0x0a, 0x00, 0x00, 0x01, 0x1a, 0xe1, 0x0a, 0x00, 0x00, 0x02, 0x1a, 0xe2,
        ]);
        body.push(b'e');

        let response = decode_response(&body).unwrap();

        assert_eq!(response.interval, 900);
        assert_eq!(
            response.peers,
            vec![
                Peer::new(Ipv4Addr::new(10, 0, 0, 1), 6881),
                Peer::new(Ipv4Addr::new(10, 0, 0, 2), 6882),
            ]
        );
    }

    #[test]
    fn decode_response_parses_peer_dictionaries() {
        let body = b"d8:intervali1800e5:peersld2:ip8:10.0.0.14:porti6881eed2:ip8:10.0.0.24:porti6882eeee";

        let response = decode_response(body).unwrap();

        assert_eq!(response.interval, 1800);
        assert_eq!(
            response.peers,
            vec![
                Peer::new(Ipv4Addr::new(10, 0, 0, 1), 6881),
                Peer::new(Ipv4Addr::new(10, 0, 0, 2), 6882),
            ]
        );
    }

    #[test]
    fn decode_response_rejects_invalid_compact_length() {
        let mut body = b"d8:intervali900e5:peers5:".to_vec();
        body.extend_from_slice(&[0x0a, 0x00, 0x00, 0x01, 0x1a]);
        body.push(b'e');

        assert!(decode_response(&body).is_err());
    }

    #[test]
    fn decode_response_surfaces_failure_reason() {
        let body = b"d14:failure reason15:unknown torrente";

        let error = decode_response(body).unwrap_err();
        assert!(error.to_string().contains("unknown torrent"));
    }

    #[test]
    fn decode_response_defaults_interval_and_peers() {
        let body = b"de";

        let response = decode_response(body).unwrap();
        assert_eq!(response.interval, DEFAULT_INTERVAL);
        assert!(response.peers.is_empty());
    }

    #[test]
    fn decode_response_rejects_garbage() {
        assert!(decode_response(b"not bencode at all").is_err());
    }

    #[test]
    fn announce_url_carries_all_parameters() {
        let url = build_announce_url(
            "http://tracker.example.com/announce",
            &[0xab; 20],
            b"-MM0100-abcdefghijkl",
            6881,
            65536,
            16384,
        )
        .unwrap();

        assert!(url.starts_with("http://tracker.example.com/announce?"));
        assert!(url.contains("info_hash=%AB%AB"));
        assert!(url.contains("port=6881"));
        assert!(url.contains("uploaded=0"));
        assert!(url.contains("downloaded=16384"));
        assert!(url.contains("left=49152"));
        assert!(url.contains("compact=1"));
    }

    #[test]
    fn announce_url_appends_to_existing_query() {
        let url = build_announce_url(
            "http://tracker.example.com/announce?key=abc",
            &[0; 20],
            &[0; 20],
            6881,
            1,
            0,
        )
        .unwrap();

        assert!(url.contains("key=abc&info_hash="));
    }

    #[test]
    fn announce_url_rejects_invalid_url() {
        assert!(build_announce_url("not a url", &[0; 20], &[0; 20], 6881, 1, 0).is_err());
    }
}

//! # Marmot BitTorrent Client
//!
//! A command-line BitTorrent download client written in Rust.
//!
//! ## Features
//!
//! - Core BitTorrent peer wire protocol implementation
//! - Multi-peer concurrent downloading over a fixed worker pool
//! - Rarest-first piece selection
//! - Piece verification with SHA-1 hashing
//! - Periodic tracker re-announces
//! - Progress tracking with visual progress bar
//!
//! ## Usage
//!
//! ```bash
//! marmot <torrent_file> <output_path>
//! marmot <torrent_file> <output_path> -l <log_path>
//! ```
//!
//! ## Architecture
//!
//! The client follows a multi-threaded architecture:
//!
//! - **Main thread**: Parses arguments, loads the torrent, supervises the download
//! - **Worker threads**: Each runs peer sessions pulled from the peer registry
//! - **Tracker thread**: Re-announces on the tracker's advertised interval
//! - **Piece manager**: Shared, mutex-guarded piece and block state

#[macro_use]
extern crate log;

mod handshake;
mod manager;
mod message;
mod peer;
mod piece;
mod registry;
mod session;
mod supervisor;
mod torrent;
mod tracker;

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::Parser;
use env_logger::Target;

use manager::PieceManager;
use supervisor::Supervisor;
use torrent::Torrent;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "A command-line BitTorrent download client, written in Rust."
)]
struct Args {
    /// Path to the .torrent file
    torrent: String,

    /// Path where the downloaded payload is written
    output: String,

    /// Write logs to this file instead of stderr
    #[arg(short = 'l', long)]
    log: Option<String>,
}

/// Initialize logging, to stderr or to the file given with `-l`.
fn init_logging(log_path: Option<&str>) -> Result<()> {
    match log_path {
        Some(path) => {
            let file = match File::create(path) {
                Ok(file) => file,
                Err(error) => {
                    return Err(anyhow!("could not create log file '{}': {}", path, error))
                }
            };
            pretty_env_logger::formatted_timed_builder()
                .filter_level(log::LevelFilter::Info)
                .parse_default_env()
                .target(Target::Pipe(Box::new(file)))
                .init();
        }
        None => pretty_env_logger::init_timed(),
    }

    Ok(())
}

fn run(args: Args) -> Result<()> {
    // Check if torrent file exists
    if !Path::new(&args.torrent).exists() {
        return Err(anyhow!("could not find torrent file: {}", args.torrent));
    }

    // Open torrent to get metadata
    let torrent = Torrent::open(PathBuf::from(&args.torrent))?;
    info!(
        "Loaded torrent {:?} ({} bytes, {} pieces)",
        torrent.name(),
        torrent.length(),
        torrent.pieces_hashes().len()
    );

    // Set up piece and block state, preallocating the output file
    let manager = PieceManager::new(
        torrent.pieces_hashes(),
        torrent.piece_length(),
        torrent.length(),
        Path::new(&args.output),
    )?;

    // Download torrent
    let output = args.output.clone();
    Supervisor::new(torrent, manager).download()?;

    println!("Saved in {:?}.", output);

    Ok(())
}

fn main() {
    // Parse arguments
    let args = Args::parse();

    // Initialize logger
    if let Err(error) = init_logging(args.log.as_deref()) {
        eprintln!("Error: {}", error);
        std::process::exit(1);
    }

    // Run program, eventually exit failure
    if let Err(error) = run(args) {
        eprintln!("Error: {}", error);
        std::process::exit(1);
    }

    // Exit success
    std::process::exit(0);
}

//! `seeder`: builds a metainfo for a folder of source files, writes it
//! alongside, and joins the swarm as a pure uploader with every piece
//! already verified.

use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use piecemeal::discovery;
use piecemeal::engine;
use piecemeal::seeder;

const TRACKER_HTTP_PORT: u16 = 5009;

#[derive(Parser, Debug)]
#[command(about = "Seed a folder of files to a swarm")]
struct Cli {
    /// Folder of source files to seed.
    #[arg(long)]
    folder: PathBuf,

    /// Piece size in bytes used to slice the source files.
    #[arg(long = "piece-length")]
    piece_length: u32,

    /// Port to listen for inbound peer connections on.
    #[arg(long)]
    port: u16,

    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let announce = format!("http://127.0.0.1:{TRACKER_HTTP_PORT}/");
    let metainfo = seeder::build_metainfo(&cli.folder, cli.piece_length, &announce)
        .context("building metainfo from source folder")?;

    let metainfo_path = PathBuf::from(format!("{}.torrent", metainfo.name()));
    std::fs::write(&metainfo_path, serde_bencode::to_bytes(&metainfo)?)
        .context("writing metainfo file")?;
    info!("wrote metainfo to {metainfo_path:?}");

    let store = Arc::new(
        seeder::slice_files(&metainfo, &cli.folder).context("slicing source files into pieces")?,
    );
    let self_id = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), cli.port);
    let engine = engine::Engine::new(self_id, metainfo.piece_count(), store, true);

    let listener = TcpListener::bind(("0.0.0.0", cli.port)).context("binding listening port")?;
    let tracker_addr =
        discovery::discover_tracker(metainfo.announce()).context("discovering tracker")?;
    let registration =
        engine::start(&engine, tracker_addr, listener).context("registering with tracker")?;

    info!("seeding {} pieces of {:?}", metainfo.piece_count(), metainfo.name());

    // A seeder never completes on its own; it serves until the process is
    // killed, at which point the OS tears down its sockets and the tracker
    // observes the disconnect.
    let _registration = registration;
    let _engine = engine;
    loop {
        std::thread::sleep(std::time::Duration::from_secs(3600));
    }
}

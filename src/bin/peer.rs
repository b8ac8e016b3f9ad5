//! `peer`: the leecher binary. Joins a swarm with nothing and downloads
//! until it has every piece described by a metainfo file.

use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rand::Rng;

use piecemeal::discovery;
use piecemeal::engine::{self, Engine};
use piecemeal::metainfo::Metainfo;
use piecemeal::picker::{self, Mode};
use piecemeal::store::{self, LocalStore};

#[derive(Parser, Debug)]
#[command(about = "Download a torrent's content from its swarm")]
struct Cli {
    /// Path to the metainfo file describing what to download.
    #[arg(long)]
    file: PathBuf,

    /// Folder to reassemble the completed download into.
    #[arg(long)]
    out: PathBuf,

    /// Port to listen for inbound peer connections on. Random 6000-9000 if omitted.
    #[arg(long)]
    port: Option<u16>,

    /// 0 = sequential acquisition loop, 1 = parallel worker pool.
    #[arg(long, default_value_t = 0)]
    mode: u8,

    /// Shuffle the missing-piece order on each acquisition pass.
    #[arg(long)]
    random: bool,

    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let metainfo = Metainfo::from_file(&cli.file).context("reading metainfo file")?;
    let port = cli
        .port
        .unwrap_or_else(|| rand::thread_rng().gen_range(6000..9000));
    let self_id = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port);

    let store = Arc::new(LocalStore::empty(&metainfo));
    let engine = Engine::new(self_id, metainfo.piece_count(), store.clone(), false);

    let listener = TcpListener::bind(("0.0.0.0", port)).context("binding listening port")?;
    let tracker_addr =
        discovery::discover_tracker(metainfo.announce()).context("discovering tracker")?;
    let registration =
        engine::start(&engine, tracker_addr, listener).context("registering with tracker")?;

    info!(
        "downloading {} pieces of {:?} into {:?}",
        metainfo.piece_count(),
        metainfo.name(),
        cli.out
    );
    let mode = if cli.mode == 1 {
        Mode::Parallel
    } else {
        Mode::Sequential
    };
    picker::run(&engine, mode, cli.random);

    store::reassemble(&store, &metainfo, &cli.out).context("reassembling output files")?;
    info!("download complete, wrote {:?}", cli.out.join(metainfo.name()));

    engine.shutdown();
    registration.quit().context("leaving tracker")?;
    Ok(())
}

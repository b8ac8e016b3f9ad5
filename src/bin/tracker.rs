//! `tracker`: the swarm membership coordinator. No CLI flags — fixed
//! membership port 5008 and `tracker.txt` HTTP port 5009.

use std::net::{IpAddr, Ipv4Addr};
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use piecemeal::tracker::server;

const MEMBERSHIP_PORT: u16 = 5008;
const HTTP_PORT: u16 = 5009;

#[derive(Parser, Debug)]
#[command(about = "Coordinate swarm membership")]
struct Cli {}

fn main() -> Result<()> {
    let _cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let http_port = HTTP_PORT;
    let tracker_ip: IpAddr = Ipv4Addr::LOCALHOST.into();
    let http_handle = thread::spawn(move || {
        if let Err(e) = server::run_tracker_txt(http_port, tracker_ip, MEMBERSHIP_PORT) {
            log::error!("tracker.txt server failed: {e}");
        }
    });

    info!("tracker membership port {MEMBERSHIP_PORT}, tracker.txt port {HTTP_PORT}");
    server::run(MEMBERSHIP_PORT).context("running tracker membership listener")?;

    let _ = http_handle.join();
    Ok(())
}

//! Tracker address discovery: turns an announce URL into the tracker's live
//! membership socket address by fetching `tracker.txt` over raw HTTP.
//!
//! The teacher's own tracker client built HTTP requests by hand over a raw
//! stream rather than pulling in a client crate; this keeps that shape for
//! the one GET this implementation needs, now that the full BEP-3 announce
//! machinery (and the `url`/`urlencoding` crates it used) is gone.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;

use crate::error::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Splits `announce` (e.g. `"http://tracker.example:5009/"`) into a host and
/// port suitable for `TcpStream::connect`.
fn host_and_port(announce: &str) -> Result<(String, u16)> {
    let without_scheme = announce
        .strip_prefix("http://")
        .ok_or_else(|| Error::Tracker(format!("unsupported announce scheme: {announce}")))?;
    let authority = without_scheme.split('/').next().unwrap_or(without_scheme);

    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|e| Error::Tracker(format!("bad port in announce {announce:?}: {e}")))?;
            Ok((host.to_string(), port))
        }
        None => Err(Error::Tracker(format!(
            "announce {announce:?} has no explicit port"
        ))),
    }
}

/// Fetches `GET /tracker.txt` from the host named in `announce` and parses
/// the `"<ip> <port>"` response line into the tracker's membership address.
pub fn discover_tracker(announce: &str) -> Result<SocketAddr> {
    let (host, http_port) = host_and_port(announce)?;
    let candidates = (host.as_str(), http_port)
        .to_socket_addrs()
        .map_err(|e| Error::Tracker(format!("could not resolve {host}: {e}")))?
        .collect::<Vec<_>>();
    let connect_addr = candidates
        .first()
        .copied()
        .ok_or_else(|| Error::Tracker(format!("no addresses for {host}")))?;

    let mut stream = TcpStream::connect_timeout(&connect_addr, CONNECT_TIMEOUT)?;
    let request = format!(
        "GET /tracker.txt HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes())?;

    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    debug!("tracker.txt response: {response:?}");

    let line = response
        .split("\r\n\r\n")
        .nth(1)
        .ok_or_else(|| Error::Tracker("tracker.txt response had no body".into()))?
        .trim();

    line.parse::<SocketAddr>().or_else(|_| {
        let (ip, port) = line
            .rsplit_once(' ')
            .ok_or_else(|| Error::Tracker(format!("malformed tracker.txt body: {line:?}")))?;
        format!("{ip}:{port}")
            .parse()
            .map_err(|e| Error::Tracker(format!("malformed tracker.txt body {line:?}: {e}")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port_from_announce() {
        assert_eq!(
            host_and_port("http://example.com:5009/announce").unwrap(),
            ("example.com".to_string(), 5009)
        );
    }

    #[test]
    fn rejects_scheme_other_than_http() {
        assert!(host_and_port("https://example.com:5009/").is_err());
    }

    #[test]
    fn rejects_missing_port() {
        assert!(host_and_port("http://example.com/").is_err());
    }
}

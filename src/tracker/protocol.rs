//! Codec for the tracker membership blob.
//!
//! Replaces the Python source's `pickle.dumps(self.active_peers)` with a
//! deterministic, cross-language-safe scheme: a length-prefixed list of
//! length-prefixed `"ip:port"` ASCII strings, itself wrapped in its own `u32`
//! length prefix so a membership update is never assumed to arrive in a
//! single `recv()`.

use std::io::{Read, Write};
use std::net::SocketAddr;

use crate::error::{Error, Result};

pub fn write_membership<W: Write>(w: &mut W, peers: &[SocketAddr]) -> Result<()> {
    let mut body = Vec::new();
    for peer in peers {
        let entry = peer.to_string();
        body.extend_from_slice(&(entry.len() as u32).to_be_bytes());
        body.extend_from_slice(entry.as_bytes());
    }

    w.write_all(&(body.len() as u32).to_be_bytes())?;
    w.write_all(&body)?;
    Ok(())
}

pub fn read_membership<R: Read>(r: &mut R) -> Result<Vec<SocketAddr>> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let body_len = u32::from_be_bytes(len_buf) as usize;

    let mut body = vec![0u8; body_len];
    r.read_exact(&mut body)?;
    decode_body(&body)
}

fn decode_body(body: &[u8]) -> Result<Vec<SocketAddr>> {
    let mut peers = Vec::new();
    let mut cursor = 0usize;
    while cursor < body.len() {
        if cursor + 4 > body.len() {
            return Err(Error::Framing("truncated membership entry length".into()));
        }
        let entry_len =
            u32::from_be_bytes(body[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;

        if cursor + entry_len > body.len() {
            return Err(Error::Framing("truncated membership entry".into()));
        }
        let entry = std::str::from_utf8(&body[cursor..cursor + entry_len])
            .map_err(|e| Error::Framing(format!("non-utf8 membership entry: {e}")))?;
        let addr: SocketAddr = entry
            .parse()
            .map_err(|e| Error::Framing(format!("bad membership entry {entry:?}: {e}")))?;
        peers.push(addr);
        cursor += entry_len;
    }
    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_empty_and_populated_lists() {
        for peers in [
            vec![],
            vec!["127.0.0.1:6000".parse().unwrap()],
            vec![
                "127.0.0.1:6000".parse().unwrap(),
                "10.0.0.5:7000".parse().unwrap(),
            ],
        ] {
            let mut buf = Vec::new();
            write_membership(&mut buf, &peers).unwrap();
            let decoded = read_membership(&mut Cursor::new(buf)).unwrap();
            assert_eq!(decoded, peers);
        }
    }

    #[test]
    fn rejects_truncated_blob() {
        let mut buf = Vec::new();
        write_membership(&mut buf, &["127.0.0.1:1".parse().unwrap()]).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(read_membership(&mut Cursor::new(buf)).is_err());
    }
}

//! Wire framing for the peer-to-peer protocol.
//!
//! Every message is `length: u32 (BE) | id: u8 | payload: length-1 bytes`,
//! where `length` counts the id byte plus the payload. There is no keepalive
//! and no handshake beyond the initial BITFIELD exchange (id 4, answered with
//! the non-looping id 5). A malformed frame — truncated header, truncated
//! payload, or an unrecognized id — is a framing error; the caller closes
//! that one connection and the rest of the swarm is unaffected.

use std::io::{Read, Write};

use crate::error::{Error, Result};

pub const BITFIELD: u8 = 4;
pub const BITFIELD_NO_LOOP: u8 = 5;
pub const REQUEST: u8 = 6;
pub const PIECE: u8 = 7;
pub const HAVE: u8 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// First bitfield of a pair; expects a `BitfieldNoLoop` reply.
    Bitfield(Vec<u8>),
    /// Reply-only bitfield; never triggers another reply.
    BitfieldNoLoop(Vec<u8>),
    Request(u32),
    Piece(u32, Vec<u8>),
    Have(u32),
}

impl Message {
    pub fn id(&self) -> u8 {
        match self {
            Message::Bitfield(_) => BITFIELD,
            Message::BitfieldNoLoop(_) => BITFIELD_NO_LOOP,
            Message::Request(_) => REQUEST,
            Message::Piece(_, _) => PIECE,
            Message::Have(_) => HAVE,
        }
    }

    /// Encodes the full frame (length prefix included).
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        match self {
            Message::Bitfield(bits) | Message::BitfieldNoLoop(bits) => {
                payload.extend_from_slice(bits);
            }
            Message::Request(index) => {
                payload.extend_from_slice(&index.to_be_bytes());
            }
            Message::Piece(index, block) => {
                payload.extend_from_slice(&index.to_be_bytes());
                payload.extend_from_slice(block);
            }
            Message::Have(index) => {
                payload.extend_from_slice(&index.to_be_bytes());
            }
        }

        let length = 1 + payload.len() as u32;
        let mut frame = Vec::with_capacity(4 + payload.len() + 1);
        frame.extend_from_slice(&length.to_be_bytes());
        frame.push(self.id());
        frame.extend_from_slice(&payload);
        frame
    }

    /// Decodes a message body given its id and payload (length prefix already
    /// consumed by the caller — see `read_message`).
    fn decode(id: u8, payload: &[u8]) -> Result<Message> {
        match id {
            BITFIELD => Ok(Message::Bitfield(payload.to_vec())),
            BITFIELD_NO_LOOP => Ok(Message::BitfieldNoLoop(payload.to_vec())),
            REQUEST => {
                let index = read_u32(payload, "REQUEST")?;
                Ok(Message::Request(index))
            }
            PIECE => {
                if payload.len() < 4 {
                    return Err(Error::Framing("PIECE payload shorter than 4 bytes".into()));
                }
                let index = read_u32(&payload[..4], "PIECE")?;
                Ok(Message::Piece(index, payload[4..].to_vec()))
            }
            HAVE => {
                let index = read_u32(payload, "HAVE")?;
                Ok(Message::Have(index))
            }
            other => Err(Error::Framing(format!("unknown message id {other}"))),
        }
    }
}

fn read_u32(bytes: &[u8], what: &str) -> Result<u32> {
    let arr: [u8; 4] = bytes
        .try_into()
        .map_err(|_| Error::Framing(format!("{what} payload must be exactly 4 bytes")))?;
    Ok(u32::from_be_bytes(arr))
}

/// Writes one framed message to `w`.
pub fn write_message<W: Write>(w: &mut W, message: &Message) -> Result<()> {
    w.write_all(&message.encode())?;
    Ok(())
}

/// Blocks until one framed message has been read from `r`, or returns a
/// framing/IO error. A `length` of zero is treated as malformed (there is no
/// keepalive message in this protocol).
pub fn read_message<R: Read>(r: &mut R) -> Result<Message> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let length = u32::from_be_bytes(len_buf);
    if length == 0 {
        return Err(Error::Framing("zero-length frame".into()));
    }

    let mut body = vec![0u8; length as usize];
    r.read_exact(&mut body)?;
    let id = body[0];
    Message::decode(id, &body[1..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(message: Message) {
        let bytes = message.encode();
        let decoded = read_message(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn round_trips_every_variant() {
        round_trip(Message::Bitfield(vec![1, 0, 1]));
        round_trip(Message::BitfieldNoLoop(vec![0, 0, 1]));
        round_trip(Message::Request(42));
        round_trip(Message::Piece(7, b"hello world".to_vec()));
        round_trip(Message::Have(3));
    }

    #[test]
    fn bitfield_ids_differ() {
        assert_eq!(Message::Bitfield(vec![]).id(), BITFIELD);
        assert_eq!(Message::BitfieldNoLoop(vec![]).id(), BITFIELD_NO_LOOP);
    }

    #[test]
    fn zero_length_frame_is_framing_error() {
        let bytes = [0u8, 0, 0, 0];
        let err = read_message(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::Framing(_)));
    }

    #[test]
    fn unknown_id_is_framing_error() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&1u32.to_be_bytes());
        frame.push(99);
        let err = read_message(&mut Cursor::new(frame)).unwrap_err();
        assert!(matches!(err, Error::Framing(_)));
    }

    #[test]
    fn truncated_payload_is_io_error() {
        // Claims a length of 5 but only delivers 2 bytes of body.
        let mut frame = Vec::new();
        frame.extend_from_slice(&5u32.to_be_bytes());
        frame.push(HAVE);
        frame.extend_from_slice(&[0, 0]);
        let err = read_message(&mut Cursor::new(frame)).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn request_payload_must_be_four_bytes() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&3u32.to_be_bytes());
        frame.push(REQUEST);
        frame.extend_from_slice(&[0, 0]);
        let err = read_message(&mut Cursor::new(frame)).unwrap_err();
        assert!(matches!(err, Error::Framing(_)));
    }
}

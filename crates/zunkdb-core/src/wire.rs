//! ZunkDB wire format — `\r\n`-terminated ASCII lines of the form
//! `<verb> <rest>`.
//!
//! Four verbs are recognised; everything else (unknown verbs, and known
//! verbs with an unparsable payload) is silently ignored so one bad line
//! from a peer never kills the connection.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use base64::Engine as _;
use bytes::{Buf, Bytes, BytesMut};

use crate::digest::Digest;

const FIND_CHUNK: &str = "find_chunk";
const STORE_CHUNK: &str = "store_chunk";
const REQUEST_DONE: &str = "request_done";
const STORE_NODE: &str = "store_node";

/// A parsed inbound or outbound protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `find_chunk <hex-digest>` — outbound, ask a peer for a chunk.
    FindChunk(Digest),
    /// `store_chunk <base64>` — outbound (publish) or inbound (candidate body).
    StoreChunk(Vec<u8>),
    /// `request_done <hex-digest>` — inbound, peer exhausted its knowledge.
    RequestDone(Digest),
    /// `store_node <ip>:<port>` — inbound referral to another peer.
    StoreNode(SocketAddrV4),
}

/// Format an outbound `find_chunk` line.
pub fn encode_find_chunk(digest: &Digest) -> Bytes {
    Bytes::from(format!("{FIND_CHUNK} {digest}\r\n"))
}

/// Format an outbound `store_chunk` line, base64-encoding the body.
pub fn encode_store_chunk(body: &[u8]) -> Bytes {
    let b64 = base64::engine::general_purpose::STANDARD.encode(body);
    Bytes::from(format!("{STORE_CHUNK} {b64}\r\n"))
}

/// Streaming line decoder: buffers partial reads and yields one [`Frame`]
/// per call to [`LineDecoder::next_frame`], draining and discarding any
/// unrecognised lines along the way.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: BytesMut,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly-read bytes to the internal buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete, recognised frame out of the buffer, if any.
    /// Unrecognised lines are consumed and skipped transparently.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let pos = self
                .buf
                .windows(2)
                .position(|w| w == b"\r\n")?;
            let line = self.buf.split_to(pos);
            self.buf.advance(2); // drop the \r\n itself
            if let Some(frame) = parse_line(&line) {
                return Some(frame);
            }
            // Unknown verb or malformed payload for a known verb: keep looking.
        }
    }
}

fn parse_line(line: &[u8]) -> Option<Frame> {
    let line = std::str::from_utf8(line).ok()?;
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));

    match verb {
        FIND_CHUNK => Digest::from_str(rest).ok().map(Frame::FindChunk),
        STORE_CHUNK => base64::engine::general_purpose::STANDARD
            .decode(rest)
            .ok()
            .map(Frame::StoreChunk),
        REQUEST_DONE => Digest::from_str(rest).ok().map(Frame::RequestDone),
        STORE_NODE => parse_store_node(rest).map(Frame::StoreNode),
        _ => {
            tracing::debug!(verb, "unknown wire verb, ignoring");
            None
        }
    }
}

fn parse_store_node(rest: &str) -> Option<SocketAddrV4> {
    let (ip, port) = rest.rsplit_once(':')?;
    let ip: Ipv4Addr = ip.parse().ok()?;
    let port: u16 = port.parse().ok()?;
    Some(SocketAddrV4::new(ip, port))
}

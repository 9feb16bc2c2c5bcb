//! A single peer connection: non-blocking connect modeled as a spawned
//! connect task polled to completion, a persistent read buffer feeding
//! the streaming line decoder, and outbound payload queued until the
//! socket actually goes live.

use std::net::{SocketAddr, SocketAddrV4};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use zunkdb_core::wire::{Frame, LineDecoder};

pub type NodeId = u64;

enum NodeIo {
    Connecting(JoinHandle<std::io::Result<TcpStream>>),
    Live(TcpStream),
}

/// Outcome of one call to [`Node::next_event`].
pub enum NodeEvent {
    /// The queued payload was written out — either a brand-new node just
    /// went live, or a cached node was just re-dispatched.
    BecameLive,
    /// A recognised frame was decoded from this node's stream.
    Frame(Frame),
    /// Read or write error, or EOF, on a live stream: destroy the node.
    Closed,
    /// The connect attempt failed: the node should be dead-listed.
    ConnectFailed,
}

/// One peer connection. Created on demand when the node cache has
/// nothing for the target address; destroyed on I/O error, dead-listed
/// on a connect that never finished, or returned idle to the cache.
pub struct Node {
    pub id: NodeId,
    pub addr: SocketAddrV4,
    io: NodeIo,
    outbound: Option<Bytes>,
    decoder: LineDecoder,
}

impl Node {
    /// Open a brand-new connection, queuing `payload` to be written as
    /// soon as the socket transitions to live.
    pub fn connecting(id: NodeId, addr: SocketAddrV4, payload: Bytes) -> Self {
        let handle = tokio::spawn(async move { TcpStream::connect(SocketAddr::V4(addr)).await });
        Self {
            id,
            addr,
            io: NodeIo::Connecting(handle),
            outbound: Some(payload),
            decoder: LineDecoder::new(),
        }
    }

    /// Re-home an already-live idle node onto a new request.
    pub fn reuse(&mut self, payload: Bytes) {
        self.outbound = Some(payload);
    }

    /// True once the underlying socket finished connecting.
    pub fn is_live(&self) -> bool {
        matches!(self.io, NodeIo::Live(_))
    }

    /// Wait for exactly one event: a connect completion, a decoded
    /// frame, or the stream closing/erroring.
    pub async fn next_event(&mut self) -> NodeEvent {
        loop {
            match &mut self.io {
                NodeIo::Connecting(handle) => match handle.await {
                    Ok(Ok(stream)) => {
                        self.io = NodeIo::Live(stream);
                    }
                    _ => return NodeEvent::ConnectFailed,
                },
                NodeIo::Live(stream) => {
                    if let Some(frame) = self.decoder.next_frame() {
                        return NodeEvent::Frame(frame);
                    }
                    if let Some(payload) = self.outbound.take() {
                        if stream.write_all(&payload).await.is_err() {
                            return NodeEvent::Closed;
                        }
                        return NodeEvent::BecameLive;
                    }
                    let mut buf = [0u8; 4096];
                    match stream.read(&mut buf).await {
                        Ok(0) => return NodeEvent::Closed,
                        Ok(n) => self.decoder.feed(&buf[..n]),
                        Err(_) => return NodeEvent::Closed,
                    }
                }
            }
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let NodeIo::Connecting(handle) = &self.io {
            handle.abort();
        }
    }
}

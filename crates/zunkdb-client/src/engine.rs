//! The request engine: a per-call, single-task state machine that
//! maintains the candidate address frontier, the in-flight node set,
//! fan-out accounting, the overall deadline, and the termination
//! predicate described in spec.md §4.4.

use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};

use zunkdb_core::wire::Frame;
use zunkdb_core::{BackendSpec, Digest, Verify, CHUNK_SIZE};

use crate::cache::NodeCache;
use crate::error::RequestError;
use crate::node::{Node, NodeEvent, NodeId};

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_request_id() -> u64 {
    REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// What this call is waiting for, standing in for the original's
/// nullable `chunk` pointer: `Write` is the "chunk_out is null" case,
/// `Read`'s `captured` flag is the "chunk_out has been nulled" case.
pub enum ChunkTarget<'a> {
    Write,
    Read { buf: &'a mut [u8], captured: bool },
}

/// Run one request (read or write) to completion: dispatch to the
/// candidate addresses, follow referrals, and terminate on a verified
/// result or the deadline.
pub async fn send_request(
    cache: &NodeCache,
    spec: &BackendSpec,
    digest: Digest,
    payload: Bytes,
    verify: &dyn Verify,
    mut target: ChunkTarget<'_>,
) -> Result<usize, RequestError> {
    let request_id = next_request_id();
    let max_concurrency = spec.max_concurrency.unwrap_or(usize::MAX);

    let sleep = tokio::time::sleep(spec.timeout);
    tokio::pin!(sleep);

    let mut addresses: Vec<SocketAddrV4> = vec![spec.start_node];
    let mut cursor = 0usize;
    let mut in_flight = 0usize;
    let mut attached: HashMap<NodeId, Node> = HashMap::new();
    let mut next_node_id: NodeId = 0;
    let mut done = 0u32;

    let outcome = loop {
        // 1. Dispatch: fan out to as many fresh candidates as the
        // concurrency budget allows.
        while cursor < addresses.len() && in_flight < max_concurrency {
            let addr = addresses[cursor];
            cursor += 1;
            in_flight += 1; // consumed regardless of dispatch outcome, see spec.md §7

            match cache.acquire(addr).await {
                crate::cache::Acquired::Dead => {
                    tracing::debug!(request_id, %addr, "dispatch target is dead-listed, skipping");
                }
                crate::cache::Acquired::Hit(mut node) => {
                    node.reuse(payload.clone());
                    let id = next_node_id;
                    next_node_id += 1;
                    tracing::debug!(request_id, %addr, node_id = id, "reusing cached node");
                    attached.insert(id, node);
                }
                crate::cache::Acquired::Miss => {
                    let id = next_node_id;
                    next_node_id += 1;
                    tracing::debug!(request_id, %addr, node_id = id, "connecting new node");
                    attached.insert(id, Node::connecting(id, addr, payload.clone()));
                }
            }
        }

        // 2. Termination checks, in order.
        if sleep.is_elapsed() {
            break Err(RequestError::Timeout);
        }
        // Mirrors chunk-db-zdb.c's unconditional `list_empty(&request.node_list)`
        // check: nothing attached means no event will ever arrive to drive
        // the loop forward, regardless of whether untried candidates remain
        // stuck behind a permanently exhausted concurrency budget (dead-list
        // hits and failed connects never refund their slot, see below).
        if attached.is_empty() {
            break Err(RequestError::Io);
        }

        // 3. Step the event loop once: wait for either the deadline or
        // the next event from any attached node.
        let event = {
            let mut pending: FuturesUnordered<_> = attached
                .iter_mut()
                .map(|(&id, node)| async move { (id, node.next_event().await) })
                .collect();
            tokio::select! {
                _ = &mut sleep => None,
                ev = pending.next() => ev,
            }
        };

        let Some((id, ev)) = event else {
            break Err(RequestError::Timeout);
        };

        // 4. React to the event.
        match ev {
            NodeEvent::BecameLive => {
                tracing::trace!(request_id, node_id = id, "node live, payload flushed");
            }
            NodeEvent::ConnectFailed => {
                if let Some(node) = attached.remove(&id) {
                    tracing::debug!(request_id, node_id = id, "connect failed, dead-listing");
                    cache.release(node).await;
                }
                // in_flight is intentionally not refunded: a dead connect
                // burns its slot for the rest of this request, same as a
                // dispatch that hits the dead set (spec.md §7).
            }
            NodeEvent::Closed => {
                if attached.remove(&id).is_some() {
                    in_flight = in_flight.saturating_sub(1);
                    tracing::debug!(request_id, node_id = id, "node closed, destroyed");
                }
            }
            NodeEvent::Frame(frame) => {
                handle_frame(
                    request_id,
                    id,
                    frame,
                    &digest,
                    &mut attached,
                    &mut addresses,
                    &mut in_flight,
                    &mut done,
                    cache,
                    &mut target,
                )
                .await;
            }
        }

        // 5. Post-step evaluation of the `done` counter.
        if let Some(result) = evaluate_done(&mut done, &mut target, verify, &digest) {
            break result;
        }
    };

    // Whatever ended the loop, every node still attached goes back
    // through the cache: live nodes idle, still-connecting nodes dead-list.
    for (_, node) in attached.drain() {
        cache.release(node).await;
    }

    outcome
}

/// The termination predicate from spec.md §4.4 step 4: once `done > 0`,
/// a write succeeds immediately, while a read only succeeds once a
/// captured body verifies against the digest — otherwise the captured
/// body is discarded and one `done` credit is consumed so the loop
/// keeps waiting on the remaining peers. Returns `Some(result)` to
/// terminate the caller's loop, `None` to keep going.
fn evaluate_done(
    done: &mut u32,
    target: &mut ChunkTarget<'_>,
    verify: &dyn Verify,
    digest: &Digest,
) -> Option<Result<usize, RequestError>> {
    if *done == 0 {
        return None;
    }
    match target {
        ChunkTarget::Write => Some(Ok(CHUNK_SIZE)),
        ChunkTarget::Read { buf, captured } => {
            if *captured && verify.verify(buf, digest) {
                return Some(Ok(CHUNK_SIZE));
            }
            *captured = false;
            *done -= 1;
            None
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_frame(
    request_id: u64,
    node_id: NodeId,
    frame: Frame,
    digest: &Digest,
    attached: &mut HashMap<NodeId, Node>,
    addresses: &mut Vec<SocketAddrV4>,
    in_flight: &mut usize,
    done: &mut u32,
    cache: &NodeCache,
    target: &mut ChunkTarget<'_>,
) {
    match frame {
        Frame::StoreChunk(body) => {
            if let ChunkTarget::Read { buf, captured } = target {
                if !*captured {
                    if body.len() == buf.len() {
                        buf.copy_from_slice(&body);
                        *captured = true;
                        tracing::trace!(request_id, node_id, "candidate chunk body captured");
                    } else {
                        tracing::debug!(
                            request_id,
                            node_id,
                            got = body.len(),
                            want = buf.len(),
                            "store_chunk body size mismatch, ignoring"
                        );
                    }
                }
            }
            // Write path never consults an inbound store_chunk.
        }
        Frame::RequestDone(got) => {
            if got == *digest {
                *done += 1;
                if let Some(node) = attached.remove(&node_id) {
                    *in_flight = in_flight.saturating_sub(1);
                    tracing::debug!(request_id, node_id, "request_done, releasing node");
                    cache.release(node).await;
                }
            } else {
                tracing::debug!(
                    request_id,
                    node_id,
                    "request_done for a foreign digest, node stays attached"
                );
            }
        }
        Frame::StoreNode(addr) => {
            if !addresses.contains(&addr) {
                tracing::debug!(request_id, %addr, "referral discovered");
                addresses.push(addr);
            }
        }
        Frame::FindChunk(_) => {
            // Peers never send this to us; discard like any other
            // frame we don't expect.
        }
    }
}

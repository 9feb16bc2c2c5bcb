//! Error taxonomy for the request engine and the back-end façade.
//!
//! Per-peer errors (connect refused, reset, malformed frames) never reach
//! these types: they're locally absorbed by destroying or dead-listing
//! the offending node while the request carries on with the peers it has
//! left (spec.md §7).

use zunkdb_core::SpecError;

/// Errors a single `send_request` call can return.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Buffer, channel, or node allocation failed.
    #[error("allocation failed: {0}")]
    NoMemory(String),

    /// The candidate set was exhausted with no verified answer and the
    /// deadline had not yet fired. Signals total peer failure.
    #[error("no peer produced a verified answer")]
    Io,

    /// The overall request deadline fired before a verified answer arrived.
    #[error("request timed out")]
    Timeout,
}

/// Errors surfaced by the back-end façade: either construction-time spec
/// rejection, or a call-time request failure.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("invalid back-end spec: {0}")]
    InvalidConfig(#[from] SpecError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("write_chunk called on a read-only back-end")]
    ReadOnly,
}

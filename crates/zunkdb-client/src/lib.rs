//! zunkdb-client — the ZunkDB chunk back-end: a node cache and request
//! engine speaking the ASCII line protocol described by the `zunkdb-core`
//! wire module, fronted by [`ZunkDbBackend`].

pub mod backend;
pub mod cache;
pub mod engine;
pub mod error;
pub mod node;

pub use backend::{ChunkBackend, Mode, ZunkDbBackend};
pub use error::{BackendError, RequestError};

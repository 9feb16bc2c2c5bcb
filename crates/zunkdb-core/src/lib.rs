//! zunkdb-core — shared types for the ZunkDB chunk back-end: the wire
//! format, chunk digests, and the `zunkdb:` spec-string grammar.
//! `zunkdb-client` depends on this crate.

pub mod digest;
pub mod spec;
pub mod wire;

pub use digest::{Blake3Verifier, Digest, DigestParseError, Verify, CHUNK_SIZE};
pub use spec::{BackendSpec, SpecError};
pub use wire::Frame;

//! The back-end façade: `read_chunk`/`write_chunk` over a `zunkdb:`
//! spec string, and the constructor the (out-of-scope) chunk-database
//! plug-in registry would hold against.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use zunkdb_core::wire::{encode_find_chunk, encode_store_chunk};
use zunkdb_core::{BackendSpec, Blake3Verifier, Digest, Verify, CHUNK_SIZE};

use crate::cache::NodeCache;
use crate::engine::{send_request, ChunkTarget};
use crate::error::BackendError;

/// Mirrors the original `CHUNKDB_RO`/`CHUNKDB_RW` constructor modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    ReadOnly,
    ReadWrite,
}

/// The interface the (out-of-scope) chunk-database plug-in registry
/// would hold a `Box<dyn ChunkBackend>` against — see spec.md §6,
/// "Back-end API consumed by the façade's collaborator (the registry)".
/// `ZunkDbBackend` is the only implementation this crate provides.
///
/// Methods return a boxed future rather than using `async fn` directly:
/// native async-fn-in-trait isn't object safe, and a `Box<dyn
/// ChunkBackend>` is exactly what this seam exists for.
pub trait ChunkBackend: Send + Sync {
    fn read_chunk<'a>(
        &'a self,
        out: &'a mut [u8; CHUNK_SIZE],
        digest: Digest,
    ) -> Pin<Box<dyn Future<Output = Result<usize, BackendError>> + Send + 'a>>;

    fn write_chunk<'a>(
        &'a self,
        chunk: &'a [u8; CHUNK_SIZE],
        digest: Digest,
    ) -> Pin<Box<dyn Future<Output = Result<usize, BackendError>> + Send + 'a>>;
}

/// An open ZunkDB chunk back-end: one node cache, one parsed spec, one
/// digest verifier, reused across every `read_chunk`/`write_chunk` call.
pub struct ZunkDbBackend {
    spec: BackendSpec,
    cache: NodeCache,
    verifier: Arc<dyn Verify>,
    mode: Mode,
}

impl ZunkDbBackend {
    /// Open a back-end from a `zunkdb:<host>:<port>[,timeout=S][,concurrency=N]`
    /// spec string, verifying chunk bodies with BLAKE3.
    pub fn open(spec: &str, mode: Mode) -> Result<Self, BackendError> {
        Self::open_with_verifier(spec, mode, Arc::new(Blake3Verifier))
    }

    /// Open a back-end with a caller-supplied digest verifier — this is
    /// the seam the real chunk filesystem would plug its own routine
    /// into (see spec.md §1, "out of scope: digest computation").
    pub fn open_with_verifier(
        spec: &str,
        mode: Mode,
        verifier: Arc<dyn Verify>,
    ) -> Result<Self, BackendError> {
        let spec = BackendSpec::parse(spec)?;
        Ok(Self {
            spec,
            cache: NodeCache::new(),
            verifier,
            mode,
        })
    }

    /// Retrieve the chunk addressed by `digest` into `out`, widening
    /// fan-out across referred peers until a verified body arrives or
    /// the configured timeout fires.
    pub async fn read_chunk(
        &self,
        out: &mut [u8; CHUNK_SIZE],
        digest: Digest,
    ) -> Result<usize, BackendError> {
        let payload = encode_find_chunk(&digest);
        let target = ChunkTarget::Read {
            buf: out,
            captured: false,
        };
        send_request(
            &self.cache,
            &self.spec,
            digest,
            payload,
            self.verifier.as_ref(),
            target,
        )
        .await
        .map_err(Into::into)
    }

    /// Publish `chunk` under `digest`. Succeeds on the first peer that
    /// echoes `request_done` — there is no proof the peer actually
    /// stored it (spec.md §9, "Unverified writes").
    pub async fn write_chunk(
        &self,
        chunk: &[u8; CHUNK_SIZE],
        digest: Digest,
    ) -> Result<usize, BackendError> {
        if self.mode != Mode::ReadWrite {
            return Err(BackendError::ReadOnly);
        }
        let payload = encode_store_chunk(chunk);
        send_request(
            &self.cache,
            &self.spec,
            digest,
            payload,
            self.verifier.as_ref(),
            ChunkTarget::Write,
        )
        .await
        .map_err(Into::into)
    }

    /// Number of idle pooled connections (for tests/diagnostics).
    pub async fn idle_node_count(&self) -> usize {
        self.cache.idle_count().await
    }
}

impl ChunkBackend for ZunkDbBackend {
    fn read_chunk<'a>(
        &'a self,
        out: &'a mut [u8; CHUNK_SIZE],
        digest: Digest,
    ) -> Pin<Box<dyn Future<Output = Result<usize, BackendError>> + Send + 'a>> {
        Box::pin(ZunkDbBackend::read_chunk(self, out, digest))
    }

    fn write_chunk<'a>(
        &'a self,
        chunk: &'a [u8; CHUNK_SIZE],
        digest: Digest,
    ) -> Pin<Box<dyn Future<Output = Result<usize, BackendError>> + Send + 'a>> {
        Box::pin(ZunkDbBackend::write_chunk(self, chunk, digest))
    }
}

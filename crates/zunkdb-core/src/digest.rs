//! Chunk digests and the verification seam.
//!
//! The digest routine itself is an external collaborator in the real
//! system (the chunk filesystem owns it); `Blake3Verifier` is a working
//! stand-in so the back-end can be exercised and tested on its own.

use std::fmt;
use std::str::FromStr;

/// Size of one chunk, in bytes.
pub const CHUNK_SIZE: usize = 4096;

/// A 32-byte content digest, rendered on the wire as 64 lowercase hex chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Error returned when a digest string isn't 64 lowercase hex nibbles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid digest string: {0:?}")]
pub struct DigestParseError(pub String);

impl FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Wire digests are specifically lowercase hex (spec.md §4.1); the
        // original's `strcmp` against a lowercase-only rendering is
        // case-sensitive, so an uppercase nibble must not parse here either.
        let is_lower_hex = |b: u8| b.is_ascii_digit() || (b'a'..=b'f').contains(&b);
        if s.len() != 64 || !s.bytes().all(is_lower_hex) {
            return Err(DigestParseError(s.to_string()));
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out).map_err(|_| DigestParseError(s.to_string()))?;
        Ok(Digest(out))
    }
}

/// Verifies that a candidate chunk body matches a digest.
///
/// Out of scope per the spec: the real implementation lives with the
/// chunk filesystem. `Blake3Verifier` below is the default used when no
/// other `Verify` is supplied.
pub trait Verify: Send + Sync {
    fn verify(&self, chunk: &[u8], digest: &Digest) -> bool;
}

/// Default verifier: BLAKE3 of the chunk bytes must equal the digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Verifier;

impl Verify for Blake3Verifier {
    fn verify(&self, chunk: &[u8], digest: &Digest) -> bool {
        blake3::hash(chunk).as_bytes() == &digest.0
    }
}

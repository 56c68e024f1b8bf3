//! SHA256 digest utilities
//!
//! Layer diff ids, image config digests and derived volume names are all
//! expressed as `sha256:<hex>` strings computed here.

use sha2::{Digest, Sha256};
use std::io::{self, Write};

use crate::error::{DockerError, Result};

/// Standard SHA256 digest for empty content
pub const EMPTY_DIGEST: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const PREFIX: &str = "sha256:";

/// Utilities for working with SHA256 digests
pub struct DigestUtils;

impl DigestUtils {
    /// Compute SHA256 hex digest from byte data
    pub fn compute_sha256(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    /// Compute full digest (with sha256: prefix) from byte data
    pub fn compute_docker_digest(data: &[u8]) -> String {
        format!("{}{}", PREFIX, Self::compute_sha256(data))
    }

    /// Validate SHA256 hex string (64 characters, all hex)
    pub fn is_valid_sha256_hex(digest: &str) -> bool {
        digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Validate full digest format (sha256:xxxxx)
    pub fn is_valid_docker_digest(digest: &str) -> bool {
        digest
            .strip_prefix(PREFIX)
            .is_some_and(Self::is_valid_sha256_hex)
    }

    /// Extract SHA256 hex part from a full digest
    pub fn extract_hex_part(digest: &str) -> Result<&str> {
        match digest.strip_prefix(PREFIX) {
            Some(hex_part) if Self::is_valid_sha256_hex(hex_part) => Ok(hex_part),
            Some(_) => Err(DockerError::invalid_argument(format!(
                "Invalid SHA256 hex part in digest: {}",
                digest
            ))),
            None => Err(DockerError::invalid_argument(format!(
                "Digest missing sha256: prefix: {}",
                digest
            ))),
        }
    }
}

/// Writer that hashes everything written through it
pub struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Number of bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Finish hashing, returning the inner writer and the `sha256:` digest
    pub fn finish(self) -> (W, String) {
        let digest = format!("{}{}", PREFIX, hex::encode(self.hasher.finalize()));
        (self.inner, digest)
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let count = self.inner.write(buf)?;
        self.hasher.update(&buf[..count]);
        self.written += count as u64;
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

use std::fmt;

use crate::digest::DigestUtils;
use crate::error::{DockerError, Result};

/// Name of a Docker volume
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeName(String);

impl VolumeName {
    pub fn of(value: &str) -> Result<Self> {
        if value.is_empty() {
            return Err(DockerError::invalid_argument("Volume name must not be empty"));
        }
        Ok(Self(value.to_string()))
    }

    /// A name made of `prefix` followed by random lowercase hex characters
    pub fn random(prefix: &str, length: usize) -> Result<Self> {
        let mut suffix = String::new();
        while suffix.len() < length {
            suffix.push_str(&uuid::Uuid::new_v4().simple().to_string());
        }
        suffix.truncate(length);
        Self::of(&format!("{}{}", prefix, suffix))
    }

    /// A stable name derived from `source`: `prefix + sha256(source)[..digest_length] + suffix`
    pub fn based_on(source: &str, prefix: &str, suffix: &str, digest_length: usize) -> Result<Self> {
        if digest_length == 0 || digest_length > 64 {
            return Err(DockerError::invalid_argument(format!(
                "Digest length must be between 1 and 64, got {}",
                digest_length
            )));
        }
        let digest = DigestUtils::compute_sha256(source.as_bytes());
        Self::of(&format!("{}{}{}", prefix, &digest[..digest_length], suffix))
    }
}

impl fmt::Display for VolumeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

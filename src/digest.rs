//! Content-derived service identities.
//!
//! A [`Digest`] is the canonical `"sha256:<hex>"` identity of a service
//! definition. Two definitions with the same content produce the same digest,
//! which is what lets the registry recognise "the same service" across callers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

/// The only algorithm produced by this crate.
pub const SHA256: &str = "sha256";

const SHA256_HEX_LEN: usize = 64;

/// A validated `algorithm:hex` content digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Compute the sha256 digest of raw bytes.
    pub fn from_bytes(data: impl AsRef<[u8]>) -> Self {
        let hash = Sha256::digest(data.as_ref());
        Self(format!("{}:{}", SHA256, hex::encode(hash)))
    }

    /// Compute the sha256 digest of a string.
    ///
    /// # Examples
    ///
    /// ```
    /// use pipeline_services::Digest;
    ///
    /// let a = Digest::from_string("postgres:16");
    /// let b = Digest::from_string("postgres:16");
    /// assert_eq!(a, b);
    /// assert!(a.as_str().starts_with("sha256:"));
    /// ```
    pub fn from_string(data: &str) -> Self {
        Self::from_bytes(data.as_bytes())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(alg, _)| alg).unwrap_or_default()
    }

    pub fn encoded(&self) -> &str {
        self.0.split_once(':').map(|(_, hex)| hex).unwrap_or_default()
    }

    /// Short, DNS-safe hash used as the hostname fragment of a service.
    ///
    /// Stable across platforms and Rust versions.
    pub fn host_hash(&self) -> String {
        format!("{:016x}", fnv1a_64(self.0.as_bytes()))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidDigest {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let (alg, encoded) = s
            .split_once(':')
            .ok_or_else(|| invalid("missing ':' separator"))?;

        if alg != SHA256 {
            return Err(invalid("unsupported algorithm (expected sha256)"));
        }
        if encoded.len() != SHA256_HEX_LEN {
            return Err(invalid("sha256 digests are 64 hex characters long"));
        }
        if !encoded
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(invalid("encoded part must be lowercase hex"));
        }

        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for Digest {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

/// FNV-1a 64-bit hash.
fn fnv1a_64(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

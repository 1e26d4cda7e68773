//! Content fingerprints
//!
//! A [`Fingerprint`] is the XXH3-128 digest of a file's bytes, rendered as 32
//! lowercase hex characters. It is the value stored in the remote `FileHash`
//! list column and the primary signal for change detection.

use std::fmt::{self, Display, Formatter};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use super::errors::{DomainError, FingerprintError};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Read buffer size used when hashing a file of `len` bytes.
///
/// Larger files get larger buffers; memory use stays bounded by the largest tier.
pub fn chunk_size_for(len: u64) -> usize {
    let size = if len < MIB {
        64 * KIB
    } else if len < 10 * MIB {
        256 * KIB
    } else if len < 100 * MIB {
        MIB
    } else if len < GIB {
        4 * MIB
    } else {
        8 * MIB
    };
    size as usize
}

/// XXH3-128 content digest in lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Length of the hex rendering.
    pub const HEX_LEN: usize = 32;

    /// Parse a stored value. Accepts either case; normalizes to lowercase.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let trimmed = value.trim();
        if trimmed.len() != Self::HEX_LEN || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidFingerprint(value.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Digest an in-memory buffer.
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = Xxh3::new();
        hasher.update(data);
        Self::from_digest(hasher.digest128())
    }

    fn from_digest(digest: u128) -> Self {
        Self(format!("{digest:032x}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

/// Stream `path` through XXH3-128 without loading it whole.
///
/// Blocking; async callers run it on `spawn_blocking`.
pub fn fingerprint_file(path: &Path) -> Result<Fingerprint, FingerprintError> {
    let mut file = File::open(path).map_err(|e| FingerprintError::from_io(path, &e))?;
    let len = file
        .metadata()
        .map_err(|e| FingerprintError::from_io(path, &e))?
        .len();

    let mut buf = vec![0u8; chunk_size_for(len)];
    let mut hasher = Xxh3::new();
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FingerprintError::from_io(path, &e)),
        };
        hasher.update(&buf[..n]);
    }
    Ok(Fingerprint::from_digest(hasher.digest128()))
}

//! Content digests in `"<algorithm>:<hex>"` form

use crate::error::{ProtocolError, Result};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

/// Hash algorithms a digest may name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha256,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
        }
    }
}

/// A parsed content digest.
///
/// The hex part is kept exactly as given: the relay compares it textually
/// against the lowercase hex it computes, so a digest declared in uppercase
/// never verifies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: DigestAlgorithm,
    hex: String,
}

impl Digest {
    /// Parse `"sha256:<hex>"`
    pub fn parse(spec: &str) -> Result<Self> {
        let tokens: Vec<&str> = spec.split(':').collect();
        if tokens.len() != 2 {
            return Err(ProtocolError::InvalidDigestFormat(spec.to_string()));
        }

        let algorithm = match tokens[0] {
            "sha256" => DigestAlgorithm::Sha256,
            other => return Err(ProtocolError::UnsupportedHashType(other.to_string())),
        };

        Ok(Self {
            algorithm,
            hex: tokens[1].to_string(),
        })
    }

    /// Compute the sha256 digest of `data`
    pub fn sha256(data: &[u8]) -> Self {
        let mut hasher = DigestHasher::new(DigestAlgorithm::Sha256);
        hasher.update(data);
        hasher.finalize()
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Hex part without the algorithm prefix
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Start an incremental hash using the same algorithm as this digest
    pub fn hasher(&self) -> DigestHasher {
        DigestHasher::new(self.algorithm)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.hex)
    }
}

impl FromStr for Digest {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Digest::parse(s)
    }
}

/// Incremental digest over streamed chunks
#[derive(Clone)]
pub struct DigestHasher {
    algorithm: DigestAlgorithm,
    inner: Sha256,
}

impl DigestHasher {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            inner: Sha256::new(),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    pub fn finalize(self) -> Digest {
        Digest {
            algorithm: self.algorithm,
            hex: hex::encode(self.inner.finalize()),
        }
    }
}

impl fmt::Debug for DigestHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestHasher")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_WORLD_SHA256: &str =
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_sha256_of_known_input() {
        let digest = Digest::sha256(b"hello world");
        assert_eq!(digest.hex(), HELLO_WORLD_SHA256);
        assert_eq!(digest.to_string(), format!("sha256:{}", HELLO_WORLD_SHA256));
    }

    #[test]
    fn test_parse_valid_digest() {
        let digest = Digest::parse("sha256:1234").unwrap();
        assert_eq!(digest.algorithm(), DigestAlgorithm::Sha256);
        assert_eq!(digest.hex(), "1234");
        assert_eq!(digest.to_string(), "sha256:1234");
    }

    #[test]
    fn test_parse_rejects_malformed_digests() {
        assert!(matches!(
            Digest::parse("deadbeef"),
            Err(ProtocolError::InvalidDigestFormat(_))
        ));
        assert!(matches!(
            Digest::parse("sha256:ab:cd"),
            Err(ProtocolError::InvalidDigestFormat(_))
        ));
        assert!(matches!(
            Digest::parse("md5:abcd"),
            Err(ProtocolError::UnsupportedHashType(alg)) if alg == "md5"
        ));
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut hasher = DigestHasher::new(DigestAlgorithm::Sha256);
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), Digest::sha256(b"hello world"));
    }
}

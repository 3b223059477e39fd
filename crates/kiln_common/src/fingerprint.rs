//! Content fingerprinting for cache invalidation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 128-bit content fingerprint computed using XXH3.
///
/// Two byte sequences with the same `Fingerprint` are assumed to be
/// identical. Used throughout the engine to detect when input files, output
/// files, or operation arguments have changed between builds. Equality is
/// the only meaningful operation; the digest is otherwise opaque.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    /// Computes a fingerprint from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }

    /// Computes a fingerprint incrementally from a reader.
    ///
    /// Reads the source in 64 KiB chunks so large files are never held in
    /// memory whole.
    pub fn from_reader<R: std::io::Read>(mut reader: R) -> std::io::Result<Self> {
        let mut hasher = xxhash_rust::xxh3::Xxh3::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hasher.digest128().to_le_bytes()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = Fingerprint::from_bytes(b"hello world");
        let b = Fingerprint::from_bytes(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn different_inputs_differ() {
        let a = Fingerprint::from_bytes(b"hello");
        let b = Fingerprint::from_bytes(b"world");
        assert_ne!(a, b);
    }

    #[test]
    fn reader_matches_bytes() {
        let data = b"some file content that spans a single chunk";
        let from_reader = Fingerprint::from_reader(&data[..]).unwrap();
        assert_eq!(from_reader, Fingerprint::from_bytes(data));
    }

    #[test]
    fn reader_handles_large_input() {
        let data: Vec<u8> = (0..200_000).map(|i| (i % 251) as u8).collect();
        let from_reader = Fingerprint::from_reader(&data[..]).unwrap();
        assert_eq!(from_reader, Fingerprint::from_bytes(&data));
    }

    #[test]
    fn display_format() {
        let h = Fingerprint::from_bytes(b"test");
        let s = format!("{h}");
        assert_eq!(s.len(), 32, "Display should be 32 hex chars");
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn serde_roundtrip() {
        let h = Fingerprint::from_bytes(b"serde test");
        let json = serde_json::to_string(&h).unwrap();
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
    }
}

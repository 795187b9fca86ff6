//! SHA-256 verification of downloaded artifacts.
//!
//! A recipe's `sha256` is the only thing standing between a download and
//! the build, so a mismatch always aborts the install.

use crate::error::{Error, Result};
use crate::types::ResourceDescriptor;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Length of a hex-encoded SHA-256 digest.
pub const SHA256_HEX_LEN: usize = 64;

/// Hex-encoded SHA-256 of a byte slice.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex-encoded SHA-256 of a file, read in 1 MiB chunks.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::with_capacity(1024 * 1024, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];

    loop {
        let read = reader.read(&mut buffer).map_err(|e| Error::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verify artifact bytes against a descriptor.
///
/// # Errors
///
/// Returns `Error::ChecksumMismatch` if the digest differs from
/// `descriptor.checksum_hex` (compared case-insensitively).
pub fn verify(descriptor: &ResourceDescriptor, bytes: &[u8]) -> Result<()> {
    let actual = sha256_hex(bytes);
    compare(descriptor, actual)
}

/// Verify a file on disk against a descriptor.
pub fn verify_file(descriptor: &ResourceDescriptor, path: &Path) -> Result<()> {
    let actual = sha256_file(path)?;
    compare(descriptor, actual)
}

fn compare(descriptor: &ResourceDescriptor, actual: String) -> Result<()> {
    if actual.eq_ignore_ascii_case(&descriptor.checksum_hex) {
        log::debug!("{}: sha256 {} OK", descriptor.name, actual);
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            resource: descriptor.name.clone(),
            expected: descriptor.checksum_hex.to_ascii_lowercase(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABC_SHA: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    fn descriptor(checksum: &str) -> ResourceDescriptor {
        ResourceDescriptor::new("abc", "file:///abc", "1.0", checksum)
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(sha256_hex(b"abc"), ABC_SHA);
        assert_eq!(sha256_hex(b"abc").len(), SHA256_HEX_LEN);
    }

    #[test]
    fn test_verify_accepts_matching_bytes() {
        assert!(verify(&descriptor(ABC_SHA), b"abc").is_ok());
    }

    #[test]
    fn test_verify_is_case_insensitive() {
        assert!(verify(&descriptor(&ABC_SHA.to_uppercase()), b"abc").is_ok());
    }

    #[test]
    fn test_any_single_byte_mutation_is_rejected() {
        let original = b"the quick brown fox jumps over the lazy dog".to_vec();
        let d = descriptor(&sha256_hex(&original));
        assert!(verify(&d, &original).is_ok());

        for i in 0..original.len() {
            let mut mutated = original.clone();
            mutated[i] ^= 0x01;
            match verify(&d, &mutated) {
                Err(Error::ChecksumMismatch { resource, .. }) => assert_eq!(resource, "abc"),
                other => panic!("byte {i}: expected ChecksumMismatch, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_verify_reports_both_digests() {
        let err = verify(&descriptor(ABC_SHA), b"abd").unwrap_err();
        match err {
            Error::ChecksumMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, ABC_SHA);
                assert_eq!(actual, sha256_hex(b"abd"));
            }
            other => panic!("Expected ChecksumMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(sha256_file(&path).unwrap(), ABC_SHA);
        assert!(verify_file(&descriptor(ABC_SHA), &path).is_ok());

        std::fs::write(&path, b"abcd").unwrap();
        assert!(verify_file(&descriptor(ABC_SHA), &path).is_err());
    }
}

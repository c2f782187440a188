//! Streaming SHA-256 content hashing.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::core::errors::{MwError, Result};

/// Read buffer size used while streaming file content into the digest.
pub const HASH_CHUNK_BYTES: usize = 64 * 1024;

/// Hash everything `reader` yields. Only bytes matter; no metadata is read.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_BYTES];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

/// Lowercase hex SHA-256 of a file's content.
pub fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|source| MwError::io(path, source))?;
    hash_reader(BufReader::with_capacity(HASH_CHUNK_BYTES, file))
        .map_err(|source| MwError::io(path, source))
}

/// Whether `value` looks like a SHA-256 hex digest (either case).
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn empty_file_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty");
        fs::write(&path, b"").unwrap();
        assert_eq!(
            hash_file(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn known_content_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hello");
        fs::write(&path, b"hello").unwrap();
        assert_eq!(
            hash_file(&path).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn content_larger_than_one_chunk_matches_single_shot_digest() {
        let data: Vec<u8> = (0..(HASH_CHUNK_BYTES * 3 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        let streamed = hash_reader(&data[..]).unwrap();
        let single = hex_encode(&Sha256::digest(&data));
        assert_eq!(streamed, single);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = hash_file(Path::new("/nonexistent_mw/file.whl")).unwrap_err();
        assert_eq!(err.code(), "MW-3002");
    }

    #[test]
    fn hex_shape_check() {
        assert!(is_sha256_hex(
            "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824"
        ));
        assert!(!is_sha256_hex("abc"));
        assert!(!is_sha256_hex(&"g".repeat(64)));
    }
}

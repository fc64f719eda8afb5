//! SHA-256 digests of output files.
//!
//! Digests are recomputed for every response because the files may change
//! between requests.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Chunk size used when copying and hashing.
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Stream `path` through SHA-256 and return the raw digest.
pub fn sha256_file(path: impl AsRef<Path>) -> io::Result<[u8; 32]> {
    let mut file = File::open(path)?;
    let (_, digest) = copy_with_sha256(&mut file, &mut io::sink())?;
    Ok(digest)
}

/// Copy `reader` into `writer`, hashing exactly the bytes copied.
///
/// Returns the number of bytes copied and their SHA-256 digest.
pub fn copy_with_sha256<R, W>(reader: &mut R, writer: &mut W) -> io::Result<(u64, [u8; 32])>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
        copied += n as u64;
    }

    writer.flush()?;
    Ok((copied, hasher.finalize().into()))
}

/// Hex-encoded SHA-256 digest of `path`.
pub fn sha256_file_hex(path: impl AsRef<Path>) -> io::Result<String> {
    sha256_file(path).map(hex::encode)
}

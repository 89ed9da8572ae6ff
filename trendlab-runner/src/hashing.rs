//! File-level hashing helper built on `trendlab_core::hashing`'s
//! SHA-256 primitive — used by the bars snapshot and the data fetcher
//! to hash files on disk rather than in-memory byte buffers.

use std::io::Read;
use std::path::Path;
use trendlab_core::hashing::sha256_hex;

pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(sha256_hex(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn hashes_file_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "hello").unwrap();
        file.flush().unwrap();
        assert_eq!(sha256_file(file.path()).unwrap(), sha256_hex(b"hello"));
    }
}

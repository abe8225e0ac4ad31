//! Streaming access to (possibly compressed, possibly remote) PGN archives.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const BUFFER_SIZE: usize = 16 * 1024;
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zstd,
    Gzip,
}

impl Compression {
    fn from_extension(uri: &str) -> Option<Self> {
        let path = uri.split(['?', '#']).next().unwrap_or(uri);
        if path.ends_with(".zst") || path.ends_with(".zstd") {
            Some(Self::Zstd)
        } else if path.ends_with(".gz") {
            Some(Self::Gzip)
        } else {
            None
        }
    }

    fn sniff(header: &[u8]) -> Self {
        if header.starts_with(&ZSTD_MAGIC) {
            Self::Zstd
        } else if header.starts_with(&GZIP_MAGIC) {
            Self::Gzip
        } else {
            Self::None
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Archive not found: {0}")]
    NotFound(String),
    #[error("Failed to read archive {uri}: {source}")]
    Io {
        uri: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to fetch archive {uri}: {source}")]
    Http {
        uri: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Counts bytes pulled from the underlying (compressed) stream.
struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// A forward-only line-readable stream of decompressed archive bytes.
///
/// Opening performs blocking I/O (including HTTP for `http(s)://` URIs), so
/// async callers must use `tokio::task::spawn_blocking`. The stream cannot be
/// rewound; to start over, open the archive again.
pub struct ArchiveReader {
    inner: Box<dyn BufRead + Send>,
    compression: Compression,
    bytes_read: Arc<AtomicU64>,
}

impl ArchiveReader {
    pub fn open(uri: &str) -> Result<Self, ArchiveError> {
        let bytes_read = Arc::new(AtomicU64::new(0));
        let raw: Box<dyn Read + Send> = if is_remote(uri) {
            let response = reqwest::blocking::get(uri)
                .and_then(|r| r.error_for_status())
                .map_err(|source| ArchiveError::Http {
                    uri: uri.to_string(),
                    source,
                })?;
            Box::new(response)
        } else {
            let path = Path::new(uri);
            if !path.exists() {
                return Err(ArchiveError::NotFound(uri.to_string()));
            }
            Box::new(File::open(path).map_err(|source| ArchiveError::Io {
                uri: uri.to_string(),
                source,
            })?)
        };

        let counted = CountingReader {
            inner: raw,
            count: Arc::clone(&bytes_read),
        };
        Self::from_reader(uri, counted, bytes_read)
    }

    fn from_reader<R: Read + Send + 'static>(
        uri: &str,
        reader: R,
        bytes_read: Arc<AtomicU64>,
    ) -> Result<Self, ArchiveError> {
        let io_err = |source| ArchiveError::Io {
            uri: uri.to_string(),
            source,
        };

        let mut buffered = BufReader::with_capacity(BUFFER_SIZE, reader);
        let compression = match Compression::from_extension(uri) {
            Some(c) => c,
            None => Compression::sniff(buffered.fill_buf().map_err(io_err)?),
        };

        let inner: Box<dyn BufRead + Send> = match compression {
            Compression::None => Box::new(buffered),
            Compression::Zstd => {
                let decoder = zstd::Decoder::with_buffer(buffered).map_err(io_err)?;
                Box::new(BufReader::with_capacity(BUFFER_SIZE, decoder))
            }
            Compression::Gzip => {
                let decoder = flate2::bufread::MultiGzDecoder::new(buffered);
                Box::new(BufReader::with_capacity(BUFFER_SIZE, decoder))
            }
        };

        tracing::debug!(uri, ?compression, "Opened archive");
        Ok(Self {
            inner,
            compression,
            bytes_read,
        })
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Raw (still compressed) bytes consumed so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// A handle for watching progress from another thread.
    pub fn progress(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bytes_read)
    }
}

impl Read for ArchiveReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BufRead for ArchiveReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}

fn is_remote(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PGN: &str = "[Event \"a\"]\n\n1. e4 e5 1-0\n";

    fn read_all(mut reader: ArchiveReader) -> String {
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn reads_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.pgn");
        std::fs::write(&path, PGN).unwrap();

        let reader = ArchiveReader::open(path.to_str().unwrap()).unwrap();
        assert_eq!(reader.compression(), Compression::None);
        assert_eq!(read_all(reader), PGN);
    }

    #[test]
    fn reads_zstd_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.pgn.zst");
        std::fs::write(&path, zstd::encode_all(PGN.as_bytes(), 3).unwrap()).unwrap();

        let reader = ArchiveReader::open(path.to_str().unwrap()).unwrap();
        assert_eq!(reader.compression(), Compression::Zstd);
        assert_eq!(read_all(reader), PGN);
    }

    #[test]
    fn sniffs_gzip_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.bin");
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(PGN.as_bytes()).unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let reader = ArchiveReader::open(path.to_str().unwrap()).unwrap();
        assert_eq!(reader.compression(), Compression::Gzip);
        assert_eq!(read_all(reader), PGN);
    }

    #[test]
    fn counts_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.pgn");
        std::fs::write(&path, PGN).unwrap();

        let mut reader = ArchiveReader::open(path.to_str().unwrap()).unwrap();
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).unwrap();
        assert_eq!(reader.bytes_read(), PGN.len() as u64);
    }

    #[test]
    fn missing_file_is_not_found() {
        assert!(matches!(
            ArchiveReader::open("/definitely/not/here.pgn"),
            Err(ArchiveError::NotFound(_))
        ));
    }

    #[test]
    fn corrupt_zstd_surfaces_as_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pgn.zst");
        std::fs::write(&path, b"definitely not zstd data").unwrap();

        let result = ArchiveReader::open(path.to_str().unwrap())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
            .and_then(|mut r| {
                let mut out = Vec::new();
                r.read_to_end(&mut out).map(|_| out)
            });
        assert!(result.is_err());
    }
}

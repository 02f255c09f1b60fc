//! Content digests: whole-file and head + tail windowed BLAKE3.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use blake3::Hasher;

use dupscope_core::{DEFAULT_QUICK_WINDOW, FingerprintError, HashMode};

/// Files up to this many windows long are hashed whole in quick mode.
pub const SMALL_FILE_FACTOR: u64 = 10;

/// A seekable byte stream.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Opens file content for fingerprinting.
pub trait ContentSource: Send + Sync {
    /// Open `path` for reading.
    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>>;
}

/// Reads content straight from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl ContentSource for FsSource {
    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(File::open(path)?))
    }
}

/// Digest engine owned by a single worker.
///
/// The inner hasher is reset before every digest, so one instance can be
/// reused for any number of files but must not be shared between threads.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    mode: HashMode,
    window: u64,
    hasher: Hasher,
}

impl Fingerprinter {
    /// Create a fingerprinter. A zero `window` falls back to the default.
    pub fn new(mode: HashMode, window: u64) -> Self {
        let window = if window == 0 { DEFAULT_QUICK_WINDOW } else { window };
        Self {
            mode,
            window,
            hasher: Hasher::new(),
        }
    }

    /// Digest `reader` according to the configured mode.
    pub fn digest<R: Read + Seek + ?Sized>(&mut self, reader: &mut R, size: u64) -> io::Result<String> {
        match self.mode {
            HashMode::Quick => self.quick_digest(reader, size),
            HashMode::Full => self.full_digest(reader),
        }
    }

    /// Digest the complete content of `reader`.
    pub fn full_digest<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<String> {
        self.hasher.reset();
        io::copy(reader, &mut self.hasher)?;
        Ok(self.finish())
    }

    /// Digest a head + tail window of `reader`, whose declared length is `size`.
    ///
    /// Content no longer than [`SMALL_FILE_FACTOR`] windows is hashed whole in
    /// one pass instead. The size is not folded into the digest.
    pub fn quick_digest<R: Read + Seek + ?Sized>(
        &mut self,
        reader: &mut R,
        size: u64,
    ) -> io::Result<String> {
        self.hasher.reset();

        if size <= SMALL_FILE_FACTOR.saturating_mul(self.window) {
            io::copy(&mut reader.take(size), &mut self.hasher)?;
            return Ok(self.finish());
        }

        let half = self.window / 2;
        io::copy(&mut (&mut *reader).take(half), &mut self.hasher)?;
        reader.seek(SeekFrom::End(-(half as i64)))?;
        io::copy(&mut reader.take(half), &mut self.hasher)?;
        Ok(self.finish())
    }

    /// Open `path` through `source` and digest it.
    pub fn fingerprint(
        &mut self,
        source: &dyn ContentSource,
        path: &Path,
        size: u64,
    ) -> Result<String, FingerprintError> {
        let mut reader = source.open(path).map_err(|source| FingerprintError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.digest(&mut *reader, size).map_err(|source| FingerprintError::Read {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Digest the file at `path` on the local filesystem.
    pub fn fingerprint_path(&mut self, path: &Path, size: u64) -> Result<String, FingerprintError> {
        self.fingerprint(&FsSource, path, size)
    }

    fn finish(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use dupscope_core::MAX_DIGEST_LEN;

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_full_digest_matches_blake3() {
        let data = patterned(10_000);
        let mut fp = Fingerprinter::new(HashMode::Full, 1024);
        let digest = fp.full_digest(&mut Cursor::new(&data)).unwrap();

        assert_eq!(digest, blake3::hash(&data).to_hex().to_string());
        assert_eq!(digest.len(), MAX_DIGEST_LEN);
    }

    #[test]
    fn test_hasher_reset_between_uses() {
        let mut fp = Fingerprinter::new(HashMode::Full, 1024);
        let first = fp.full_digest(&mut Cursor::new(b"alpha".to_vec())).unwrap();
        let _ = fp.full_digest(&mut Cursor::new(b"beta".to_vec())).unwrap();
        let again = fp.full_digest(&mut Cursor::new(b"alpha".to_vec())).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_quick_digest_small_file_hashes_everything() {
        let data = patterned(5_000);
        let mut fp = Fingerprinter::new(HashMode::Quick, 1024);
        let quick = fp.quick_digest(&mut Cursor::new(&data), data.len() as u64).unwrap();
        assert_eq!(quick, blake3::hash(&data).to_hex().to_string());
    }

    #[test]
    fn test_quick_digest_ignores_middle_of_large_file() {
        let window = 1024u64;
        let a = patterned(20_000);
        let mut b = a.clone();
        b[10_000] ^= 0xff;

        let mut fp = Fingerprinter::new(HashMode::Quick, window);
        let qa = fp.quick_digest(&mut Cursor::new(&a), a.len() as u64).unwrap();
        let qb = fp.quick_digest(&mut Cursor::new(&b), b.len() as u64).unwrap();
        assert_eq!(qa, qb);

        let mut expected = blake3::Hasher::new();
        expected.update(&a[..512]);
        expected.update(&a[a.len() - 512..]);
        assert_eq!(qa, expected.finalize().to_hex().to_string());

        let mut full = Fingerprinter::new(HashMode::Full, window);
        let fa = full.digest(&mut Cursor::new(&a), a.len() as u64).unwrap();
        let fb = full.digest(&mut Cursor::new(&b), b.len() as u64).unwrap();
        assert_ne!(fa, fb);
    }

    #[test]
    fn test_quick_digest_sees_tail_change() {
        let a = patterned(20_000);
        let mut b = a.clone();
        *b.last_mut().unwrap() ^= 0x01;

        let mut fp = Fingerprinter::new(HashMode::Quick, 1024);
        let qa = fp.quick_digest(&mut Cursor::new(&a), 20_000).unwrap();
        let qb = fp.quick_digest(&mut Cursor::new(&b), 20_000).unwrap();
        assert_ne!(qa, qb);
    }

    #[test]
    fn test_fingerprint_open_error() {
        let mut fp = Fingerprinter::new(HashMode::Full, 1024);
        let err = fp
            .fingerprint_path(Path::new("/definitely/not/here.bin"), 10)
            .unwrap_err();
        assert!(matches!(err, FingerprintError::Open { .. }));
    }
}

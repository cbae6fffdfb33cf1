//! Filesystem access for static files and JSON uploads
//!
//! The dispatcher only needs three capabilities from the disk: test whether a
//! regular file exists, read one fully, and create a brand new file. They sit
//! behind [`FileStore`] so tests can substitute failures.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use rand::Rng;

use crate::clock::Clock;

/// How many fresh names are tried before an upload gives up
const MAX_NAME_ATTEMPTS: usize = 8;

/// Filesystem capabilities used by the dispatcher
pub trait FileStore: Send + Sync {
    /// Whether `path` names an existing regular file
    fn is_file(&self, path: &Path) -> bool;

    /// Read the whole file
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Write `data` to `path`, failing with `AlreadyExists` if it is taken
    fn create_new(&self, path: &Path, data: &[u8]) -> io::Result<()>;
}

/// The real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskStore;

impl FileStore for DiskStore {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn create_new(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(data)?;
        file.sync_data()
    }
}

/// A persisted upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    /// Generated file name, `upload_<YYYYMMDD_HHMMSS>_<6 hex>.json`
    pub filename: String,
    /// Where the bytes were written
    pub path: PathBuf,
    /// Number of bytes written
    pub size: usize,
}

impl UploadRecord {
    /// Build a name from a local timestamp and a 24-bit random suffix
    pub fn generate_name(time: DateTime<Local>, suffix: u32) -> String {
        format!("upload_{}_{:06x}.json", time.format("%Y%m%d_%H%M%S"), suffix & 0x00ff_ffff)
    }

    /// Path as exposed to clients, relative to the resource root
    pub fn public_path(&self, upload_subdir: &str) -> String {
        format!("/{}/{}", upload_subdir.trim_matches('/'), self.filename)
    }
}

/// Writes upload bodies under a fixed directory with collision-free names
pub struct UploadStore {
    dir: PathBuf,
    store: Arc<dyn FileStore>,
    clock: Arc<dyn Clock>,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, store: Arc<dyn FileStore>, clock: Arc<dyn Clock>) -> Self {
        Self { dir: dir.into(), store, clock }
    }

    /// Persist `body` verbatim to a freshly named file
    ///
    /// Files are opened with `create_new`, so two workers can never write the
    /// same path; on a name clash another suffix is drawn.
    pub fn persist(&self, body: &[u8]) -> io::Result<UploadRecord> {
        let mut rng = rand::thread_rng();

        for _ in 0..MAX_NAME_ATTEMPTS {
            let filename = UploadRecord::generate_name(self.clock.now_local(), rng.gen());
            let path = self.dir.join(&filename);

            match self.store.create_new(&path, body) {
                Ok(()) => return Ok(UploadRecord { filename, path, size: body.len() }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free upload name after {} attempts", MAX_NAME_ATTEMPTS),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_generate_name_format() {
        let time = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(UploadRecord::generate_name(time, 0xabc), "upload_20240307_090502_000abc.json");
        // Only the low 24 bits are used
        assert_eq!(
            UploadRecord::generate_name(time, 0xff12_3456),
            "upload_20240307_090502_123456.json"
        );
    }

    #[test]
    fn test_public_path() {
        let record = UploadRecord {
            filename: "upload_20240101_000000_abcdef.json".to_string(),
            path: PathBuf::from("/srv/uploads/upload_20240101_000000_abcdef.json"),
            size: 2,
        };
        assert_eq!(record.public_path("uploads"), "/uploads/upload_20240101_000000_abcdef.json");
        assert_eq!(record.public_path("/uploads/"), "/uploads/upload_20240101_000000_abcdef.json");
    }

    #[test]
    fn test_persist_writes_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadStore::new(dir.path(), Arc::new(DiskStore), Arc::new(SystemClock));

        let body = br#"{"name":"Ishan","score":100}"#;
        let record = uploads.persist(body).unwrap();

        assert_eq!(record.size, body.len());
        assert!(record.filename.starts_with("upload_"));
        assert!(record.filename.ends_with(".json"));
        assert_eq!(fs::read(&record.path).unwrap(), body);
    }

    #[test]
    fn test_persist_never_reuses_a_name() {
        let dir = tempfile::tempdir().unwrap();
        let frozen = FixedClock(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        let uploads = UploadStore::new(dir.path(), Arc::new(DiskStore), Arc::new(frozen));

        let mut names: Vec<String> =
            (0..50).map(|i| uploads.persist(format!("{}", i).as_bytes()).unwrap().filename).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 50);
    }

    /// Reports a clash for the first few writes
    struct Crowded {
        clashes: AtomicUsize,
    }

    impl FileStore for Crowded {
        fn is_file(&self, _path: &Path) -> bool {
            false
        }

        fn read(&self, _path: &Path) -> io::Result<Vec<u8>> {
            Err(io::ErrorKind::NotFound.into())
        }

        fn create_new(&self, _path: &Path, _data: &[u8]) -> io::Result<()> {
            if self.clashes.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(io::ErrorKind::AlreadyExists.into())
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_persist_retries_on_clash() {
        let store = Arc::new(Crowded { clashes: AtomicUsize::new(2) });
        let uploads = UploadStore::new("/uploads", store, Arc::new(SystemClock));
        assert!(uploads.persist(b"{}").is_ok());
    }

    #[test]
    fn test_persist_gives_up_eventually() {
        let store = Arc::new(Crowded { clashes: AtomicUsize::new(usize::MAX / 2) });
        let uploads = UploadStore::new("/uploads", store, Arc::new(SystemClock));
        let err = uploads.persist(b"{}").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}

//! Append-only output shared by every handler.
//!
//! Handlers run in separate processes, so a mutex alone cannot keep their
//! lines apart. Each write takes an exclusive `fcntl` record lock on the whole
//! file for its duration; the in-process mutex covers handlers that share a
//! process (thread isolation), because record locks are per process.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::errors::{KwError, KwResult};

/// Destination that accepts whole records without interleaving them
pub trait SerializedWriter: Send + Sync {
    /// Writes `record` as one unit: acquire, write, release.
    fn write_record(&self, record: &[u8]) -> KwResult<()>;
}

/// The shared output file
#[derive(Debug)]
pub struct OutputSink {
    file: Mutex<File>,
    path: PathBuf,
}

impl OutputSink {
    /// Opens `path` for appending, creating it if absent.
    pub fn open(path: impl AsRef<Path>) -> KwResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| KwError::output(path, e))?;
        debug!("Opened output sink {}", path.display());
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks until this process holds the sink exclusively.
    pub fn acquire(&self) -> KwResult<RecordLock<'_>> {
        let file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        set_lock(&file, libc::F_WRLCK, libc::F_SETLKW)
            .map_err(|e| KwError::output(&self.path, e))?;
        Ok(RecordLock {
            file,
            path: &self.path,
        })
    }
}

impl SerializedWriter for OutputSink {
    fn write_record(&self, record: &[u8]) -> KwResult<()> {
        let mut lock = self.acquire()?;
        lock.write(record)
    }
}

/// Exclusive hold on the sink; released on drop
pub struct RecordLock<'a> {
    file: MutexGuard<'a, File>,
    path: &'a Path,
}

impl RecordLock<'_> {
    pub fn write(&mut self, bytes: &[u8]) -> KwResult<()> {
        self.file
            .write_all(bytes)
            .map_err(|e| KwError::output(self.path, e))
    }
}

impl Drop for RecordLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = set_lock(&self.file, libc::F_UNLCK, libc::F_SETLK) {
            warn!("Failed to release output lock: {}", e);
        }
    }
}

/// Applies a whole-file record lock of `kind` with `command`.
fn set_lock(file: &File, kind: libc::c_int, command: libc::c_int) -> io::Result<()> {
    // l_start = 0 and l_len = 0 cover the whole file, however long it grows.
    let mut lock: libc::flock = unsafe { std::mem::zeroed() };
    lock.l_type = kind as libc::c_short;
    lock.l_whence = libc::SEEK_SET as libc::c_short;

    loop {
        if unsafe { libc::fcntl(file.as_raw_fd(), command, &lock as *const libc::flock) } != -1 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_creates_and_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("output.txt");
        std::fs::write(&path, "existing\n").unwrap();

        let sink = OutputSink::open(&path).unwrap();
        sink.write_record(b"a.txt:1:first\n").unwrap();
        {
            let mut lock = sink.acquire().unwrap();
            lock.write(b"b.txt:").unwrap();
            lock.write(b"2:second\n").unwrap();
        }

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "existing\na.txt:1:first\nb.txt:2:second\n"
        );
    }

    #[test]
    fn test_concurrent_writers_never_splice_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("output.txt");
        let sink = Arc::new(OutputSink::open(&path).unwrap());

        let writers: Vec<_> = (0..8)
            .map(|w| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    for i in 0..200 {
                        let line = format!("w{}.txt:{}:{}\n", w, i, "x".repeat(64));
                        sink.write_record(line.as_bytes()).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 8 * 200);
        for line in lines {
            let parts: Vec<_> = line.splitn(3, ':').collect();
            assert_eq!(parts.len(), 3);
            assert!(parts[0].starts_with('w'));
            assert_eq!(parts[2], "x".repeat(64));
        }
    }

    #[test]
    fn test_write_failure_names_the_output() {
        let sink = OutputSink::open("/dev/full").unwrap();
        let err = sink.write_record(b"a.txt:1:foo\n").unwrap_err();
        assert!(matches!(err, KwError::Output { ref path, .. } if path == Path::new("/dev/full")));
        assert!(!err.is_per_job());
    }

    #[test]
    fn test_open_in_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("output.txt");
        assert!(matches!(OutputSink::open(&path), Err(KwError::Output { .. })));
    }
}

use memmap2::{MmapMut, MmapOptions};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::ring::RingBuffer;
use super::semaphore::NamedSemaphore;
use super::{RecordSink, RecordSource};
use crate::config::ServiceConfig;
use crate::errors::{KwError, KwResult};
use crate::request::MAX_RECORD_LEN;

/// Names and sizes of the resources backing one queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    /// Base name for the region file and the three semaphores
    pub name: String,
    /// Directory holding the region file, normally `/dev/shm`
    pub shm_dir: PathBuf,
    /// Number of requests that may be outstanding
    pub slots: usize,
    /// Largest record, terminator included
    pub slot_len: usize,
}

impl QueueOptions {
    pub fn new(name: impl Into<String>, shm_dir: impl Into<PathBuf>, slots: usize) -> Self {
        Self {
            name: name.into(),
            shm_dir: shm_dir.into(),
            slots,
            slot_len: MAX_RECORD_LEN,
        }
    }

    /// Data bytes in the region
    pub fn capacity(&self) -> usize {
        self.slots.saturating_mul(self.slot_len)
    }

    pub fn region_path(&self) -> PathBuf {
        self.shm_dir.join(&self.name)
    }

    fn semaphore_name(&self, role: &str) -> String {
        format!("/{}-{}", self.name, role)
    }
}

impl From<&ServiceConfig> for QueueOptions {
    fn from(config: &ServiceConfig) -> Self {
        Self::new(
            config.queue_name.clone(),
            config.shm_dir.clone(),
            config.queue_capacity.get(),
        )
    }
}

/// Request queue living in a named shared-memory region.
///
/// The server creates it and is its only consumer; any number of client
/// processes attach and enqueue. Three named semaphores coordinate them:
/// `empty` counts free request slots, `full` counts queued records and `mutex`
/// serializes access to the region.
pub struct SharedQueue {
    ring: RingBuffer<MmapMut>,
    empty: NamedSemaphore,
    full: NamedSemaphore,
    mutex: NamedSemaphore,
    options: QueueOptions,
    owner: bool,
}

impl SharedQueue {
    /// Creates the region and semaphores. Stale resources from an earlier run
    /// are replaced; on failure nothing created here is left behind.
    pub fn create(options: &QueueOptions) -> KwResult<Self> {
        if options.slots == 0 || options.slot_len < 2 {
            return Err(KwError::config_error("queue must hold at least one record"));
        }
        if options.slots > u32::MAX as usize {
            return Err(KwError::config_error(format!(
                "queue capacity {} exceeds semaphore range",
                options.slots
            )));
        }
        match options.slots.checked_mul(options.slot_len) {
            Some(capacity) if capacity <= u32::MAX as usize => {}
            _ => {
                return Err(KwError::config_error(format!(
                    "{} requests of {} bytes exceed the 32-bit queue cursor",
                    options.slots, options.slot_len
                )))
            }
        }

        match Self::build(options) {
            Ok(queue) => {
                info!(
                    "Created request queue {} ({} requests, {} bytes)",
                    options.region_path().display(),
                    options.slots,
                    queue.capacity()
                );
                Ok(queue)
            }
            Err(e) => {
                Self::remove_resources(options, false);
                Err(e)
            }
        }
    }

    fn build(options: &QueueOptions) -> KwResult<Self> {
        let empty = NamedSemaphore::create(&options.semaphore_name("empty"), options.slots as u32)?;
        let full = NamedSemaphore::create(&options.semaphore_name("full"), 0)?;
        let mutex = NamedSemaphore::create(&options.semaphore_name("mutex"), 1)?;

        let mut ring = RingBuffer::new(Self::create_region(options)?)?;
        ring.reset();

        Ok(Self {
            ring,
            empty,
            full,
            mutex,
            options: options.clone(),
            owner: true,
        })
    }

    /// Attaches to a queue the server created.
    pub fn attach(options: &QueueOptions) -> KwResult<Self> {
        let path = options.region_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| KwError::shared_memory(&path, e))?;

        let expected = RingBuffer::<MmapMut>::region_len(options.capacity()) as u64;
        let actual = file
            .metadata()
            .map_err(|e| KwError::shared_memory(&path, e))?
            .len();
        if actual != expected {
            return Err(KwError::config_error(format!(
                "queue {} holds {} bytes but {} requests need {}",
                path.display(),
                actual,
                options.slots,
                expected
            )));
        }

        let mmap = Self::map(&file, &path)?;
        let ring = RingBuffer::new(mmap)?;
        let empty = NamedSemaphore::open(&options.semaphore_name("empty"))?;
        let full = NamedSemaphore::open(&options.semaphore_name("full"))?;
        let mutex = NamedSemaphore::open(&options.semaphore_name("mutex"))?;

        debug!("Attached to request queue {}", path.display());

        Ok(Self {
            ring,
            empty,
            full,
            mutex,
            options: options.clone(),
            owner: false,
        })
    }

    /// Sizes the region under a private name first so attaching clients
    /// never map a short file.
    fn create_region(options: &QueueOptions) -> KwResult<MmapMut> {
        let path = options.region_path();
        let staging = options
            .shm_dir
            .join(format!(".{}.{}", options.name, std::process::id()));
        let region_len = RingBuffer::<MmapMut>::region_len(options.capacity());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&staging)
            .map_err(|e| KwError::shared_memory(&staging, e))?;

        let placed = file
            .set_len(region_len as u64)
            .map_err(|e| KwError::shared_memory(&staging, e))
            .and_then(|()| Self::map(&file, &staging))
            .and_then(|mmap| {
                fs::rename(&staging, &path)
                    .map(|()| mmap)
                    .map_err(|e| KwError::shared_memory(&path, e))
            });
        if placed.is_err() {
            let _ = fs::remove_file(&staging);
        }
        placed
    }

    fn map(file: &File, path: &Path) -> KwResult<MmapMut> {
        unsafe { MmapOptions::new().map_mut(file) }.map_err(|e| KwError::shared_memory(path, e))
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    /// Data bytes in the region
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Blocks until a free slot exists, then appends `record`.
    pub fn enqueue(&mut self, record: &str) -> KwResult<()> {
        let len = record.len() + 1;
        if len > self.options.slot_len {
            return Err(KwError::record_too_long(len, self.options.slot_len));
        }

        self.empty.wait()?;
        self.mutex.wait()?;
        let written = self.ring.write(record.as_bytes());
        self.mutex.post()?;

        match written {
            Ok(()) => self.full.post(),
            Err(e) => {
                // Hand the slot back; nothing was queued.
                self.empty.post()?;
                Err(e)
            }
        }
    }

    /// Blocks until a record is queued, then removes it.
    pub fn dequeue(&mut self) -> KwResult<String> {
        self.full.wait()?;
        self.mutex.wait()?;
        let read = self.ring.read();
        self.mutex.post()?;
        self.empty.post()?;

        String::from_utf8(read?)
            .map_err(|e| KwError::corrupt_queue(format!("record is not UTF-8: {}", e)))
    }

    fn release(&self) {
        Self::remove_resources(&self.options, true);
        info!("Released request queue {}", self.options.region_path().display());
    }

    /// Unlinks the semaphores and removes the region file.
    fn remove_resources(options: &QueueOptions, report: bool) {
        for role in ["empty", "full", "mutex"] {
            let name = options.semaphore_name(role);
            if let Err(e) = NamedSemaphore::unlink(&name) {
                if report {
                    warn!("Failed to unlink {}: {}", name, e);
                }
            }
        }
        let path = options.region_path();
        if let Err(e) = fs::remove_file(&path) {
            if report {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

impl RecordSink for SharedQueue {
    fn enqueue(&mut self, record: &str) -> KwResult<()> {
        SharedQueue::enqueue(self, record)
    }
}

impl RecordSource for SharedQueue {
    fn dequeue(&mut self) -> KwResult<String> {
        SharedQueue::dequeue(self)
    }
}

impl Drop for SharedQueue {
    fn drop(&mut self) {
        if self.owner {
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    static NEXT_QUEUE: AtomicUsize = AtomicUsize::new(0);

    fn options(dir: &Path, slots: usize) -> QueueOptions {
        let n = NEXT_QUEUE.fetch_add(1, Ordering::Relaxed);
        QueueOptions::new(
            format!("kwq-{}-{}", std::process::id(), n),
            dir,
            slots,
        )
    }

    #[test]
    fn test_round_trip_across_processes_views() {
        let dir = tempdir().unwrap();
        let opts = options(dir.path(), 4);
        let mut server = SharedQueue::create(&opts).unwrap();
        let mut client = SharedQueue::attach(&opts).unwrap();

        client.enqueue("/tmp foo").unwrap();
        client.enqueue("/var bar").unwrap();
        assert_eq!(server.dequeue().unwrap(), "/tmp foo");
        assert_eq!(server.dequeue().unwrap(), "/var bar");
    }

    #[test]
    fn test_small_region_wraps() {
        let dir = tempdir().unwrap();
        let mut opts = options(dir.path(), 2);
        opts.slot_len = 25;
        let mut server = SharedQueue::create(&opts).unwrap();
        let mut client = SharedQueue::attach(&opts).unwrap();
        assert_eq!(server.capacity(), 50);

        client.enqueue("/warmup/directory warm").unwrap();
        assert_eq!(server.dequeue().unwrap(), "/warmup/directory warm");

        client.enqueue("/srv/alpha keyword").unwrap();
        client.enqueue("/srv/data needle").unwrap();
        assert_eq!(server.dequeue().unwrap(), "/srv/alpha keyword");
        assert_eq!(server.dequeue().unwrap(), "/srv/data needle");
    }

    #[test]
    fn test_enqueue_blocks_when_full() {
        let dir = tempdir().unwrap();
        let opts = options(dir.path(), 1);
        let mut server = SharedQueue::create(&opts).unwrap();
        let mut client = SharedQueue::attach(&opts).unwrap();
        client.enqueue("first job").unwrap();

        let (tx, rx) = mpsc::channel();
        let producer = thread::spawn(move || {
            client.enqueue("second job").unwrap();
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(server.dequeue().unwrap(), "first job");
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(server.dequeue().unwrap(), "second job");
        producer.join().unwrap();
    }

    #[test]
    fn test_concurrent_producers_deliver_everything() {
        let dir = tempdir().unwrap();
        let opts = options(dir.path(), 3);
        let mut server = SharedQueue::create(&opts).unwrap();

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let opts = opts.clone();
                thread::spawn(move || {
                    let mut client = SharedQueue::attach(&opts).unwrap();
                    for i in 0..25 {
                        client.enqueue(&format!("/dir/{} kw{}", p, i)).unwrap();
                    }
                })
            })
            .collect();

        let mut received: Vec<String> = (0..100).map(|_| server.dequeue().unwrap()).collect();
        for producer in producers {
            producer.join().unwrap();
        }

        // Per-producer order is FIFO.
        for p in 0..4 {
            let prefix = format!("/dir/{} ", p);
            let own: Vec<_> = received.iter().filter(|r| r.starts_with(&prefix)).collect();
            let expected: Vec<_> = (0..25).map(|i| format!("/dir/{} kw{}", p, i)).collect();
            assert_eq!(own, expected.iter().collect::<Vec<_>>());
        }
        received.sort();
        received.dedup();
        assert_eq!(received.len(), 100);
    }

    #[test]
    fn test_oversized_record_rejected_without_consuming_slot() {
        let dir = tempdir().unwrap();
        let mut opts = options(dir.path(), 1);
        opts.slot_len = 16;
        let mut server = SharedQueue::create(&opts).unwrap();
        let mut client = SharedQueue::attach(&opts).unwrap();

        assert!(matches!(
            client.enqueue("/a/very/long/path keyword"),
            Err(KwError::RecordTooLong { .. })
        ));
        client.enqueue("/a kw").unwrap();
        assert_eq!(server.dequeue().unwrap(), "/a kw");
    }

    #[test]
    fn test_attach_without_server_fails() {
        let dir = tempdir().unwrap();
        let opts = options(dir.path(), 2);
        assert!(matches!(
            SharedQueue::attach(&opts),
            Err(KwError::SharedMemory { .. })
        ));
    }

    #[test]
    fn test_attach_with_wrong_capacity_fails() {
        let dir = tempdir().unwrap();
        let opts = options(dir.path(), 2);
        let _server = SharedQueue::create(&opts).unwrap();
        let mut wrong = opts.clone();
        wrong.slots = 3;
        assert!(matches!(
            SharedQueue::attach(&wrong),
            Err(KwError::ConfigError(_))
        ));
    }

    #[test]
    fn test_owner_drop_releases_resources() {
        let dir = tempdir().unwrap();
        let opts = options(dir.path(), 2);
        let server = SharedQueue::create(&opts).unwrap();
        assert!(opts.region_path().exists());

        drop(server);
        assert!(!opts.region_path().exists());
        assert!(NamedSemaphore::open(&opts.semaphore_name("full")).is_err());
    }

    #[test]
    fn test_failed_create_leaves_no_semaphores() {
        let dir = tempdir().unwrap();
        let opts = options(&dir.path().join("missing"), 2);
        assert!(matches!(
            SharedQueue::create(&opts),
            Err(KwError::SharedMemory { .. })
        ));
        assert!(NamedSemaphore::open(&opts.semaphore_name("mutex")).is_err());
    }

    #[test]
    fn test_failed_placement_removes_everything() {
        let dir = tempdir().unwrap();
        let opts = options(dir.path(), 2);
        // A non-empty directory where the region belongs cannot be replaced.
        fs::create_dir(opts.region_path()).unwrap();
        fs::write(opts.region_path().join("keep"), "x").unwrap();

        assert!(matches!(
            SharedQueue::create(&opts),
            Err(KwError::SharedMemory { .. })
        ));
        for role in ["empty", "full", "mutex"] {
            assert!(NamedSemaphore::open(&opts.semaphore_name(role)).is_err());
        }
        let left: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![std::ffi::OsString::from(&opts.name)]);
    }

    #[test]
    fn test_region_beyond_cursor_range_is_rejected() {
        let dir = tempdir().unwrap();
        let mut opts = options(dir.path(), 4);
        opts.slot_len = u32::MAX as usize;

        assert!(matches!(
            SharedQueue::create(&opts),
            Err(KwError::ConfigError(_))
        ));
        assert!(NamedSemaphore::open(&opts.semaphore_name("empty")).is_err());
        assert!(!opts.region_path().exists());
    }
}

/// Request queue connecting clients to the dispatcher.
///
/// The queue is a fixed-capacity circular byte region holding NUL-terminated
/// records. [`ring::RingBuffer`] owns the byte layout and the wraparound
/// encoding and is usable over any byte storage; [`shared::SharedQueue`] lays
/// it over a memory-mapped file and adds the named semaphores that let several
/// client processes and one server process share it.
///
/// ```rust,ignore
/// let options = QueueOptions::from(&config);
/// let mut queue = SharedQueue::create(&options)?;   // server
/// let mut queue = SharedQueue::attach(&options)?;   // client
/// queue.enqueue("/srv/logs timeout")?;
/// let record = queue.dequeue()?;
/// ```
pub mod ring;
pub mod semaphore;
pub mod shared;

pub use ring::RingBuffer;
pub use semaphore::NamedSemaphore;
pub use shared::{QueueOptions, SharedQueue};

use crate::errors::KwResult;

/// Producer side of a request queue
pub trait RecordSink {
    /// Blocks until the record is queued.
    fn enqueue(&mut self, record: &str) -> KwResult<()>;
}

/// Consumer side of a request queue
pub trait RecordSource {
    /// Blocks until a record is available.
    fn dequeue(&mut self) -> KwResult<String>;
}

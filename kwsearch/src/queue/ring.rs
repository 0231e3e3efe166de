//! Wraparound-aware byte ring holding NUL-terminated records.
//!
//! The region is laid out as
//!
//! ```text
//! +---------------------------+-------------+-------------+
//! | data[capacity]            | overlap u16 | back u32    |
//! +---------------------------+-------------+-------------+
//! ```
//!
//! `overlap` is nonzero exactly while the most recently written record is split
//! across the end of `data`; it holds the number of bytes written at the tail.
//! `back` is the producer cursor. It lives in the region so that every producer
//! attached to the same region appends after the others. The consumer cursor is
//! private to the single reader.
//!
//! The ring does no synchronization and no capacity accounting. Callers must
//! serialize access and must not write more than `capacity` bytes ahead of the
//! reader.

use crate::errors::{KwError, KwResult};

/// Bytes following the data area: overlap length plus the shared back cursor
pub const TRAILER_LEN: usize = 2 + 4;

/// Byte storage a ring can be laid over
pub trait Region {
    fn bytes(&self) -> &[u8];
    fn bytes_mut(&mut self) -> &mut [u8];
}

impl Region for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }
}

impl Region for memmap2::MmapMut {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }
}

/// Circular byte buffer of NUL-terminated records
#[derive(Debug)]
pub struct RingBuffer<R> {
    region: R,
    capacity: usize,
    front: usize,
}

impl<R: Region> RingBuffer<R> {
    /// Lays a ring over `region`, using everything before the trailer as data.
    pub fn new(region: R) -> KwResult<Self> {
        let len = region.bytes().len();
        if len <= TRAILER_LEN {
            return Err(KwError::corrupt_queue(format!(
                "region of {} bytes has no room for data",
                len
            )));
        }
        let capacity = len - TRAILER_LEN;
        if capacity > u32::MAX as usize {
            return Err(KwError::corrupt_queue("region too large for a 32-bit cursor"));
        }
        Ok(Self {
            region,
            capacity,
            front: 0,
        })
    }

    /// Bytes needed to back a ring with `capacity` data bytes
    pub fn region_len(capacity: usize) -> usize {
        capacity + TRAILER_LEN
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a record is currently split across the end of the data area
    pub fn is_wrapped(&self) -> bool {
        self.overlap() != 0
    }

    /// Clears the trailer. Only the creator of a fresh region calls this.
    pub fn reset(&mut self) {
        self.set_overlap(0);
        self.set_back(0);
        self.front = 0;
    }

    /// Appends `record` plus its terminator at the shared back cursor.
    pub fn write(&mut self, record: &[u8]) -> KwResult<()> {
        if record.contains(&0) {
            return Err(KwError::invalid_request("record contains a NUL byte"));
        }
        let len = record.len() + 1;
        let max = self.capacity.min(u16::MAX as usize);
        if len > max {
            return Err(KwError::record_too_long(len, max));
        }

        let capacity = self.capacity;
        let back = self.back();
        if back >= capacity {
            return Err(KwError::corrupt_queue(format!(
                "back cursor {} outside capacity {}",
                back, capacity
            )));
        }

        let data = &mut self.region.bytes_mut()[..capacity];
        if back + len <= capacity {
            data[back..back + record.len()].copy_from_slice(record);
            data[back + record.len()] = 0;
        } else {
            let tail = capacity - back;
            let head = len - tail;
            // The terminator always lands in the head part.
            data[back..].copy_from_slice(&record[..tail]);
            data[..head - 1].copy_from_slice(&record[tail..]);
            data[head - 1] = 0;
            self.set_overlap(tail as u16);
        }

        self.set_back((back + len) % capacity);
        Ok(())
    }

    /// Removes the record at the front cursor.
    pub fn read(&mut self) -> KwResult<Vec<u8>> {
        let capacity = self.capacity;
        let front = self.front;
        let overlap = self.overlap() as usize;
        let data = &self.region.bytes()[..capacity];

        let record = if overlap != 0 && front == capacity - overlap {
            let mut record = data[front..].to_vec();
            let rest = data
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| KwError::corrupt_queue("wrapped record has no terminator"))?;
            record.extend_from_slice(&data[..rest]);
            self.set_overlap(0);
            record
        } else {
            let end = data[front..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| {
                    KwError::corrupt_queue(format!("no terminator after offset {}", front))
                })?;
            data[front..front + end].to_vec()
        };

        self.front = (front + record.len() + 1) % capacity;
        Ok(record)
    }

    fn overlap(&self) -> u16 {
        let bytes = self.region.bytes();
        u16::from_ne_bytes([bytes[self.capacity], bytes[self.capacity + 1]])
    }

    fn set_overlap(&mut self, value: u16) {
        let at = self.capacity;
        self.region.bytes_mut()[at..at + 2].copy_from_slice(&value.to_ne_bytes());
    }

    fn back(&self) -> usize {
        let at = self.capacity + 2;
        let bytes = &self.region.bytes()[at..at + 4];
        u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
    }

    fn set_back(&mut self, value: usize) {
        let at = self.capacity + 2;
        self.region.bytes_mut()[at..at + 4].copy_from_slice(&(value as u32).to_ne_bytes());
    }
}

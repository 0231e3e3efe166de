use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use crate::results::Item;
use crate::sync::Semaphore;

/// Bounded circular array between a handler's workers and its printer.
///
/// `free` counts empty slots and `filled` counts occupied ones; the slot
/// array and its two indices are only touched under `slots`. None of these
/// are shared with the request queue or the output sink.
#[derive(Debug)]
pub struct ItemBuffer {
    slots: Mutex<Slots>,
    free: Semaphore,
    filled: Semaphore,
    capacity: usize,
}

#[derive(Debug)]
struct Slots {
    items: Vec<Item>,
    fill_index: usize,
    use_index: usize,
}

impl ItemBuffer {
    pub fn new(capacity: NonZeroUsize) -> Self {
        let capacity = capacity.get();
        Self {
            slots: Mutex::new(Slots {
                items: vec![Item::Done; capacity],
                fill_index: 0,
                use_index: 0,
            }),
            free: Semaphore::new(capacity),
            filled: Semaphore::new(0),
            capacity,
        }
    }

    /// Blocks while the buffer is full, then stores `item`.
    pub fn put(&self, item: Item) {
        self.free.acquire();
        {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let at = slots.fill_index;
            slots.items[at] = item;
            slots.fill_index = (at + 1) % self.capacity;
        }
        self.filled.release();
    }

    /// Blocks while the buffer is empty, then removes the oldest item.
    pub fn take(&self) -> Item {
        self.filled.acquire();
        let item = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let at = slots.use_index;
            slots.use_index = (at + 1) % self.capacity;
            std::mem::replace(&mut slots.items[at], Item::Done)
        };
        self.free.release();
        item
    }

    /// Items currently waiting for the printer
    pub fn len(&self) -> usize {
        self.filled.available()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

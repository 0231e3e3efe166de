//! Blocking primitives used inside one handler process.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counting semaphore
#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            condvar: Condvar::new(),
        }
    }

    /// Blocks until a permit is available and takes it.
    pub fn acquire(&self) {
        let mut permits = lock(&self.permits);
        while *permits == 0 {
            permits = self
                .condvar
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= 1;
    }

    pub fn release(&self) {
        *lock(&self.permits) += 1;
        self.condvar.notify_one();
    }

    pub fn available(&self) -> usize {
        *lock(&self.permits)
    }
}

/// Number of a handler's tasks that have not finished.
///
/// Starts at the roster size. The printer decrements it once per sentinel and
/// once for itself; the handler blocks in [`ActiveCount::wait_zero`].
#[derive(Debug)]
pub struct ActiveCount {
    count: Mutex<usize>,
    condvar: Condvar,
}

impl ActiveCount {
    pub fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            condvar: Condvar::new(),
        }
    }

    pub fn get(&self) -> usize {
        *lock(&self.count)
    }

    /// Marks one task finished and returns how many remain.
    pub fn done(&self) -> usize {
        let mut count = lock(&self.count);
        *count = count.saturating_sub(1);
        let remaining = *count;
        drop(count);
        if remaining == 0 {
            self.condvar.notify_all();
        }
        remaining
    }

    /// Blocks until every task has finished.
    pub fn wait_zero(&self) {
        let mut count = lock(&self.count);
        while *count != 0 {
            count = self
                .condvar
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

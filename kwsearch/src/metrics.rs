use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Counters shared by the tasks of one handler
#[derive(Debug, Clone, Default)]
pub struct HandlerMetrics {
    files_scanned: Arc<AtomicU64>,
    lines_scanned: Arc<AtomicU64>,
    matches_found: Arc<AtomicU64>,
    items_buffered: Arc<AtomicU64>,
    sentinels_received: Arc<AtomicU64>,
    lines_written: Arc<AtomicU64>,
}

impl HandlerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a finished file scan
    pub fn record_file(&self, lines: u64, matches: u64) {
        self.files_scanned.fetch_add(1, Ordering::Relaxed);
        self.lines_scanned.fetch_add(lines, Ordering::Relaxed);
        self.matches_found.fetch_add(matches, Ordering::Relaxed);
    }

    /// Records an item entering the buffer, sentinels included
    pub fn record_buffered(&self) {
        self.items_buffered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sentinel(&self) {
        self.sentinels_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.lines_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> HandlerStats {
        HandlerStats {
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            lines_scanned: self.lines_scanned.load(Ordering::Relaxed),
            matches_found: self.matches_found.load(Ordering::Relaxed),
            items_buffered: self.items_buffered.load(Ordering::Relaxed),
            sentinels_received: self.sentinels_received.load(Ordering::Relaxed),
            lines_written: self.lines_written.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Handler stats: {} files, {} lines scanned, {} matches, {} items buffered, \
             {} sentinels, {} lines written",
            stats.files_scanned,
            stats.lines_scanned,
            stats.matches_found,
            stats.items_buffered,
            stats.sentinels_received,
            stats.lines_written
        );
    }
}

/// Snapshot of [`HandlerMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerStats {
    pub files_scanned: u64,
    pub lines_scanned: u64,
    pub matches_found: u64,
    pub items_buffered: u64,
    pub sentinels_received: u64,
    pub lines_written: u64,
}

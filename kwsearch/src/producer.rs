use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::errors::{KwError, KwResult};
use crate::queue::{QueueOptions, RecordSink, SharedQueue};
use crate::request::MAX_RECORD_LEN;

/// What a client submitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitSummary {
    pub enqueued: u64,
    /// Blank lines, lines that are not UTF-8 and lines too long for a slot
    pub skipped: u64,
}

/// Enqueues each line of `reader` as one record, without its line ending.
///
/// Blocks whenever the queue is full. Lines that cannot be queued (blank, not
/// UTF-8, or too long for a slot) are logged and skipped; any other queue
/// failure stops the submission.
pub fn submit_lines<R, Q>(mut reader: R, queue: &mut Q) -> KwResult<SubmitSummary>
where
    R: BufRead,
    Q: RecordSink + ?Sized,
{
    let mut summary = SubmitSummary::default();
    let mut raw = Vec::with_capacity(MAX_RECORD_LEN);
    let mut number = 0usize;

    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw)? == 0 {
            break;
        }
        number += 1;

        let bytes = raw.strip_suffix(b"\n").unwrap_or(&raw[..]);
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        let record = match std::str::from_utf8(bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping line {}: not valid UTF-8 ({})", number, e);
                summary.skipped += 1;
                continue;
            }
        };
        if record.trim().is_empty() {
            summary.skipped += 1;
            continue;
        }

        match queue.enqueue(record) {
            Ok(()) => {
                debug!("Queued line {}: {:?}", number, record);
                summary.enqueued += 1;
            }
            Err(e @ KwError::RecordTooLong { .. }) => {
                warn!("Skipping line {}: {}", number, e);
                summary.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(summary)
}

/// Attaches to a running server's queue and submits every line of `input`.
pub fn run_client(config: &ServiceConfig, input: &Path) -> KwResult<SubmitSummary> {
    let file = File::open(input)?;
    let mut queue = SharedQueue::attach(&QueueOptions::from(config))?;
    let summary = submit_lines(BufReader::new(file), &mut queue)?;
    info!(
        "Submitted {} requests from {} ({} lines skipped)",
        summary.enqueued,
        input.display(),
        summary.skipped
    );
    Ok(summary)
}

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::handler::HandlerContext;
use super::matcher::KeywordMatcher;
use crate::config::EncodingMode;
use crate::errors::{KwError, KwResult};
use crate::results::{Item, Match};

const BUFFER_CAPACITY: usize = 65536;

/// Decodes one raw line according to the encoding mode
fn decode_line(bytes: &[u8], path: &Path, encoding_mode: EncodingMode) -> KwResult<String> {
    match encoding_mode {
        EncodingMode::FailFast => String::from_utf8(bytes.to_vec())
            .map_err(|e| KwError::encoding_error(path, e)),
        EncodingMode::Lossy => {
            let cow = String::from_utf8_lossy(bytes);
            if let std::borrow::Cow::Owned(_) = cow {
                warn!("Invalid UTF-8 replaced in file: {}", path.display());
            }
            Ok(cow.into_owned())
        }
    }
}

/// Strips `\n` or `\r\n`
fn trim_line_end(mut bytes: &[u8]) -> &[u8] {
    if let Some(rest) = bytes.strip_suffix(b"\n") {
        bytes = rest;
        if let Some(rest) = bytes.strip_suffix(b"\r") {
            bytes = rest;
        }
    }
    bytes
}

/// Counts from one file scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub lines: u64,
    pub matches: u64,
}

/// Scans single files line by line for a keyword
#[derive(Debug, Clone)]
pub struct FileProcessor {
    matcher: KeywordMatcher,
    encoding_mode: EncodingMode,
}

impl FileProcessor {
    pub fn new(matcher: KeywordMatcher, encoding_mode: EncodingMode) -> Self {
        Self {
            matcher,
            encoding_mode,
        }
    }

    /// Calls `emit` for every matching line of `path`.
    ///
    /// A read or decode error ends the scan early; the lines already seen
    /// keep their matches.
    pub fn process_file<F>(&self, path: &Path, filename: &Arc<str>, mut emit: F) -> ScanOutcome
    where
        F: FnMut(Match),
    {
        trace!("Processing file: {}", path.display());
        let mut outcome = ScanOutcome::default();

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!("Failed to open {}: {}", path.display(), e);
                return outcome;
            }
        };

        let mut reader = BufReader::with_capacity(BUFFER_CAPACITY, file);
        let mut raw = Vec::with_capacity(256);
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Read error in {}, stopping: {}", path.display(), e);
                    break;
                }
            }
            outcome.lines += 1;

            let line = match decode_line(trim_line_end(&raw), path, self.encoding_mode) {
                Ok(line) => line,
                Err(e) => {
                    warn!("{}, stopping", e);
                    break;
                }
            };

            if let Some((start, end)) = self.matcher.find_first(&line) {
                outcome.matches += 1;
                emit(Match {
                    filename: Arc::clone(filename),
                    line_number: outcome.lines as usize,
                    line_content: line,
                    start,
                    end,
                });
            }
        }

        outcome
    }
}

/// Body of a worker task: scan one file into the buffer, then send the sentinel.
pub fn run_worker(ctx: Arc<HandlerContext>, path: &Path) {
    let filename: Arc<str> = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_else(|| path.to_string_lossy())
        .into();

    let outcome = ctx.processor.process_file(path, &filename, |m| {
        ctx.buffer.put(Item::Match(m));
        ctx.metrics.record_buffered();
    });
    ctx.metrics.record_file(outcome.lines, outcome.matches);

    ctx.buffer.put(Item::Done);
    ctx.metrics.record_buffered();
    debug!(
        "Worker for {} finished: {} lines, {} matches",
        filename, outcome.lines, outcome.matches
    );
}

//! Records passed from workers to the printer.
//!
//! A worker produces one [`Item::Match`] per matching line and finishes with
//! exactly one [`Item::Done`]. The printer counts `Done` items to learn when
//! every worker has finished.

use std::fmt;
use std::sync::Arc;

/// A single keyword hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Name of the file within the searched directory
    pub filename: Arc<str>,
    /// 1-based line number
    pub line_number: usize,
    /// The line, without its line terminator
    pub line_content: String,
    /// Byte offset of the keyword within the line
    pub start: usize,
    /// Byte offset just past the keyword
    pub end: usize,
}

impl Match {
    /// Formats the record written to the output sink, newline included
    pub fn to_output_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.filename, self.line_number, self.line_content
        )
    }
}

/// Entry in a handler's item buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Match(Match),
    /// The producing worker has finished
    Done,
}

/// What one handler did for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerSummary {
    /// Workers started, one per regular file
    pub workers: usize,
    /// Sentinels the printer consumed
    pub sentinels: u64,
    /// Match lines written to the sink
    pub lines_written: u64,
}

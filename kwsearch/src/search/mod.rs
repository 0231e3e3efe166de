//! Per-request search pipeline.
//!
//! A [`Handler`] serves one request by starting a worker thread per regular
//! file in the requested directory plus a single printer thread. Workers push
//! [`Item`](crate::results::Item)s into a bounded [`ItemBuffer`]; the printer
//! drains it into the shared output sink until every worker's sentinel has
//! been seen.

pub mod buffer;
pub mod handler;
pub mod matcher;
pub mod printer;
pub mod processor;

pub use buffer::ItemBuffer;
pub use handler::{list_regular_files, run_handler_process, Handler, HandlerContext};
pub use matcher::KeywordMatcher;
pub use printer::run_printer;
pub use processor::{run_worker, FileProcessor, ScanOutcome};

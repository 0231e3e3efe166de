use ignore::WalkBuilder;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use super::buffer::ItemBuffer;
use super::matcher::KeywordMatcher;
use super::printer::run_printer;
use super::processor::{run_worker, FileProcessor};
use crate::config::{EncodingMode, ServiceConfig};
use crate::errors::{KwError, KwResult};
use crate::metrics::HandlerMetrics;
use crate::request::Request;
use crate::results::{HandlerSummary, Item};
use crate::sink::{OutputSink, SerializedWriter};
use crate::sync::ActiveCount;

/// State shared by the worker and printer tasks of one request
pub struct HandlerContext {
    pub processor: FileProcessor,
    pub buffer: ItemBuffer,
    pub active: ActiveCount,
    pub sink: Arc<dyn SerializedWriter>,
    pub metrics: HandlerMetrics,
}

/// Serves one request at a time: fans out a worker per file plus a printer
#[derive(Clone)]
pub struct Handler {
    buffer_capacity: NonZeroUsize,
    encoding_mode: EncodingMode,
    sink: Arc<dyn SerializedWriter>,
}

impl Handler {
    pub fn new(
        buffer_capacity: NonZeroUsize,
        encoding_mode: EncodingMode,
        sink: Arc<dyn SerializedWriter>,
    ) -> Self {
        Self {
            buffer_capacity,
            encoding_mode,
            sink,
        }
    }

    /// Parses and serves a dequeued record
    pub fn handle_record(&self, record: &str) -> KwResult<HandlerSummary> {
        let request = Request::parse(record)?;
        self.handle(&request)
    }

    /// Scans the immediate regular files of the request's directory.
    ///
    /// A directory that cannot be read yields no workers; the printer still
    /// runs and exits without writing.
    pub fn handle(&self, request: &Request) -> KwResult<HandlerSummary> {
        info!(
            "Handling {:?} in {}",
            request.keyword,
            request.directory.display()
        );

        let files = list_regular_files(request.directory());
        let workers = files.len();
        debug!("Found {} files to process", workers);

        let ctx = Arc::new(HandlerContext {
            processor: FileProcessor::new(
                KeywordMatcher::new(request.keyword.clone()),
                self.encoding_mode,
            ),
            buffer: ItemBuffer::new(self.buffer_capacity),
            active: ActiveCount::new(workers + 1),
            sink: Arc::clone(&self.sink),
            metrics: HandlerMetrics::new(),
        });

        // The printer starts first so a worker that fails to start can be
        // accounted for with a sentinel without filling the buffer for good.
        let printer = {
            let ctx = Arc::clone(&ctx);
            thread::Builder::new()
                .name("printer".to_string())
                .spawn(move || run_printer(ctx))
                .map_err(|e| KwError::spawn(format!("printer thread: {}", e)))?
        };

        let mut roster: Vec<JoinHandle<()>> = Vec::with_capacity(workers);
        for path in files {
            let task_ctx = Arc::clone(&ctx);
            let spawned = thread::Builder::new()
                .name(format!("worker-{}", roster.len()))
                .spawn(move || run_worker(task_ctx, &path));
            match spawned {
                Ok(handle) => roster.push(handle),
                Err(e) => {
                    error!("Failed to start worker thread: {}", e);
                    ctx.buffer.put(Item::Done);
                }
            }
        }

        ctx.active.wait_zero();

        for worker in roster {
            if worker.join().is_err() {
                error!("Worker thread panicked");
            }
        }
        let printed = printer
            .join()
            .map_err(|_| KwError::handler("printer thread panicked"))?;

        ctx.metrics.log_stats();
        let stats = ctx.metrics.get_stats();
        printed?;

        Ok(HandlerSummary {
            workers,
            sentinels: stats.sentinels_received,
            lines_written: stats.lines_written,
        })
    }
}

/// Regular files directly inside `dir`, hidden entries skipped, sorted by name
pub fn list_regular_files(dir: &Path) -> Vec<PathBuf> {
    WalkBuilder::new(dir)
        .max_depth(Some(1))
        .hidden(true)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .follow_links(true)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping entry in {}: {}", dir.display(), e);
                None
            }
        })
        .filter(|entry| entry.depth() == 1)
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .map(|entry| entry.into_path())
        .collect()
}

/// Entry point of a handler process: opens the shared sink and serves `record`.
pub fn run_handler_process(record: &str, config: &ServiceConfig) -> KwResult<HandlerSummary> {
    let sink: Arc<dyn SerializedWriter> = Arc::new(OutputSink::open(&config.output_path)?);
    Handler::new(config.buffer_capacity, config.encoding, sink).handle_record(record)
}

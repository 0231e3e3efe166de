use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::ServiceConfig;
use crate::errors::{KwError, KwResult};
use crate::queue::RecordSource;
use crate::request::is_exit_record;
use crate::results::HandlerSummary;
use crate::search::Handler;

/// A running handler the dispatcher can wait for
pub trait HandlerHandle {
    /// Blocks until the handler has finished serving its request.
    fn wait(self) -> KwResult<()>;
}

/// Starts one isolated handler per dequeued record
pub trait HandlerSpawner {
    type Handle: HandlerHandle;

    fn spawn(&mut self, record: &str) -> KwResult<Self::Handle>;
}

/// Serves each request in a child process running the hidden `handle`
/// subcommand of the current binary.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessSpawner {
    /// `args` precede the record, which is always passed last.
    pub fn new<I, A>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Re-executes `program` as `handle ... -- <record>` with the settings a
    /// handler process needs.
    pub fn for_config(program: impl Into<PathBuf>, config: &ServiceConfig) -> Self {
        let args: Vec<OsString> = vec![
            "handle".into(),
            "--buffer-capacity".into(),
            config.buffer_capacity.to_string().into(),
            "--output".into(),
            config.output_path.clone().into_os_string(),
            "--encoding".into(),
            config.encoding.as_str().into(),
            "--log-level".into(),
            config.log_level.clone().into(),
            "--".into(),
        ];
        Self::new(program, args)
    }
}

impl HandlerSpawner for ProcessSpawner {
    type Handle = ProcessHandle;

    fn spawn(&mut self, record: &str) -> KwResult<ProcessHandle> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(record)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| KwError::spawn(format!("{}: {}", self.program.display(), e)))?;
        debug!("Started handler process {} for {:?}", child.id(), record);
        Ok(ProcessHandle {
            child,
            record: record.to_string(),
        })
    }
}

#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    record: String,
}

impl HandlerHandle for ProcessHandle {
    fn wait(mut self) -> KwResult<()> {
        let status = self.child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(KwError::handler(format!("{:?}: {}", self.record, status)))
        }
    }
}

/// Serves each request on a thread of the server process.
///
/// Cheaper than [`ProcessSpawner`], but a handler that aborts the process
/// takes the server and every other in-flight request with it.
#[derive(Clone)]
pub struct ThreadSpawner {
    handler: Handler,
    started: usize,
}

impl ThreadSpawner {
    pub fn new(handler: Handler) -> Self {
        Self {
            handler,
            started: 0,
        }
    }
}

impl HandlerSpawner for ThreadSpawner {
    type Handle = ThreadHandle;

    fn spawn(&mut self, record: &str) -> KwResult<ThreadHandle> {
        let handler = self.handler.clone();
        let job = record.to_string();
        let handle = thread::Builder::new()
            .name(format!("handler-{}", self.started))
            .spawn(move || handler.handle_record(&job))
            .map_err(|e| KwError::spawn(format!("handler thread: {}", e)))?;
        self.started += 1;
        Ok(ThreadHandle {
            handle,
            record: record.to_string(),
        })
    }
}

#[derive(Debug)]
pub struct ThreadHandle {
    handle: JoinHandle<KwResult<HandlerSummary>>,
    record: String,
}

impl HandlerHandle for ThreadHandle {
    fn wait(self) -> KwResult<()> {
        match self.handle.join() {
            Ok(Ok(summary)) => {
                debug!("Handler for {:?} finished: {:?}", self.record, summary);
                Ok(())
            }
            Ok(Err(e)) if e.is_per_job() => {
                warn!("Request {:?} produced no output: {}", self.record, e);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(KwError::handler(format!(
                "{:?}: handler thread panicked",
                self.record
            ))),
        }
    }
}

/// Where the dispatcher is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchState {
    Listen,
    Spawn(String),
    Drain,
    Shutdown,
}

/// What one dispatcher run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Records dequeued, the shutdown record excluded
    pub requests: u64,
    pub spawned: u64,
    /// Handlers that exited unsuccessfully
    pub failed: u64,
}

/// Takes records off the queue and hands each to a new handler until the
/// shutdown record arrives, then waits for every handler in spawn order.
pub struct Dispatcher<S: HandlerSpawner> {
    spawner: S,
    roster: Vec<S::Handle>,
    state: DispatchState,
}

impl<S: HandlerSpawner> Dispatcher<S> {
    pub fn new(spawner: S) -> Self {
        Self {
            spawner,
            roster: Vec::new(),
            state: DispatchState::Listen,
        }
    }

    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    /// Handlers started and not yet waited for
    pub fn in_flight(&self) -> usize {
        self.roster.len()
    }

    /// Runs until the shutdown record has been seen and every handler has
    /// finished. A spawn failure or a queue failure other than a corrupt
    /// record ends the run immediately.
    pub fn run<Q: RecordSource + ?Sized>(&mut self, queue: &mut Q) -> KwResult<DispatchSummary> {
        let mut summary = DispatchSummary::default();

        loop {
            let next = match std::mem::replace(&mut self.state, DispatchState::Shutdown) {
                DispatchState::Listen => match queue.dequeue() {
                    Ok(record) if is_exit_record(&record) => {
                        info!("Shutdown requested, draining {} handlers", self.roster.len());
                        DispatchState::Drain
                    }
                    Ok(record) => {
                        summary.requests += 1;
                        DispatchState::Spawn(record)
                    }
                    Err(KwError::CorruptQueue(msg)) => {
                        warn!("Dropping unreadable record: {}", msg);
                        DispatchState::Listen
                    }
                    Err(e) => return Err(e),
                },
                DispatchState::Spawn(record) => {
                    info!("Dispatching {:?}", record);
                    let handle = self.spawner.spawn(&record).map_err(|e| {
                        error!("Failed to start handler for {:?}: {}", record, e);
                        e
                    })?;
                    self.roster.push(handle);
                    summary.spawned += 1;
                    DispatchState::Listen
                }
                DispatchState::Drain => {
                    for handle in self.roster.drain(..) {
                        if let Err(e) = handle.wait() {
                            error!("{}", e);
                            summary.failed += 1;
                        }
                    }
                    DispatchState::Shutdown
                }
                DispatchState::Shutdown => {
                    self.state = DispatchState::Shutdown;
                    break;
                }
            };
            self.state = next;
        }

        info!(
            "Dispatcher stopped: {} requests, {} handlers, {} failed",
            summary.requests, summary.spawned, summary.failed
        );
        Ok(summary)
    }
}

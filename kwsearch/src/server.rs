use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::{Isolation, ServiceConfig};
use crate::dispatcher::{DispatchSummary, Dispatcher, HandlerSpawner, ProcessSpawner, ThreadSpawner};
use crate::errors::KwResult;
use crate::queue::{QueueOptions, SharedQueue};
use crate::search::Handler;
use crate::sink::{OutputSink, SerializedWriter};

/// Creates the output sink and the request queue, then dispatches requests
/// until the shutdown record arrives.
///
/// The queue's region and semaphores are released when this returns, on
/// success or failure.
pub fn run_server<S: HandlerSpawner>(config: &ServiceConfig, spawner: S) -> KwResult<DispatchSummary> {
    let sink = OutputSink::open(&config.output_path)?;
    info!("Writing matches to {}", sink.path().display());
    drop(sink);

    let mut queue = SharedQueue::create(&QueueOptions::from(config))?;
    Dispatcher::new(spawner).run(&mut queue)
}

/// Runs the server with the isolation mode `config` selects.
///
/// `program` is the executable re-run in `handle` mode when each request
/// gets its own process.
pub fn serve(config: &ServiceConfig, program: impl Into<PathBuf>) -> KwResult<DispatchSummary> {
    match config.isolation {
        Isolation::Process => run_server(config, ProcessSpawner::for_config(program, config)),
        Isolation::Thread => {
            let sink: Arc<dyn SerializedWriter> = Arc::new(OutputSink::open(&config.output_path)?);
            let handler = Handler::new(config.buffer_capacity, config.encoding, sink);
            run_server(config, ThreadSpawner::new(handler))
        }
    }
}

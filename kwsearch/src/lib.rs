pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod producer;
pub mod queue;
pub mod request;
pub mod results;
pub mod search;
pub mod server;
pub mod sink;
pub mod sync;

pub use config::{ConfigOverrides, EncodingMode, Isolation, ServiceConfig};
pub use dispatcher::{
    DispatchState, DispatchSummary, Dispatcher, HandlerHandle, HandlerSpawner, ProcessSpawner,
    ThreadSpawner,
};
pub use errors::{KwError, KwResult};
pub use logging::init_logging;
pub use producer::{run_client, submit_lines, SubmitSummary};
pub use queue::{QueueOptions, RecordSink, RecordSource, SharedQueue};
pub use request::Request;
pub use results::{HandlerSummary, Item, Match};
pub use search::{run_handler_process, Handler};
pub use server::{run_server, serve};
pub use sink::{OutputSink, SerializedWriter};

/// Error types shared by the queue, the dispatcher and the per-request handler.
///
/// Errors fall into three groups:
///
/// 1. **Setup errors** (`SharedMemory`, `Semaphore`, `ConfigError`): raised while the
///    server creates, or a client attaches to, the named resources. Callers treat
///    them as fatal.
/// 2. **Dispatch errors** (`Spawn`): the server could not start a handler. Also fatal.
///    A handler that fails to write its matches (`Output`) fails its job and is
///    counted by the dispatcher.
/// 3. **Per-job errors** (`InvalidRequest`, `IoError`, `EncodingError`): absorbed by the
///    handler, which produces no output for the job instead of failing the server.
///
/// ```rust,ignore
/// match SharedQueue::attach(&config) {
///     Ok(queue) => // enqueue records,
///     Err(KwError::SharedMemory { path, .. }) => // server is not running,
///     Err(e) => // any other setup failure
/// }
/// ```
use std::path::PathBuf;
use thiserror::Error;

/// Result type for kwsearch operations
pub type KwResult<T> = Result<T, KwError>;

/// Errors that can occur while queueing, dispatching or serving a request
#[derive(Error, Debug)]
pub enum KwError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Record of {len} bytes does not fit in a queue slot of {max} bytes")]
    RecordTooLong { len: usize, max: usize },
    #[error("Corrupt queue region: {0}")]
    CorruptQueue(String),
    #[error("Semaphore {name} failed: {source}")]
    Semaphore {
        name: String,
        source: std::io::Error,
    },
    #[error("Shared memory region {path} unavailable: {source}")]
    SharedMemory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to spawn handler: {0}")]
    Spawn(String),
    #[error("Handler exited unsuccessfully: {0}")]
    Handler(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Failed to write output {path}: {source}")]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid UTF-8 in file {path}: {source}")]
    EncodingError {
        path: PathBuf,
        source: std::string::FromUtf8Error,
    },
}

impl KwError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn record_too_long(len: usize, max: usize) -> Self {
        Self::RecordTooLong { len, max }
    }

    pub fn corrupt_queue(msg: impl Into<String>) -> Self {
        Self::CorruptQueue(msg.into())
    }

    /// Captures `errno` for a failed semaphore call.
    pub fn semaphore(name: impl Into<String>) -> Self {
        Self::Semaphore {
            name: name.into(),
            source: std::io::Error::last_os_error(),
        }
    }

    pub fn shared_memory(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SharedMemory {
            path: path.into(),
            source,
        }
    }

    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::Spawn(msg.into())
    }

    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Output {
            path: path.into(),
            source,
        }
    }

    pub fn encoding_error(path: impl Into<PathBuf>, source: std::string::FromUtf8Error) -> Self {
        Self::EncodingError {
            path: path.into(),
            source,
        }
    }

    /// Whether the error belongs to a single job rather than to the service.
    pub fn is_per_job(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_) | Self::IoError(_) | Self::EncodingError { .. }
        )
    }
}

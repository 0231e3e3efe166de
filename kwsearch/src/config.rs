use config::{Config as ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Configuration shared by the server, the client and handler processes.
///
/// # Configuration Locations
///
/// Loaded from, in increasing order of precedence:
/// 1. Global `$HOME/.config/kwsearch/config.yaml`
/// 2. Local `.kwsearch.yaml` in the current directory
/// 3. A file given with `--config`
///
/// Command-line arguments are applied on top with [`ServiceConfig::merge_with_cli`].
///
/// # Configuration Format
///
/// ```yaml
/// # Requests the shared queue can hold
/// queue_capacity: 10
///
/// # Match records each handler buffers between workers and printer
/// buffer_capacity: 4
///
/// # Append-only file receiving "<file>:<line>:<text>" records
/// output_path: "output.txt"
///
/// # Base name of the shared region and its semaphores
/// queue_name: "kwsearch"
/// shm_dir: "/dev/shm"
///
/// # process (one child process per request) or thread
/// isolation: process
///
/// # lossy or failfast handling of invalid UTF-8
/// encoding: lossy
///
/// log_level: "warn"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Number of requests the queue can hold before clients block
    pub queue_capacity: NonZeroUsize,

    /// Number of Items a handler's buffer can hold before workers block
    pub buffer_capacity: NonZeroUsize,

    /// Output sink shared by every handler
    pub output_path: PathBuf,

    /// Base name for the shared region and the named semaphores
    pub queue_name: String,

    /// Directory the shared region is created in
    pub shm_dir: PathBuf,

    /// How each request is isolated from the others
    pub isolation: Isolation,

    /// How invalid UTF-8 in scanned files is handled
    pub encoding: EncodingMode,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Fault domain given to each request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// A child process per request
    #[default]
    Process,
    /// A thread per request inside the server. A crashing handler takes
    /// the server down with it.
    Thread,
}

/// Handling of lines that are not valid UTF-8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Replace invalid sequences and keep scanning
    #[default]
    Lossy,
    /// Stop scanning the file at the first invalid line
    FailFast,
}

impl EncodingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingMode::Lossy => "lossy",
            EncodingMode::FailFast => "failfast",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "lossy" => Some(EncodingMode::Lossy),
            "failfast" => Some(EncodingMode::FailFast),
            _ => None,
        }
    }
}

impl Isolation {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "process" => Some(Isolation::Process),
            "thread" => Some(Isolation::Thread),
            _ => None,
        }
    }
}

/// Values given on the command line; `None` leaves the file value alone
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub queue_capacity: Option<NonZeroUsize>,
    pub buffer_capacity: Option<NonZeroUsize>,
    pub output_path: Option<PathBuf>,
    pub queue_name: Option<String>,
    pub shm_dir: Option<PathBuf>,
    pub isolation: Option<Isolation>,
    pub encoding: Option<EncodingMode>,
    pub log_level: Option<String>,
}

fn default_queue_capacity() -> NonZeroUsize {
    NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN)
}

fn default_buffer_capacity() -> NonZeroUsize {
    NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            buffer_capacity: default_buffer_capacity(),
            output_path: PathBuf::from("output.txt"),
            queue_name: "kwsearch".to_string(),
            shm_dir: PathBuf::from("/dev/shm"),
            isolation: Isolation::default(),
            encoding: EncodingMode::default(),
            log_level: "warn".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("kwsearch/config.yaml")),
            Some(PathBuf::from(".kwsearch.yaml")),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // An explicit file must exist.
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder.build()?.try_deserialize()
    }

    /// Applies command-line values over configuration file values
    pub fn merge_with_cli(mut self, cli: ConfigOverrides) -> Self {
        if let Some(capacity) = cli.queue_capacity {
            self.queue_capacity = capacity;
        }
        if let Some(capacity) = cli.buffer_capacity {
            self.buffer_capacity = capacity;
        }
        if let Some(path) = cli.output_path {
            self.output_path = path;
        }
        if let Some(name) = cli.queue_name {
            self.queue_name = name;
        }
        if let Some(dir) = cli.shm_dir {
            self.shm_dir = dir;
        }
        if let Some(isolation) = cli.isolation {
            self.isolation = isolation;
        }
        if let Some(encoding) = cli.encoding {
            self.encoding = encoding;
        }
        if let Some(level) = cli.log_level {
            self.log_level = level;
        }
        self
    }
}

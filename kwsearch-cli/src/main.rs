use clap::{Args, Parser, Subcommand};
use kwsearch::{
    config::{ConfigOverrides, EncodingMode, Isolation, ServiceConfig},
    init_logging, run_client, run_handler_process, serve, KwError,
};
use std::{num::NonZeroUsize, path::PathBuf};
use tracing::{debug, warn};

type Result<T> = std::result::Result<T, KwError>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options locating the shared request queue
#[derive(Args)]
struct QueueArgs {
    /// Configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base name of the shared region and its semaphores
    #[arg(long)]
    queue_name: Option<String>,

    /// Directory holding the shared region
    #[arg(long)]
    shm_dir: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the request queue and serve requests until "exit" is received
    Server {
        /// Number of requests the queue holds
        queue_capacity: NonZeroUsize,

        /// Number of matches each handler buffers
        buffer_capacity: NonZeroUsize,

        /// Output file receiving every match
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// How each request is isolated (process|thread)
        #[arg(long)]
        isolation: Option<String>,

        /// How to handle invalid UTF-8 sequences (lossy|failfast)
        #[arg(long)]
        encoding: Option<String>,

        #[command(flatten)]
        queue: QueueArgs,
    },

    /// Submit every line of a file as a request
    Client {
        /// Number of requests the server's queue holds
        queue_capacity: NonZeroUsize,

        /// File with one "<directory> <keyword>" request per line
        input: PathBuf,

        #[command(flatten)]
        queue: QueueArgs,
    },

    /// Serve a single request (started by the server)
    #[command(hide = true)]
    Handle {
        #[arg(long)]
        buffer_capacity: NonZeroUsize,

        #[arg(long)]
        output: PathBuf,

        #[arg(long, default_value = "lossy")]
        encoding: String,

        #[arg(long, default_value = "warn")]
        log_level: String,

        /// The dequeued record
        record: String,
    },
}

fn main() -> Result<()> {
    run()
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            queue_capacity,
            buffer_capacity,
            output,
            isolation,
            encoding,
            queue,
        } => {
            let isolation = isolation.as_deref().map(parse_isolation).transpose()?;
            let encoding = encoding.as_deref().map(parse_encoding).transpose()?;
            let config = load_config(
                &queue,
                ConfigOverrides {
                    queue_capacity: Some(queue_capacity),
                    buffer_capacity: Some(buffer_capacity),
                    output_path: output,
                    isolation,
                    encoding,
                    ..ConfigOverrides::default()
                },
            )?;

            let program = std::env::current_exe()?;
            let summary = serve(&config, program)?;
            println!(
                "Served {} requests ({} handlers failed)",
                summary.spawned, summary.failed
            );
            Ok(())
        }
        Commands::Client {
            queue_capacity,
            input,
            queue,
        } => {
            let config = load_config(
                &queue,
                ConfigOverrides {
                    queue_capacity: Some(queue_capacity),
                    ..ConfigOverrides::default()
                },
            )?;

            let summary = run_client(&config, &input)?;
            println!(
                "Queued {} requests ({} lines skipped)",
                summary.enqueued, summary.skipped
            );
            Ok(())
        }
        Commands::Handle {
            buffer_capacity,
            output,
            encoding,
            log_level,
            record,
        } => {
            init_logging(&log_level);
            let config = ServiceConfig {
                buffer_capacity,
                output_path: output,
                encoding: parse_encoding(&encoding)?,
                log_level,
                ..ServiceConfig::default()
            };

            match run_handler_process(&record, &config) {
                Ok(summary) => {
                    debug!("Handled {:?}: {:?}", record, summary);
                    Ok(())
                }
                Err(e) if e.is_per_job() => {
                    warn!("Request {:?} produced no output: {}", record, e);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
    }
}

/// Loads the configuration files, applies the command line on top and
/// starts logging at the resulting level.
fn load_config(queue: &QueueArgs, overrides: ConfigOverrides) -> Result<ServiceConfig> {
    let config = ServiceConfig::load_from(queue.config.as_deref())
        .map_err(|e| KwError::config_error(e.to_string()))?
        .merge_with_cli(ConfigOverrides {
            queue_name: queue.queue_name.clone(),
            shm_dir: queue.shm_dir.clone(),
            log_level: queue.log_level.clone(),
            ..overrides
        });

    init_logging(&config.log_level);
    debug!("Effective configuration: {:?}", config);
    Ok(config)
}

fn parse_isolation(value: &str) -> Result<Isolation> {
    Isolation::parse(value).ok_or_else(|| {
        KwError::config_error(format!(
            "Unknown isolation mode '{}' (expected process or thread)",
            value
        ))
    })
}

fn parse_encoding(value: &str) -> Result<EncodingMode> {
    EncodingMode::parse(value).ok_or_else(|| {
        KwError::config_error(format!(
            "Unknown encoding mode '{}' (expected lossy or failfast)",
            value
        ))
    })
}

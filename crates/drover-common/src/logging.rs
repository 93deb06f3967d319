//! ---
//! drover_section: "01-execution-core"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Tracing subscriber setup for drover processes."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

const LOG_ENV: &str = "DROVER_LOG";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Available log formats for drover processes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Logging options supplied by the embedding process.
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    pub directory: PathBuf,
    pub format: LogFormat,
    pub file_prefix: Option<String>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("target/logs"),
            format: LogFormat::default(),
            file_prefix: None,
        }
    }
}

/// Initialize the tracing subscriber based on options and environment variables.
///
/// * `DROVER_LOG` can be set to override the log filter (e.g. `info`,
///   `debug,drover_rate=trace`). When unset the standard `RUST_LOG` variable
///   is honoured, finally defaulting to `info`.
/// * Structured JSON is emitted to stdout by default, while a rolling daily
///   log file is created for post-mortem analysis of long soak runs.
pub fn init_tracing(service_name: &str, options: &LoggingOptions) -> Result<()> {
    std::fs::create_dir_all(&options.directory)?;
    let prefix = options
        .file_prefix
        .clone()
        .unwrap_or_else(|| service_name.to_owned());

    let file_appender = daily(&options.directory, format!("{}.log", prefix));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);

    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!(
                "invalid {} directive ({}); defaulting to info logging",
                LOG_ENV, err
            );
            EnvFilter::new("info")
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let fmt_layer = match options.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_writer(stdout_writer)
            .boxed(),
    };

    let file_layer = fmt::layer()
        .with_target(true)
        .json()
        .with_writer(file_writer)
        .boxed();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(service = %service_name, log_dir = %options.directory.display(), format = ?options.format, "tracing initialised");
    Ok(())
}

//! Utilities for logging, error reporting and viewing the application logs.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use axum::{
    extract,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use eyre::Context;
use futures::{Stream, TryStreamExt};
use html_builder::Html5;
use reqwest::StatusCode;
use tokio_stream::wrappers::ReadDirStream;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt};

use crate::fs;

const LOG_FILE_PREFIX: &str = "jma-chart.log";
const DEFAULT_LOG_FILTER: &str = "warn,jma_chart=debug,chart_listing=debug";

/// Options for logging and reporting.
pub struct Options {
    /// Directory where application data is stored, logs are written to `log` inside it.
    pub data_dir: PathBuf,
    /// How often to rotate the log files.
    pub log_rotation: Rotation,
}

impl Options {
    /// Directory containing the log files.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("log")
    }
}

/// Keeps logging and reporting running, flushes the logs when dropped.
pub struct ReportingGuard {
    _sentry: Option<sentry::ClientInitGuard>,
    _stdout: WorkerGuard,
    _log_file: WorkerGuard,
}

/// Install [`color_eyre`] hooks for printing errors and panics.
pub fn setup_error_hooks() -> eyre::Result<()> {
    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::new().into_hooks();
    eyre::set_hook(eyre_hook.into_eyre_hook())?;
    let panic_hook = panic_hook.into_panic_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        panic_hook(panic_info);
    }));
    Ok(())
}

/// Set up `tracing` to write to stdout and a rotating log file, and `sentry.io` reporting if
/// `SENTRY_DSN` is set. The log filter is read from `RUST_LOG`.
pub fn setup_logging(options: &Options) -> eyre::Result<ReportingGuard> {
    let sentry = match std::env::var("SENTRY_DSN") {
        Ok(sentry_dsn) => Some(sentry::init(sentry::ClientOptions {
            dsn: Some(
                sentry_dsn
                    .parse()
                    .wrap_err("Unable to parse SENTRY_DSN environment variable")?,
            ),
            release: sentry::release_name!(),
            traces_sample_rate: 0.2,
            ..sentry::ClientOptions::default()
        })),
        Err(_) => None,
    };

    let log_dir = options.log_dir();
    fs::create_dir_if_not_exists(&log_dir).wrap_err("Unable to create log file directory")?;
    let appender = RollingFileAppender::new(options.log_rotation.clone(), log_dir, LOG_FILE_PREFIX);

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let (log_file_writer, log_file_guard) = tracing_appender::non_blocking(appender);

    let rust_log_env: String =
        std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(stdout_writer))
        .with(tracing_subscriber::fmt::layer().with_writer(log_file_writer))
        .with(tracing_subscriber::EnvFilter::from_str(rust_log_env.as_str()).unwrap_or_default())
        .with(tracing_error::ErrorLayer::default())
        .with(sentry.as_ref().map(|_| sentry_tracing::layer()))
        .try_init()
        .wrap_err("Unable to initialize tracing subscriber")?;

    if sentry.is_some() {
        tracing::info!("sentry.io reporting is enabled");
    }

    Ok(ReportingGuard {
        _sentry: sentry,
        _stdout: stdout_guard,
        _log_file: log_file_guard,
    })
}

/// Routes for browsing the log files in `log_dir`, to be nested under `/logs`.
pub fn serve_logs(log_dir: PathBuf) -> Router {
    let log_dir = Arc::new(log_dir);
    let index_dir = log_dir.clone();
    Router::new()
        .route(
            "/",
            get(move || async move {
                match serve_logs_index(&index_dir).await {
                    Ok(html) => Ok(html),
                    Err(error) => {
                        tracing::error!("{:?}", error);
                        Err(StatusCode::INTERNAL_SERVER_ERROR)
                    }
                }
            }),
        )
        .route(
            "/:filename",
            get(move |filename| async move { serve_log(filename, &log_dir).await }),
        )
}

#[derive(Debug, thiserror::Error)]
enum ServeLogError {
    #[error("Log file not found")]
    NotFound,
    #[error("Internal server error")]
    InternalServerError(#[from] eyre::Error),
}

impl IntoResponse for ServeLogError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ServeLogError::NotFound => StatusCode::NOT_FOUND.into_response(),
            ServeLogError::InternalServerError(error) => {
                tracing::error!("{:?}", error);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", error)).into_response()
            }
        }
    }
}

async fn serve_log(
    extract::Path(filename): extract::Path<String>,
    log_dir: &Path,
) -> Result<Html<String>, ServeLogError> {
    use std::fmt::Write;
    let find_file = files_stream(log_dir)
        .await
        .wrap_err("Error creating files stream in log directory")?
        .try_filter(|path| {
            futures::future::ready(
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map_or(false, |name| name == filename),
            )
        });
    futures::pin_mut!(find_file);

    let file_path = find_file
        .try_next()
        .await
        .wrap_err("Error finding log file")?
        .ok_or(ServeLogError::NotFound)?;

    let log_file_contents = tokio::fs::read_to_string(file_path)
        .await
        .wrap_err("Error reading log file")?;

    let formatted_html = tokio::task::spawn_blocking(move || {
        log_file_contents
            .lines()
            .map(|line| {
                let mut formatted_line = ansi_to_html::convert_escaped(line)?;
                formatted_line.push_str("<br>");
                Ok(formatted_line)
            })
            .collect::<Result<String, ansi_to_html::Error>>()
    })
    .await
    .map_err(eyre::Error::from)?
    .wrap_err("Error converting log file to html")?;

    let mut buf = html_builder::Buffer::new();
    let mut html = buf.html();
    let mut head = html.head();
    write!(head.title(), "log {}", filename).map_err(eyre::Error::from)?;
    write!(head.style(), "body {{ font-family: monospace; }}").map_err(eyre::Error::from)?;
    write!(html.body(), "{}", formatted_html).map_err(eyre::Error::from)?;

    Ok(Html::from(buf.finish()))
}

async fn files_stream(
    log_dir: &Path,
) -> tokio::io::Result<impl Stream<Item = tokio::io::Result<PathBuf>>> {
    Ok(
        ReadDirStream::new(tokio::fs::read_dir(log_dir).await?).try_filter_map(
            |entry| async move {
                let file_type = entry.file_type().await?;
                Ok(if file_type.is_file() {
                    Some(entry.path())
                } else {
                    None
                })
            },
        ),
    )
}

async fn serve_logs_index(log_dir: &Path) -> eyre::Result<Html<String>> {
    use std::fmt::Write;
    let files_stream = files_stream(log_dir).await?;
    futures::pin_mut!(files_stream);

    let mut filenames = Vec::new();
    while let Some(path) = files_stream.try_next().await? {
        let filename = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("Expected path to have a filename"))?
            .to_str()
            .ok_or_else(|| eyre::eyre!("Unable to convert filename to utf-8 string"))?
            .to_owned();
        filenames.push(filename);
    }
    // Newest rotation first.
    filenames.sort_unstable_by(|a, b| b.cmp(a));

    let mut buf = html_builder::Buffer::new();
    let mut html = buf.html();
    write!(html.head().title(), "jma-chart logs")?;
    let mut body = html.body();
    let mut ul = body.ul();
    for filename in filenames {
        let href_attr = format!(r#"href="/logs/{}""#, filename);
        write!(ul.li().a().attr(&href_attr), "{}", filename)?;
    }

    Ok(Html::from(buf.finish()))
}

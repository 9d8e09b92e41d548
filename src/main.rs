use std::sync::Arc;

use eyre::Context;
use jma_chart::{
    catalog::ChartTypeCatalog,
    fs, listing_service,
    options::Options,
    pagination::{PageParams, PaginationController},
    reporting,
    secrets::Secrets,
    serve_http::{self, AppState, TableOptions},
};
use tokio::{signal::unix::SignalKind, sync::broadcast};
use tracing_appender::rolling::Rotation;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    reporting::setup_error_hooks()?;
    let options = Options::initialize().await?;

    fs::create_dir_if_not_exists(&options.data_dir)
        .wrap_err_with(|| format!("Unable to create data directory {:?}", options.data_dir))?;

    let reporting_options = reporting::Options {
        data_dir: options.data_dir.clone(),
        log_rotation: Rotation::DAILY,
    };
    let _reporting_guard = reporting::setup_logging(&reporting_options)?;

    fs::create_dir_if_not_exists(&options.secrets_dir).wrap_err_with(|| {
        format!(
            "Unable to create secrets directory {:?}",
            options.secrets_dir
        )
    })?;
    let secrets = Secrets::initialize(&options.secrets_dir)
        .await
        .wrap_err("Error while initializing secrets")?;

    let http_client = reqwest::Client::builder()
        .timeout(options.request_timeout)
        .build()
        .wrap_err("Unable to build http client")?;

    let catalog = ChartTypeCatalog::jma();
    let listing = Arc::new(listing_service::Gateway::new(
        http_client,
        options.api_url.clone(),
    ));
    let controller = Arc::new(PaginationController::new(
        listing,
        catalog,
        PageParams::new(options.page_size, 0)?,
    ));

    tracing::info!("Loading chart listing from {}", options.api_url);
    let startup_controller = controller.clone();
    tokio::spawn(async move {
        startup_controller.start().await;
    });

    let (shutdown_tx, serve_http_shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        let mut sigterm = match tokio::signal::unix::signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(error) => {
                tracing::error!("Unable to create SIGTERM signal listener: {:?}", error);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("ctrl-c or SIGINT event detected, broadcasting shutdown");
            }
            _ = sigterm.recv() => {
                tracing::warn!("SIGTERM signal detected, broadcasting shutdown");
            }
        }
        if shutdown_tx.send(()).is_err() {
            tracing::error!("Failed to send shutdown broadcast");
        }
    });

    let state = AppState {
        controller,
        catalog,
        table: Arc::new(TableOptions {
            row_count: options.row_count,
            page_size_options: options.page_size_options.clone(),
            timezone: options.timezone,
        }),
    };
    let serve_http_options = serve_http::Options {
        listen_address: options.listen_address,
        log_dir: reporting_options.log_dir(),
        admin_password_hash: secrets.admin_password_hash,
    };

    serve_http::serve_http(serve_http_shutdown_rx, state, serve_http_options).await
}

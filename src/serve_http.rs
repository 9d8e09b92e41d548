use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, Request, Response, StatusCode},
    response::{Html, IntoResponse, Redirect},
    routing::get,
    Json, Router,
};
use eyre::Context;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::{
    auth::{AuthorizeRequest, RequireAuthorizationLayer},
    trace::TraceLayer,
};

use crate::{
    catalog::{ChartTypeCatalog, ChartTypeEntry},
    pagination::{PageParams, PaginationController},
    presenter::{self, Field, PageContext, PresenterError, SortDirection, SortOrder},
    rows::DisplayRow,
};

/// Options for running this application's http server.
pub struct Options {
    /// Address to listen on.
    pub listen_address: SocketAddr,
    /// Directory containing the log files.
    pub log_dir: PathBuf,
    /// `admin` user's password hash using `bcrypt`. Logs are only served when this is set.
    /// See [`AdminBasicAuth`].
    pub admin_password_hash: Option<SecretString>,
}

/// Settings for presenting the chart table.
pub struct TableOptions {
    /// Total number of rows reported to the pagination control.
    pub row_count: u64,
    /// Page sizes the user can choose from.
    pub page_size_options: Vec<u32>,
    /// Time zone for displaying timestamps.
    pub timezone: chrono_tz::Tz,
}

/// State shared by the request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Owner of the table's pagination state.
    pub controller: Arc<PaginationController>,
    /// Catalog used for `/api/chart-types`.
    pub catalog: &'static ChartTypeCatalog,
    /// Settings for presenting the chart table.
    pub table: Arc<TableOptions>,
}

/// Run this service's http server until a shutdown is broadcast.
#[tracing::instrument(skip_all)]
pub async fn serve_http(
    mut shutdown_rx: broadcast::Receiver<()>,
    state: AppState,
    options: Options,
) -> eyre::Result<()> {
    let mut app = router(state);

    if let Some(admin_password_hash) = options.admin_password_hash {
        tracing::info!("Serving logs at http://{}/logs", options.listen_address);
        app = app.nest(
            "/logs",
            logs_router(options.log_dir, Arc::new(admin_password_hash)),
        );
    } else {
        tracing::info!("No admin password secret provided, logs will not be served");
    }

    tracing::info!("Serving chart table at http://{}/", options.listen_address);
    axum::Server::try_bind(&options.listen_address)
        .wrap_err_with(|| format!("Unable to bind to {}", options.listen_address))?
        .serve(app.layer(TraceLayer::new_for_http()).into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(error) = shutdown_rx.recv().await {
                tracing::error!("Error receiving shutdown message: {:?}", error);
            }
            tracing::debug!("Received shutdown broadcast");
        })
        .await
        .wrap_err("Error running http server")
}

/// Routes for the chart table and its json api.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_table))
        .route("/refresh", get(get_refresh))
        .route("/api/rows", get(get_rows))
        .route("/api/chart-types", get(get_chart_types))
        .with_state(state)
}

/// Log routes from [`crate::reporting::serve_logs()`] behind [`AdminBasicAuth`].
pub fn logs_router(log_dir: PathBuf, admin_password_hash: Arc<SecretString>) -> Router {
    crate::reporting::serve_logs(log_dir).layer(RequireAuthorizationLayer::custom(
        AdminBasicAuth {
            admin_password_hash,
        },
    ))
}

#[derive(Debug, thiserror::Error)]
enum ServeError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Presenter(#[from] PresenterError),
}

impl IntoResponse for ServeError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ServeError::BadRequest(_) | ServeError::Presenter(PresenterError::Unsortable(_)) => {
                tracing::warn!("{}", self);
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            ServeError::Presenter(error) => {
                tracing::error!("{:?}", error);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Query parameters sent by the table's pagination and sorting controls.
#[derive(Debug, Deserialize)]
struct TableQuery {
    page: Option<u32>,
    page_size: Option<u32>,
    sort: Option<Field>,
    #[serde(default)]
    order: SortDirection,
}

impl TableQuery {
    /// The page requested, or `None` if the query doesn't change the page.
    fn page_params(
        &self,
        current: PageParams,
        table: &TableOptions,
    ) -> Result<Option<PageParams>, ServeError> {
        if self.page.is_none() && self.page_size.is_none() {
            return Ok(None);
        }
        let page_size = self.page_size.unwrap_or_else(|| current.page_size());
        if !table.page_size_options.contains(&page_size) {
            return Err(ServeError::BadRequest(format!(
                "page_size must be one of {:?}",
                table.page_size_options
            )));
        }
        let page = self.page.unwrap_or_else(|| {
            if page_size == current.page_size() {
                current.page()
            } else {
                0
            }
        });
        PageParams::new(page_size, page)
            .map(Some)
            .map_err(|error| ServeError::BadRequest(error.to_string()))
    }
}

#[tracing::instrument(skip(state))]
async fn get_table(
    State(state): State<AppState>,
    Query(query): Query<TableQuery>,
) -> Result<Html<String>, ServeError> {
    let current = state.controller.snapshot().await.params;
    if let Some(params) = query.page_params(current, &state.table)? {
        state.controller.set_params(params).await;
    }

    let mut view = state.controller.snapshot().await;
    let sort = query.sort.map(|field| SortOrder {
        field,
        direction: query.order,
    });
    if let Some(sort) = sort {
        presenter::sort_rows(&mut view.rows, sort)?;
    }
    let notices = state.controller.take_notices().await;

    let html = presenter::render_page(&PageContext {
        view: &view,
        row_count: state.table.row_count,
        page_size_options: &state.table.page_size_options,
        timezone: state.table.timezone,
        sort,
        notices: &notices,
    })?;
    Ok(Html(html))
}

/// Refetch the requested page, then redirect to it.
#[tracing::instrument(skip(state))]
async fn get_refresh(
    State(state): State<AppState>,
    Query(query): Query<TableQuery>,
) -> Result<Redirect, ServeError> {
    let current = state.controller.snapshot().await.params;
    match query.page_params(current, &state.table)? {
        Some(params) if params != current => {
            state.controller.set_params(params).await;
        }
        _ => {
            state.controller.refresh().await;
        }
    }

    let params = state.controller.snapshot().await.params;
    let sort = query.sort.map(|field| SortOrder {
        field,
        direction: query.order,
    });
    Ok(Redirect::to(&presenter::page_href(
        params.page(),
        params.page_size(),
        sort,
    )))
}

/// Json snapshot of the table state.
#[derive(Serialize)]
struct RowsResponse {
    page: u32,
    page_size: u32,
    loading: bool,
    row_count: u64,
    rows: Vec<DisplayRow>,
}

async fn get_rows(State(state): State<AppState>) -> Json<RowsResponse> {
    let view = state.controller.snapshot().await;
    Json(RowsResponse {
        page: view.params.page(),
        page_size: view.params.page_size(),
        loading: view.loading,
        row_count: state.table.row_count,
        rows: view.rows,
    })
}

async fn get_chart_types(State(state): State<AppState>) -> Json<&'static [ChartTypeEntry]> {
    Json(state.catalog.entries())
}

/// Basic authentication for accessing logs.
#[derive(Clone)]
pub struct AdminBasicAuth {
    /// `admin` user password hash, hashed using bcrypt.
    pub admin_password_hash: Arc<SecretString>,
}

impl<B> AuthorizeRequest<B> for AdminBasicAuth {
    type ResponseBody = axum::body::BoxBody;

    fn authorize(&mut self, request: &mut Request<B>) -> Result<(), Response<Self::ResponseBody>> {
        if check_auth(request, &self.admin_password_hash) {
            Ok(())
        } else {
            Err((
                StatusCode::UNAUTHORIZED,
                [(
                    header::WWW_AUTHENTICATE,
                    r#"Basic realm="jma-chart logs", charset="UTF-8""#,
                )],
            )
                .into_response())
        }
    }
}

struct BasicCredentials {
    username: String,
    password: SecretString,
}

fn parse_auth_header_credentials(header: &HeaderValue) -> Option<BasicCredentials> {
    let header_str: &str = header.to_str().ok()?;
    let credentials_base64: &str = header_str.strip_prefix("Basic ")?;
    let credentials = String::from_utf8(base64::decode(credentials_base64).ok()?).ok()?;
    let (username, password) = credentials.split_once(':')?;
    Some(BasicCredentials {
        username: username.to_string(),
        password: SecretString::new(password.to_string()),
    })
}

/// Check authorization for a request. Returns `true` if the request is authorized, returns
/// `false` otherwise. Uses Basic http authentication and bcrypt for password hashing.
fn check_auth<B>(request: &Request<B>, admin_password_hash: &SecretString) -> bool {
    let Some(credentials) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(parse_auth_header_credentials)
    else {
        return false;
    };

    let password_match = bcrypt::verify(
        credentials.password.expose_secret(),
        admin_password_hash.expose_secret(),
    )
    .unwrap_or(false);
    credentials.username == "admin" && password_match
}

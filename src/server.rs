use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::{ACCEPT, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::engine::{Engine, SeriesMetadata};
use crate::error::{DataseriesError, Result};
use crate::query::RawQuery;
use crate::store::{Rows, Store};

/// Everything the handlers share.
pub struct AppState {
    pub catalog: Catalog,
    pub store: Store,
}

impl AppState {
    pub fn new(catalog: Catalog, store: Store) -> Self {
        Self { catalog, store }
    }

    /// Every row of a series table.
    pub fn all_rows(&self, series: &str) -> Result<Rows> {
        let series = self.catalog.series(series)?;
        self.store.query(&format!("SELECT * FROM {} ;", series.table_name()))
    }

    /// Compiles a client query against a series and runs it.
    pub fn run_query(&self, series: &str, query: &RawQuery) -> Result<Rows> {
        let series = self.catalog.series(series)?;
        let sql = Engine::new(series).compile(query)?;
        self.store.query(&sql)
    }
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub status: String,
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Vec<Option<String>>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    fn ok(rows: Rows, started: Instant) -> Self {
        Self {
            status: "ok".into(),
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            row_count: Some(rows.rows.len()),
            columns: Some(rows.columns),
            rows: Some(rows.rows),
            error: None,
        }
    }
    fn error(e: &DataseriesError, started: Instant) -> Self {
        Self::failure(e.to_string(), started)
    }
    fn failure(message: String, started: Instant) -> Self {
        Self {
            status: "error".into(),
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            columns: None,
            row_count: None,
            rows: None,
            error: Some(message),
        }
    }
}

/// `?download` asks for the rows as an attachment.
#[derive(Debug, Default, Deserialize)]
pub struct OutputParams {
    pub download: Option<String>,
}

/// How rows go back to the client: CSV when it accepts `text/csv`,
/// JSON otherwise, optionally as a file download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Output {
    pub csv: bool,
    pub download: bool,
}

impl Output {
    pub fn negotiate(headers: &HeaderMap, params: &OutputParams) -> Self {
        let csv = headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|media| media.trim().starts_with("text/csv"));
        Self { csv, download: params.download.is_some() }
    }

    /// Renders rows for a series table, headers included.
    pub fn render(self, table: &str, rows: Rows, started: Instant) -> Response {
        let (mut response, extension) = if self.csv {
            (([(CONTENT_TYPE, "text/csv; charset=utf-8")], rows.to_csv()).into_response(), "csv")
        } else {
            (Json(QueryResponse::ok(rows, started)).into_response(), "json")
        };
        if self.download {
            if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{table}.{extension}\"")) {
                response.headers_mut().insert(CONTENT_DISPOSITION, value);
            }
        }
        response
    }
}

/// HTTP status for an error: rejected queries are the client's fault, unknown
/// names are missing resources, anything else is ours.
pub fn status_of(e: &DataseriesError) -> StatusCode {
    match e {
        e if e.is_rejection() => StatusCode::BAD_REQUEST,
        DataseriesError::UnknownSeries(_)
        | DataseriesError::UnknownGroup(_)
        | DataseriesError::UnknownCategory(_)
        | DataseriesError::UnknownKey(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for DataseriesError {
    fn into_response(self) -> Response {
        let status = status_of(&self);
        (status, Json(json!({ "status": "error", "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    Router::new()
        .route("/dataseries/values", get(series_names))
        .route("/dataseries/:series", get(series_rows))
        .route("/dataseries/:series/info", get(series_info))
        .route("/dataseries/:series/query", post(series_query))
        .route("/groups/values", get(group_names))
        .route("/groups/:group", get(group))
        .route("/groups/:group/dataseries", get(group_series))
        .route("/groups/:group/keys/:key/values", get(group_key_values))
        .route("/groups/:group/cokeys/:cokey/values", get(group_cokey_values))
        .route("/categories/values", get(category_names))
        .route("/categories/all", get(categories))
        .route("/categories/:category/dataseries", get(category_series))
        .route("/categories/:category/dataseries/:series/groups", get(category_series_groups))
        .route("/columns/values", get(columns))
        .layer(cors)
        .with_state(state)
}

async fn series_names(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "series": state.catalog.series_names() }))
}

async fn series_info(State(state): State<Arc<AppState>>, Path(series): Path<String>) -> Response {
    match state.catalog.series(&series) {
        Ok(s) => Json(s.describe()).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn series_rows(
    State(state): State<Arc<AppState>>,
    Path(series): Path<String>,
    Query(params): Query<OutputParams>,
    headers: HeaderMap,
) -> Response {
    respond(state, series, None, Output::negotiate(&headers, &params)).await
}

async fn series_query(
    State(state): State<Arc<AppState>>,
    Path(series): Path<String>,
    Query(params): Query<OutputParams>,
    headers: HeaderMap,
    body: std::result::Result<Json<RawQuery>, JsonRejection>,
) -> Response {
    let output = Output::negotiate(&headers, &params);
    match body {
        Ok(Json(query)) => respond(state, series, Some(query), output).await,
        Err(rejection) => {
            let message = rejection.body_text();
            warn!(series = %series, error = %message, "malformed query body");
            (StatusCode::BAD_REQUEST, Json(QueryResponse::failure(message, Instant::now()))).into_response()
        }
    }
}

// The store is synchronous, so queries run on a blocking thread.
async fn respond(state: Arc<AppState>, series: String, query: Option<RawQuery>, output: Output) -> Response {
    let started = Instant::now();
    let name = series.clone();
    let result = tokio::task::spawn_blocking(move || -> Result<(String, Rows)> {
        let table = state.catalog.series(&series)?.table_name().to_string();
        let rows = match &query {
            Some(query) => state.run_query(&series, query)?,
            None => state.all_rows(&series)?,
        };
        Ok((table, rows))
    })
    .await;
    let result = match result {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "join error");
            return (StatusCode::INTERNAL_SERVER_ERROR, "join error").into_response();
        }
    };
    match result {
        Ok((table, rows)) => {
            info!(series = %name, rows = rows.rows.len(), csv = output.csv, "query complete");
            output.render(&table, rows, started)
        }
        Err(e) => {
            let status = status_of(&e);
            warn!(series = %name, error = %e, code = status.as_u16(), "query error");
            (status, Json(QueryResponse::error(&e, started))).into_response()
        }
    }
}

async fn group_names(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "groups": state.catalog.group_names() }))
}

async fn group(State(state): State<Arc<AppState>>, Path(group): Path<String>) -> Response {
    match state.catalog.group(&group) {
        Ok(g) => Json(g).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn group_series(State(state): State<Arc<AppState>>, Path(group): Path<String>) -> Response {
    match state.catalog.group(&group) {
        Ok(g) => Json(json!({ "dataseries": g.dataseries })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn group_key_values(
    State(state): State<Arc<AppState>>,
    Path((group, key)): Path<(String, String)>,
) -> Response {
    match state.catalog.group(&group).and_then(|g| g.key_values(&key)) {
        Ok(values) => Json(json!({ "values": values })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn group_cokey_values(
    State(state): State<Arc<AppState>>,
    Path((group, cokey)): Path<(String, String)>,
) -> Response {
    match state.catalog.group(&group).and_then(|g| g.cokey_values(&cokey)) {
        Ok(values) => Json(json!({ "values": values })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn category_names(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "categories": state.catalog.category_names() }))
}

async fn categories(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "categories": state.catalog.categories() }))
}

async fn category_series(State(state): State<Arc<AppState>>, Path(category): Path<String>) -> Response {
    match state.catalog.category(&category) {
        Ok(c) => Json(json!({ "dataseries": c.series_names() })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn category_series_groups(
    State(state): State<Arc<AppState>>,
    Path((category, series)): Path<(String, String)>,
) -> Response {
    match state.catalog.category(&category).and_then(|c| c.series(&series)) {
        Ok(s) => Json(json!({ "groups": s.groups })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn columns(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!(state.catalog.columns_by_label()))
}

/// Binds the configured address and serves until the process ends.
pub async fn serve(state: Arc<AppState>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = bind, "listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// Finance Suite - Web Server
// JSON API over the finance grid core plus the payroll/tariff estimators.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use finance_suite::{
    carryover, cells, coordinator, db::StoreError, payroll, revision, rows, snapshot, tarif,
    CellEdit, CellRecord, RowMeta, RowMetaPatch, DEFAULT_EPOCH_YEAR,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

impl AppState {
    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        // a poisoned lock means a handler panicked; nothing to recover here
        self.db.lock().unwrap()
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn fail(message: String) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message),
        }
    }
}

/// Map store errors onto HTTP statuses: stale writes are conflicts, unknown
/// rows are 404, bad values are unprocessable, the rest is on us.
fn store_error_response(err: StoreError) -> axum::response::Response {
    let status = match &err {
        StoreError::StaleWrite { .. } => StatusCode::CONFLICT,
        StoreError::UnknownRow { .. } => StatusCode::NOT_FOUND,
        StoreError::InvalidValue(_) | StoreError::InvalidInput(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        StoreError::Sql(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("store error: {err}");
    }
    (status, Json(ApiResponse::fail(err.to_string()))).into_response()
}

// ============================================================================
// DTOs
// ============================================================================

#[derive(Deserialize)]
struct CellRequest {
    year: i32,
    row: i64,
    col: u8,
    value: f64,
    revision: i64,
}

#[derive(Deserialize)]
struct EditRequest {
    year: i32,
    cells: Vec<EditCell>,
}

#[derive(Deserialize)]
struct EditCell {
    row: i64,
    col: u8,
    value: f64,
}

#[derive(Deserialize)]
struct RowMetaRequest {
    year: i32,
    row: i64,
    #[serde(default)]
    position: Option<i64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    deleted: Option<bool>,
    #[serde(default)]
    classification: Option<rows::RowClassification>,
}

#[derive(Deserialize)]
struct ReorderRequest {
    year: i32,
    positions: Vec<(i64, i64)>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/finance/:year - Snapshot at the current revision
async fn get_year(State(state): State<AppState>, Path(year): Path<i32>) -> impl IntoResponse {
    let conn = state.conn();
    match cells::latest_snapshot(&conn, year) {
        Ok(snapshot) => Json(ApiResponse::<Vec<CellRecord>>::ok(snapshot)).into_response(),
        Err(err) => store_error_response(err),
    }
}

/// GET /api/finance/:year/rows - Row metadata map
async fn get_rows(State(state): State<AppState>, Path(year): Path<i32>) -> impl IntoResponse {
    let conn = state.conn();
    match rows::row_meta_map(&conn, year) {
        Ok(map) => {
            Json(ApiResponse::<std::collections::BTreeMap<i64, RowMeta>>::ok(map)).into_response()
        }
        Err(err) => store_error_response(err),
    }
}

/// GET /api/finance/:year/leftover - Cross-year seeded running balance
async fn get_leftover(State(state): State<AppState>, Path(year): Path<i32>) -> impl IntoResponse {
    let conn = state.conn();
    match carryover::leftover_series(&conn, year, DEFAULT_EPOCH_YEAR) {
        Ok(series) => Json(ApiResponse::ok(series.to_vec())).into_response(),
        Err(err) => store_error_response(err),
    }
}

/// POST /api/finance/cell - Single cell write at a client-held revision
async fn save_cell(
    State(state): State<AppState>,
    Json(req): Json<CellRequest>,
) -> impl IntoResponse {
    let conn = state.conn();
    match cells::write_cell(&conn, req.year, req.row, req.col, req.value, req.revision) {
        Ok(()) => Json(ApiResponse::ok("OK")).into_response(),
        Err(err) => store_error_response(err),
    }
}

/// POST /api/finance/edit - One logical edit: allocate a revision, write the
/// batch under it
async fn commit_edit(
    State(state): State<AppState>,
    Json(req): Json<EditRequest>,
) -> impl IntoResponse {
    let edits: Vec<CellEdit> = req
        .cells
        .iter()
        .map(|c| CellEdit {
            row: c.row,
            col: c.col,
            value: c.value,
        })
        .collect();

    let conn = state.conn();
    match coordinator::commit_edit(&conn, req.year, &edits) {
        Ok(rev) => {
            info!(year = req.year, revision = rev, cells = edits.len(), "edit committed");
            Json(ApiResponse::ok(rev)).into_response()
        }
        Err(err) => store_error_response(err),
    }
}

/// POST /api/finance/revision/:year/:direction - undo | redo
async fn shift_revision(
    State(state): State<AppState>,
    Path((year, direction)): Path<(i32, String)>,
) -> impl IntoResponse {
    let conn = state.conn();
    let result = match direction.as_str() {
        "undo" => revision::undo(&conn, year),
        "redo" => revision::redo(&conn, year),
        _ => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ApiResponse::fail("direction must be 'undo' or 'redo'".into())),
            )
                .into_response()
        }
    };

    match result.and_then(|rev| {
        finance_suite::log_action(
            &conn,
            &direction,
            serde_json::json!({ "year": year, "revision": rev }),
        )?;
        Ok(rev)
    }) {
        Ok(rev) => Json(ApiResponse::ok(rev)).into_response(),
        Err(err) => store_error_response(err),
    }
}

/// DELETE /api/finance/:year/reset - Destructive reset. Confirmation happens
/// in the client; once this is called the year is gone.
async fn reset_year(State(state): State<AppState>, Path(year): Path<i32>) -> impl IntoResponse {
    let conn = state.conn();
    match cells::reset_year(&conn, year).and_then(|()| {
        finance_suite::log_action(&conn, "reset_year", serde_json::json!({ "year": year }))
    }) {
        Ok(()) => {
            info!(year, "year reset");
            Json(ApiResponse::ok("OK")).into_response()
        }
        Err(err) => store_error_response(err),
    }
}

/// POST /api/finance/row - Upsert row metadata
async fn save_row(
    State(state): State<AppState>,
    Json(req): Json<RowMetaRequest>,
) -> impl IntoResponse {
    let patch = RowMetaPatch {
        position: req.position,
        description: req.description,
        deleted: req.deleted,
        classification: req.classification,
    };

    let conn = state.conn();
    match rows::upsert_row(&conn, req.year, req.row, &patch) {
        Ok(meta) => Json(ApiResponse::ok(meta)).into_response(),
        Err(err) => store_error_response(err),
    }
}

/// POST /api/finance/rows/reorder - Atomic position batch
async fn reorder_rows(
    State(state): State<AppState>,
    Json(req): Json<ReorderRequest>,
) -> impl IntoResponse {
    let conn = state.conn();
    match rows::reorder_rows(&conn, req.year, &req.positions) {
        Ok(()) => Json(ApiResponse::ok("OK")).into_response(),
        Err(err) => store_error_response(err),
    }
}

/// DELETE /api/finance/row/:year/:row - Soft delete
async fn delete_row(
    State(state): State<AppState>,
    Path((year, row)): Path<(i32, i64)>,
) -> impl IntoResponse {
    let conn = state.conn();
    match rows::soft_delete_row(&conn, year, row) {
        Ok(()) => Json(ApiResponse::ok("OK")).into_response(),
        Err(err) => store_error_response(err),
    }
}

/// GET /api/finance/:year/view - Assembled grid (rows joined with metadata)
async fn get_view(State(state): State<AppState>, Path(year): Path<i32>) -> impl IntoResponse {
    let conn = state.conn();
    match snapshot::year_view(&conn, year) {
        Ok(view) => Json(ApiResponse::ok(view)).into_response(),
        Err(err) => store_error_response(err),
    }
}

/// POST /api/payroll/gross-to-net
async fn payroll_gross_to_net(Json(input): Json<payroll::PayrollInput>) -> impl IntoResponse {
    match payroll::gross_to_net(&input) {
        Ok(result) => Json(ApiResponse::ok(result)).into_response(),
        Err(err) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::fail(err.to_string())),
        )
            .into_response(),
    }
}

/// POST /api/tarif/estimate
async fn tarif_estimate(Json(input): Json<tarif::TarifInput>) -> impl IntoResponse {
    match tarif::berechne_nrw_2025(&input) {
        Ok(result) => Json(ApiResponse::ok(result)).into_response(),
        Err(err) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::fail(err.to_string())),
        )
            .into_response(),
    }
}

/// POST /api/tarif/breakdown
async fn tarif_breakdown(Json(input): Json<tarif::TarifInput>) -> impl IntoResponse {
    match tarif::monthly_breakdown(&input) {
        Ok(months) => Json(ApiResponse::ok(months)).into_response(),
        Err(err) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::fail(err.to_string())),
        )
            .into_response(),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let db_path = std::env::var("FINANCE_DB").unwrap_or_else(|_| "finance.db".to_string());
    let conn = match finance_suite::open_database(&db_path) {
        Ok(conn) => conn,
        Err(err) => {
            error!("failed to open database at {db_path}: {err}");
            std::process::exit(1);
        }
    };
    info!("database opened: {db_path}");

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/finance/:year", get(get_year))
        .route("/finance/:year/rows", get(get_rows))
        .route("/finance/:year/view", get(get_view))
        .route("/finance/:year/leftover", get(get_leftover))
        .route("/finance/:year/reset", delete(reset_year))
        .route("/finance/cell", post(save_cell))
        .route("/finance/edit", post(commit_edit))
        .route("/finance/revision/:year/:direction", post(shift_revision))
        .route("/finance/row", post(save_row))
        .route("/finance/rows/reorder", post(reorder_rows))
        .route("/finance/row/:year/:row", delete(delete_row))
        .route("/payroll/gross-to-net", post(payroll_gross_to_net))
        .route("/tarif/estimate", post(tarif_estimate))
        .route("/tarif/breakdown", post(tarif_breakdown))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = std::env::var("FINANCE_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind server address");

    info!("finance-server {} listening on {addr}", finance_suite::VERSION);

    axum::serve(listener, app).await.expect("server error");
}

// Receipt Insights - Web Server
// REST API over the receipt store with Axum

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::Local;
use receipt_insights::{
    check_for_duplicates, compare_items, compare_transactions, delete_transaction,
    find_duplicates, format_change, format_period_label, get_all_transactions,
    get_merchant_mappings, get_previous_period, get_transaction, init_logging, setup_database,
    ComparisonRow, Config, DuplicateCheckResult, DuplicateMap, EnglishLabels, Granularity,
    MerchantMatcher, PeriodIdentifier, Transaction,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

impl AppState {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, Response> {
        self.db.lock().map_err(|_| {
            error!("database mutex poisoned");
            fail(StatusCode::INTERNAL_SERVER_ERROR, "database unavailable".to_string())
        })
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::ok(data))).into_response()
}

fn fail(status: StatusCode, message: String) -> Response {
    let body: ApiResponse<()> = ApiResponse {
        success: false,
        data: None,
        error: Some(message),
    };
    (status, Json(body)).into_response()
}

fn internal(context: &str, e: anyhow::Error) -> Response {
    error!(error = %e, "{}", context);
    fail(StatusCode::INTERNAL_SERVER_ERROR, format!("{}: {}", context, e))
}

/// Transaction plus its duplicate flag
#[derive(Serialize)]
struct TransactionResponse {
    #[serde(flatten)]
    transaction: Transaction,
    is_duplicate: bool,
}

#[derive(Serialize)]
struct TrendsResponse {
    granularity: Granularity,
    period: PeriodIdentifier,
    period_label: String,
    previous_period: PeriodIdentifier,
    previous_label: String,
    items: bool,
    rows: Vec<TrendRow>,
}

#[derive(Serialize)]
struct TrendRow {
    #[serde(flatten)]
    row: ComparisonRow,
    change_label: String,
}

#[derive(Serialize)]
struct MerchantMatchResponse {
    query: String,
    target_merchant: String,
    target_category: Option<String>,
    confidence: f64,
}

#[derive(Deserialize)]
struct TrendsQuery {
    granularity: Option<Granularity>,
    year: Option<i32>,
    month: Option<u32>,
    quarter: Option<u32>,
    week: Option<u32>,
    #[serde(default)]
    items: bool,
}

#[derive(Deserialize)]
struct MatchQuery {
    name: String,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/transactions - All stored receipts, newest first
async fn list_transactions(State(state): State<AppState>) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(response) => return response,
    };

    match get_all_transactions(&conn) {
        Ok(transactions) => {
            let duplicates = find_duplicates(&transactions);
            let response: Vec<TransactionResponse> = transactions
                .into_iter()
                .map(|tx| {
                    let is_duplicate = tx
                        .id
                        .as_deref()
                        .map_or(false, |id| duplicates.contains_key(id));
                    TransactionResponse { transaction: tx, is_duplicate }
                })
                .collect();
            ok(response)
        }
        Err(e) => internal("Error getting transactions", e),
    }
}

/// DELETE /api/transactions/:id - Remove a receipt (e.g. a confirmed double scan)
async fn remove_transaction(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(response) => return response,
    };

    match delete_transaction(&conn, &id) {
        Ok(true) => {
            info!(id = %id, "transaction removed");
            ok(id)
        }
        Ok(false) => fail(StatusCode::NOT_FOUND, format!("No transaction with id {}", id)),
        Err(e) => internal("Error removing transaction", e),
    }
}

/// GET /api/duplicates - Duplicate map for the whole store
async fn list_duplicates(State(state): State<AppState>) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(response) => return response,
    };

    match get_all_transactions(&conn) {
        Ok(transactions) => {
            let map: DuplicateMap = find_duplicates(&transactions);
            ok(map)
        }
        Err(e) => internal("Error finding duplicates", e),
    }
}

/// GET /api/transactions/:id/duplicates - Duplicate check for one receipt
async fn transaction_duplicates(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(response) => return response,
    };

    let tx = match get_transaction(&conn, &id) {
        Ok(Some(tx)) => tx,
        Ok(None) => return fail(StatusCode::NOT_FOUND, format!("No transaction with id {}", id)),
        Err(e) => return internal("Error loading transaction", e),
    };

    match get_all_transactions(&conn) {
        Ok(all) => {
            let result: DuplicateCheckResult = check_for_duplicates(&tx, &all);
            ok(result)
        }
        Err(e) => internal("Error checking duplicates", e),
    }
}

/// GET /api/trends - Category comparison against the previous period
async fn trends(State(state): State<AppState>, Query(query): Query<TrendsQuery>) -> Response {
    let granularity = query.granularity.unwrap_or(Granularity::Month);
    let period = PeriodIdentifier::resolve(
        granularity,
        query.year,
        query.month,
        query.quarter,
        query.week,
        Local::now().date_naive(),
    );

    let previous_period = match get_previous_period(&period, granularity) {
        Ok(previous) => previous,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(response) => return response,
    };
    let transactions = match get_all_transactions(&conn) {
        Ok(transactions) => transactions,
        Err(e) => return internal("Error getting transactions", e),
    };
    drop(conn);

    let result = if query.items {
        compare_items(&transactions, &period, granularity)
    } else {
        compare_transactions(&transactions, &period, granularity)
    };

    let rows = match result {
        Ok(rows) => rows,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let en = EnglishLabels;
    ok(TrendsResponse {
        granularity,
        period,
        period_label: format_period_label(&period, granularity, &en),
        previous_period,
        previous_label: format_period_label(&previous_period, granularity, &en),
        items: query.items,
        rows: rows
            .into_iter()
            .map(|row| TrendRow {
                change_label: format_change(&row.change(), &en),
                row,
            })
            .collect(),
    })
}

/// GET /api/merchants/match?name= - Best learned mapping for a merchant name
async fn match_merchant(State(state): State<AppState>, Query(query): Query<MatchQuery>) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(response) => return response,
    };

    let matcher = match get_merchant_mappings(&conn) {
        Ok(mappings) => MerchantMatcher::new(mappings),
        Err(e) => return internal("Error loading merchant mappings", e),
    };

    match matcher.find_best(&query.name) {
        Some(found) => ok(MerchantMatchResponse {
            query: query.name.clone(),
            target_merchant: found.mapping.target_merchant.clone(),
            target_category: found.mapping.target_category.clone(),
            confidence: found.confidence,
        }),
        None => fail(StatusCode::NOT_FOUND, format!("No mapping matches {}", query.name)),
    }
}

// ============================================================================
// Main Server
// ============================================================================

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/transactions", get(list_transactions))
        .route("/transactions/:id", axum::routing::delete(remove_transaction))
        .route("/transactions/:id/duplicates", get(transaction_duplicates))
        .route("/duplicates", get(list_duplicates))
        .route("/trends", get(trends))
        .route("/merchants/match", get(match_merchant))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(false);
    let config = Config::from_env();

    println!("🌐 Receipt Insights - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    config.ensure_db_dir()?;
    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    setup_database(&conn)?;
    println!("✓ Database opened: {}", config.db_path.display());

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    let listener = tokio::net::TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server_addr))?;

    println!("\n🚀 Server running on http://{}", config.server_addr);
    println!("   API: http://{}/api/transactions", config.server_addr);
    println!("\n   Press Ctrl+C to stop\n");
    info!(addr = %config.server_addr, "listening");

    axum::serve(listener, router(state))
        .await
        .context("Server error")?;

    Ok(())
}

// Mica Minca - Web Server
// REST API with Axum over the allowance/vitality engine

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use mica_minca::{
    categories, deposit_feedback, parse_receipt, setup_database, spend_penalty, Categorizer,
    Config, Dashboard, DepositEvent, EngineError, ReceiptDraft, Session, StatRuleTable,
    StoredReceipt,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    config: Arc<Config>,
}

impl AppState {
    /// A poisoned lock answers 500 instead of panicking every later request
    fn lock_db(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError(anyhow::anyhow!("database lock poisoned")))
    }

    fn session_key(&self, query: &SessionQuery) -> String {
        query
            .session
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.config.session.clone())
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
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }
}

/// Handler failure; engine rejections keep their own status code
struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

fn status_for(err: &anyhow::Error) -> StatusCode {
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::InsufficientFunds { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(EngineError::InvalidAmount(_))
        | Some(EngineError::NoItemsFound)
        | Some(EngineError::MalformedReceipt(_)) => StatusCode::BAD_REQUEST,
        Some(EngineError::ServiceUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        Some(EngineError::CorruptState(_)) | None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!("request failed: {:#}", self.0);
        }

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.0.to_string()),
            code: self.0.downcast_ref::<EngineError>().map(EngineError::code),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Request / Response types
// ============================================================================

#[derive(Deserialize, Default)]
struct SessionQuery {
    session: Option<String>,
}

#[derive(Deserialize)]
struct ReceiptRequest {
    text: String,
    #[serde(default)]
    session: Option<String>,
}

#[derive(Deserialize)]
struct DepositRequest {
    amount: f64,
    #[serde(default)]
    session: Option<String>,
}

/// Preview of a parsed receipt; nothing is stored
#[derive(Serialize)]
struct ParsedReceiptResponse {
    draft: ReceiptDraft,
    penalty: i64,
    /// Receipts already saved from the same text
    previous_submissions: Vec<String>,
}

#[derive(Serialize)]
struct SavedReceiptResponse {
    receipt_id: String,
    total: f64,
    penalty: i64,
    state: Dashboard,
}

#[derive(Serialize)]
struct DepositResponse {
    message: &'static str,
    state: Dashboard,
}

#[derive(Serialize)]
struct CategoryResponse {
    name: &'static str,
    health: i32,
    happiness: i32,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/state - Dashboard for the default or ?session= session
async fn get_state(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> ApiResult<Dashboard> {
    let session_key = state.session_key(&query);
    dashboard_for(&state, &session_key)
}

/// GET /api/sessions/:session/state - Dashboard for a named session
async fn get_session_state(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> ApiResult<Dashboard> {
    // Decode URL-encoded session key
    let session_key = urlencoding::decode(&session)
        .unwrap_or_else(|_| session.clone().into())
        .into_owned();
    dashboard_for(&state, &session_key)
}

fn dashboard_for(state: &AppState, session_key: &str) -> ApiResult<Dashboard> {
    let mut conn = state.lock_db()?;
    let session = Session::new(&mut conn, session_key, state.config.allowance_total);
    let snapshot = session.snapshot()?;
    Ok(Json(ApiResponse::ok(Dashboard::from_state(&snapshot))))
}

/// POST /api/parse-receipt - Parse and categorize without saving
async fn parse_receipt_preview(
    State(state): State<AppState>,
    Json(request): Json<ReceiptRequest>,
) -> ApiResult<ParsedReceiptResponse> {
    let items = parse_receipt(&request.text)?;
    let draft = ReceiptDraft::build(&items, &request.text, &StatRuleTable::new(), Utc::now())?;
    let penalty = spend_penalty(draft.event.total(), state.config.allowance_total);

    let session_key = state.session_key(&SessionQuery {
        session: request.session,
    });
    let mut conn = state.lock_db()?;
    let session = Session::new(&mut conn, &session_key, state.config.allowance_total);
    let previous_submissions = session.previous_submissions(&draft)?;

    Ok(Json(ApiResponse::ok(ParsedReceiptResponse {
        draft,
        penalty,
        previous_submissions,
    })))
}

/// POST /api/save-receipt - Parse, categorize and submit a receipt
async fn save_receipt(
    State(state): State<AppState>,
    Json(request): Json<ReceiptRequest>,
) -> ApiResult<SavedReceiptResponse> {
    let items = parse_receipt(&request.text)?;
    let draft = ReceiptDraft::build(&items, &request.text, &StatRuleTable::new(), Utc::now())?;

    let session_key = state.session_key(&SessionQuery {
        session: request.session,
    });

    // Lock held for the whole load-validate-commit
    let mut conn = state.lock_db()?;
    let mut session = Session::new(&mut conn, &session_key, state.config.allowance_total);
    let next = session.submit_receipt(&draft)?;

    Ok(Json(ApiResponse::ok(SavedReceiptResponse {
        receipt_id: draft.event.id().to_string(),
        total: draft.event.total(),
        penalty: spend_penalty(draft.event.total(), next.allowance.total()),
        state: Dashboard::from_state(&next),
    })))
}

/// POST /api/deposit - Move money into the piggy bank
async fn post_deposit(
    State(state): State<AppState>,
    Json(request): Json<DepositRequest>,
) -> ApiResult<DepositResponse> {
    let event = DepositEvent::now(request.amount)?;
    let session_key = state.session_key(&SessionQuery {
        session: request.session,
    });

    let mut conn = state.lock_db()?;
    let mut session = Session::new(&mut conn, &session_key, state.config.allowance_total);
    let next = session.deposit(&event)?;

    Ok(Json(ApiResponse::ok(DepositResponse {
        message: deposit_feedback(event.amount),
        state: Dashboard::from_state(&next),
    })))
}

/// GET /api/receipts - Accepted receipts, newest first
async fn get_receipts(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> ApiResult<Vec<StoredReceipt>> {
    let session_key = state.session_key(&query);
    let mut conn = state.lock_db()?;
    let session = Session::new(&mut conn, &session_key, state.config.allowance_total);

    Ok(Json(ApiResponse::ok(session.receipts()?)))
}

/// GET /api/categories - Category catalogue with stat changes
async fn get_categories() -> impl IntoResponse {
    let rules = StatRuleTable::new();
    let response: Vec<CategoryResponse> = categories()
        .into_iter()
        .map(|name| {
            let delta = rules.deltas(name);
            CategoryResponse {
                name,
                health: delta.health,
                happiness: delta.happiness,
            }
        })
        .collect();

    Json(ApiResponse::ok(response))
}

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/state", get(get_state))
        .route("/sessions/:session/state", get(get_session_state))
        .route("/parse-receipt", post(parse_receipt_preview))
        .route("/save-receipt", post(save_receipt))
        .route("/deposit", post(post_deposit))
        .route("/receipts", get(get_receipts))
        .route("/categories", get(get_categories))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mica_minca=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("🐣 Mica Minca - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = Config::from_env()?;

    let conn = Connection::open(&config.db_path)?;
    setup_database(&conn)?;
    info!(db = %config.db_path.display(), allowance_total = config.allowance_total, "database ready");

    let addr = config.bind_addr();
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        config: Arc::new(config),
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/state", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;

    Ok(())
}

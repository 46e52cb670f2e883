// Carbon Ledger - Web Server
// REST API over the footprint ledger, check-in and statistics

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use carbon_ledger::checkin::parse_month;
use carbon_ledger::config;
use carbon_ledger::{
    telemetry, BehaviorSummary, BehaviorTotals, CalendarDay, CheckinStats, Config, DailyTotals,
    DateRange, FootprintInput, FootprintRecord, LedgerError, Page, Services, Totals,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Header carrying the authenticated user id, set by the upstream gateway
const USER_HEADER: &str = "x-user-id";

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

impl ApiResponse<()> {
    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Handler failure, rendered into the same envelope
enum ApiError {
    Unauthorized,
    BadRequest(String),
    Ledger(LedgerError),
    Internal(String),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "missing X-User-Id header".to_string(),
            ),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Ledger(err) => {
                let status = match &err {
                    LedgerError::InvalidBehaviorType(_)
                    | LedgerError::InvalidValue { .. }
                    | LedgerError::UnsupportedForCheckin(_) => StatusCode::BAD_REQUEST,
                    LedgerError::NotFoundOrForbidden => StatusCode::NOT_FOUND,
                    LedgerError::AlreadyCheckedInToday { .. }
                    | LedgerError::DuplicateCountRecord { .. } => StatusCode::CONFLICT,
                    LedgerError::Persistence(_) | LedgerError::Export(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!(error = %err, "ledger request failed");
                } else {
                    warn!(error = %err, "ledger request rejected");
                }
                (status, err.to_string())
            }
            ApiError::Internal(message) => {
                error!(error = %message, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        (status, Json(ApiResponse::err(message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::Unauthorized)
}

/// Run a blocking ledger call off the async runtime
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> carbon_ledger::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => Ok(Json(ApiResponse::ok(result?))),
        Err(e) => Err(ApiError::Internal(format!("worker task failed: {}", e))),
    }
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    page_num: Option<i64>,
    page_size: Option<i64>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RangeQuery {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

impl RangeQuery {
    fn range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckinRequest {
    behavior_type: String,
    #[serde(default)]
    remark: Option<String>,
}

#[derive(Deserialize)]
struct MonthQuery {
    month: String,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/footprint/behavior-types - Selectable behaviors
async fn behavior_types(State(services): State<Services>) -> Json<ApiResponse<Vec<BehaviorSummary>>> {
    let listing = services
        .catalog
        .list_all()
        .into_iter()
        .map(|(_, summary)| summary)
        .collect();
    Json(ApiResponse::ok(listing))
}

/// POST /api/footprint - Record a behavior
async fn create_record(
    State(services): State<Services>,
    headers: HeaderMap,
    Json(input): Json<FootprintInput>,
) -> ApiResult<FootprintRecord> {
    let user = user_id(&headers)?;
    blocking(move || services.ledger.create(&user, &input)).await
}

/// GET /api/footprint/list - One page of the caller's records, newest first
async fn list_records(
    State(services): State<Services>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResult<Page<FootprintRecord>> {
    let user = user_id(&headers)?;
    let page_num = query.page_num.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(services.config.default_page_size);
    let range = DateRange::new(query.start_date, query.end_date);
    blocking(move || services.ledger.list(&user, page_num, page_size, &range)).await
}

/// PUT /api/footprint/:id - Replace a record's contents
async fn update_record(
    State(services): State<Services>,
    headers: HeaderMap,
    Path(record_id): Path<String>,
    Json(input): Json<FootprintInput>,
) -> ApiResult<FootprintRecord> {
    let user = user_id(&headers)?;
    blocking(move || services.ledger.update(&record_id, &user, &input)).await
}

/// DELETE /api/footprint/:id
async fn delete_record(
    State(services): State<Services>,
    headers: HeaderMap,
    Path(record_id): Path<String>,
) -> ApiResult<()> {
    let user = user_id(&headers)?;
    blocking(move || services.ledger.delete(&record_id, &user)).await
}

/// GET /api/footprint/statistics - Totals over a date range (default: trailing window)
async fn statistics(
    State(services): State<Services>,
    headers: HeaderMap,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Totals> {
    let user = user_id(&headers)?;
    let range = query.range();
    blocking(move || services.statistics.totals(&user, &range)).await
}

/// GET /api/footprint/statistics/by-behavior
async fn statistics_by_behavior(
    State(services): State<Services>,
    headers: HeaderMap,
) -> ApiResult<Vec<BehaviorTotals>> {
    let user = user_id(&headers)?;
    blocking(move || services.statistics.by_behavior_type(&user)).await
}

/// GET /api/footprint/statistics/daily
async fn statistics_daily(
    State(services): State<Services>,
    headers: HeaderMap,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Vec<DailyTotals>> {
    let user = user_id(&headers)?;
    let range = query.range();
    blocking(move || services.statistics.by_date(&user, &range)).await
}

/// POST /api/footprint/checkin - One-tap check-in
async fn checkin(
    State(services): State<Services>,
    headers: HeaderMap,
    Json(request): Json<CheckinRequest>,
) -> ApiResult<FootprintRecord> {
    let user = user_id(&headers)?;
    blocking(move || {
        services
            .checkin
            .checkin(&user, &request.behavior_type, request.remark)
    })
    .await
}

/// GET /api/footprint/checkin/calendar?month=YYYY-MM
async fn checkin_calendar(
    State(services): State<Services>,
    headers: HeaderMap,
    Query(query): Query<MonthQuery>,
) -> ApiResult<Vec<CalendarDay>> {
    let user = user_id(&headers)?;
    let first = parse_month(&query.month).ok_or_else(|| {
        ApiError::BadRequest(format!("invalid month {:?}, expected YYYY-MM", query.month))
    })?;
    blocking(move || services.checkin.calendar_for_month(&user, first)).await
}

/// GET /api/footprint/checkin/stats
async fn checkin_stats(
    State(services): State<Services>,
    headers: HeaderMap,
) -> ApiResult<CheckinStats> {
    let user = user_id(&headers)?;
    blocking(move || services.checkin.checkin_stats(&user)).await
}

fn router(services: Services) -> Router {
    let footprint_routes = Router::new()
        .route("/", post(create_record))
        .route("/behavior-types", get(behavior_types))
        .route("/list", get(list_records))
        .route("/:id", put(update_record).delete(delete_record))
        .route("/statistics", get(statistics))
        .route("/statistics/by-behavior", get(statistics_by_behavior))
        .route("/statistics/daily", get(statistics_daily))
        .route("/checkin", post(checkin))
        .route("/checkin/calendar", get(checkin_calendar))
        .route("/checkin/stats", get(checkin_stats));

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .nest("/footprint", footprint_routes);

    Router::new()
        .nest("/api", api_routes)
        .with_state(services)
        .layer(
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
    telemetry::init_tracing();

    let config_path = std::env::var(config::ENV_CONFIG)
        .unwrap_or_else(|_| config::DEFAULT_CONFIG_FILE.to_string());
    let config = Config::load(Some(std::path::Path::new(&config_path)))?;
    let addr = config.server_addr.clone();

    let services = Services::from_config(config)?;
    let app = router(services);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "carbon ledger server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

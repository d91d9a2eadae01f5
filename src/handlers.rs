use crate::backend_client::{BackendClient, RelayedResponse};
use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::insights::{InsightTable, SpendingInsights};
use crate::models::{coerce_amount, AffordabilityForm, HouseAnalysisRequest, HouseSearchRequest};
use crate::planner::{AffordabilityPlanner, PlannerServices, PlannerSettings};
use crate::services::{BackendAnalysisService, BackendHouseSearch, DashboardSpendingHistory};
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Client for the FastAPI backend, used by the relay routes.
    pub backend: BackendClient,
    /// Services handed to every new planner session.
    pub planner_services: PlannerServices,
    /// Kept typed so uploads can invalidate the cached card spend.
    pub history: Arc<DashboardSpendingHistory>,
    /// Planner sessions by id, expired after `plan_session_ttl` of inactivity.
    pub plans: Cache<Uuid, Arc<AffordabilityPlanner>>,
    pub insights: Arc<InsightTable>,
}

impl AppState {
    /// Wires the backend client, services and caches from configuration.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let backend = BackendClient::new(config.backend_base_url.clone(), config.proxy_timeout)?;
        let history = Arc::new(DashboardSpendingHistory::new(backend.clone()));
        let planner_services = PlannerServices {
            analysis: Arc::new(BackendAnalysisService::new(backend.clone())),
            search: Arc::new(BackendHouseSearch::new(backend.clone(), &config)),
            history: Some(history.clone()),
        };
        let plans = Cache::builder()
            .time_to_idle(config.plan_session_ttl)
            .max_capacity(10_000)
            .build();

        Ok(Self {
            config,
            backend,
            planner_services,
            history,
            plans,
            insights: Arc::new(InsightTable::standard()?),
        })
    }

    /// Creates a planner bound to this state's services.
    pub fn new_planner(&self) -> AffordabilityPlanner {
        AffordabilityPlanner::new(
            self.planner_services.clone(),
            PlannerSettings::from_config(&self.config),
        )
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-affordability-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Maps a JSON extractor rejection onto the `{error}` shape.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// POST /api/v1/house-analysis
///
/// Validates the form locally so the backend never sees a request with
/// missing fields, then relays the backend JSON untouched.
pub async fn house_analysis(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AffordabilityForm>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let form = json_body(payload)?;
    let input = form.validate(&state.config.default_location)?;
    let request = HouseAnalysisRequest::new(&input, input.monthly_credit_card_spend);

    tracing::info!(
        "Relaying house analysis: income={} rent={} risk={}",
        input.monthly_income,
        input.monthly_rent,
        input.risk_tolerance
    );

    let body = state
        .backend
        .house_analysis_raw(&request, state.config.analysis_timeout)
        .await?;
    Ok(Json(body))
}

#[derive(Debug, Default, Deserialize)]
pub struct HouseSearchForm {
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub downpayment: Option<Value>,
    #[serde(default)]
    pub leverage: Option<Value>,
}

impl HouseSearchForm {
    fn validate(&self, default_leverage: f64) -> Result<HouseSearchRequest, AppError> {
        let location = self
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty());
        let downpayment = coerce_amount("downpayment", self.downpayment.as_ref())?;

        let (Some(location), Some(downpayment)) = (location, downpayment) else {
            return Err(AppError::BadRequest(
                "Missing required fields: location and downpayment".to_string(),
            ));
        };
        if downpayment <= 0.0 {
            return Err(AppError::BadRequest(
                "downpayment must be greater than zero".to_string(),
            ));
        }

        let leverage = coerce_amount("leverage", self.leverage.as_ref())?
            .filter(|l| *l > 0.0)
            .unwrap_or(default_leverage);

        Ok(HouseSearchRequest {
            location: location.to_string(),
            downpayment,
            leverage,
        })
    }
}

/// POST /api/v1/house-search
pub async fn house_search(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<HouseSearchForm>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let request = json_body(payload)?.validate(state.config.search_leverage)?;

    tracing::info!(
        "Relaying house search for {} with ${:.0} down",
        request.location,
        request.downpayment
    );

    let body = state
        .backend
        .house_search_raw(&request, authorization(&headers), state.config.search_timeout)
        .await?;
    Ok(Json(body))
}

/// GET /api/v1/dashboard
pub async fn dashboard(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    Ok(Json(state.backend.dashboard_raw().await?))
}

/// GET /api/v1/transactions
pub async fn transactions(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.backend.transactions(query.as_deref()).await?))
}

/// GET /api/v1/insights
pub async fn insights(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SpendingInsights>, AppError> {
    let summary = state
        .backend
        .dashboard()
        .await
        .context("Loading dashboard for insights")?;
    Ok(Json(state.insights.analyze(&summary)))
}

/// Statement routes answer errors as `{detail}` like the backend does.
pub struct StatementError(AppError);

impl From<AppError> for StatementError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for StatementError {
    fn into_response(self) -> Response {
        tracing::error!("Statement relay failed: {}", self.0);
        (
            self.0.status_code(),
            Json(json!({ "detail": self.0.public_message() })),
        )
            .into_response()
    }
}

fn relayed(response: RelayedResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(response.body)).into_response()
}

/// POST /api/v1/statements/upload
///
/// The body is forwarded byte for byte with its `Content-Type`, so multipart
/// boundaries survive.
pub async fn upload_statement(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, StatementError> {
    if body.is_empty() {
        return Err(AppError::BadRequest("No file provided".to_string()).into());
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let response = state
        .backend
        .upload_statement(body.to_vec(), content_type, authorization(&headers))
        .await?;

    if (200..300).contains(&response.status) {
        state.history.invalidate().await;
    }
    Ok(relayed(response))
}

/// GET /api/v1/statements/:id
pub async fn get_statement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, StatementError> {
    let response = state
        .backend
        .statement(&id, authorization(&headers))
        .await?;
    Ok(relayed(response))
}

/// GET /api/v1/statements
pub async fn list_statements(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, StatementError> {
    let response = state.backend.statements(authorization(&headers)).await?;
    Ok(relayed(response))
}

use crate::errors::AppError;
use crate::handlers::{self, AppState};
use crate::planner_handler;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder,
    key_extractor::SmartIpKeyExtractor,
    GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Request body limit for everything except statement uploads.
const JSON_BODY_LIMIT: usize = 1024 * 1024;

/// All `/api/v1` routes, without state or outer middleware.
pub fn api_routes(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    let uploads = Router::new()
        .route(
            "/api/v1/statements/upload",
            post(handlers::upload_statement),
        )
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(max_upload_bytes)),
        );

    Router::new()
        // Relays
        .route("/api/v1/house-analysis", post(handlers::house_analysis))
        .route("/api/v1/house-search", post(handlers::house_search))
        .route("/api/v1/dashboard", get(handlers::dashboard))
        .route("/api/v1/transactions", get(handlers::transactions))
        .route("/api/v1/insights", get(handlers::insights))
        .route("/api/v1/statements", get(handlers::list_statements))
        .route("/api/v1/statements/:id", get(handlers::get_statement))
        // Planner sessions
        .route("/api/v1/plans", post(planner_handler::create_plan))
        .route(
            "/api/v1/plans/:id",
            get(planner_handler::get_plan).delete(planner_handler::delete_plan),
        )
        .route("/api/v1/plans/:id/goal", post(planner_handler::select_goal))
        .route(
            "/api/v1/plans/:id/analysis",
            post(planner_handler::submit_analysis),
        )
        .route(
            "/api/v1/plans/:id/location",
            put(planner_handler::edit_location),
        )
        .route("/api/v1/plans/:id/reset", post(planner_handler::reset_plan))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .merge(uploads)
}

/// Builds the application router.
///
/// `/health` is never rate limited. With `rate_limited` set, API routes get
/// 10 requests/second per IP with a burst of 20, and the router must be
/// served with connect info so the peer address is known.
pub fn create_router(state: Arc<AppState>, rate_limited: bool) -> Result<Router, AppError> {
    let api = api_routes(state.config.max_upload_bytes);
    let api = if rate_limited {
        let config = GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| {
                AppError::InternalError("Invalid rate limit configuration".to_string())
            })?;
        api.layer(GovernorLayer {
            config: Arc::new(config),
        })
    } else {
        api
    };

    Ok(Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()))
}

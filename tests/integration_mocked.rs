/// Integration tests with a mocked FastAPI backend
/// Drives the router end to end without hitting a real backend.
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use rust_affordability_api::config::Config;
use rust_affordability_api::handlers::AppState;
use rust_affordability_api::routes::create_router;
use rust_affordability_api::backend_client::BackendClient;
use rust_affordability_api::models::{AffordabilityForm, AffordabilityProjection, DataSource, Goal};
use rust_affordability_api::planner::{AffordabilityPlanner, PlannerServices, PlannerSettings};
use rust_affordability_api::services::{
    BackendAnalysisService, BackendHouseSearch, DashboardSpendingHistory, SpendingHistory,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header as header_matcher, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create test config
fn create_test_config(backend_base_url: String) -> Config {
    Config {
        backend_base_url,
        analysis_timeout: Duration::from_secs(5),
        search_timeout: Duration::from_secs(5),
        proxy_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}

fn app(backend_base_url: String) -> Router {
    let state = AppState::new(create_test_config(backend_base_url)).unwrap();
    create_router(Arc::new(state), false).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let app = app("http://127.0.0.1:1".to_string());
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_house_analysis_missing_fields_never_reach_backend() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/house-analysis"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let app = app(mock_server.uri());
    let (status, body) = send(
        &app,
        json_request("POST", "/api/v1/house-analysis", json!({ "location": "Guelph" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Missing required fields: monthly_income, monthly_rent, risk_tolerance"
    );
}

#[tokio::test]
async fn test_house_analysis_relays_backend_json() {
    let mock_server = MockServer::start().await;
    let backend_body = json!({
        "monthly_savings": 810.0,
        "projected_value_5_years": 58000.0,
        "rbc_api_used": true
    });

    Mock::given(method("POST"))
        .and(path("/api/v1/house-analysis"))
        .and(body_partial_json(json!({
            "monthly_income": 5000.0,
            "monthly_rent": 1500.0,
            "monthly_credit_card": 800.0,
            "risk_tolerance": "moderate",
            "location": "Waterloo, ON"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(&backend_body))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = app(mock_server.uri());
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/house-analysis",
            json!({
                "monthly_income": "5000",
                "monthly_rent": 1500,
                "monthly_credit_card": "800",
                "risk_tolerance": "moderate"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, backend_body);
}

#[tokio::test]
async fn test_upstream_status_and_detail_are_relayed() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/house-analysis"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({ "detail": "bad risk" })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/dashboard"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let app = app(mock_server.uri());
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/house-analysis",
            json!({ "monthly_income": 1, "monthly_rent": 1, "risk_tolerance": "moderate" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, json!({ "error": "bad risk" }));

    let (status, body) = send(&app, get("/api/v1/dashboard")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({ "error": "Backend error: 503" }));
}

#[tokio::test]
async fn test_unreachable_backend_is_internal_error() {
    let app = app("http://127.0.0.1:1".to_string());

    let (status, body) = send(&app, get("/api/v1/dashboard")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Internal server error" }));

    let (status, body) = send(&app, get("/api/v1/statements/abc")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "detail": "Internal server error" }));
}

#[tokio::test]
async fn test_statement_routes_relay_status_and_body() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/statements/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "detail": "Statement not found" })),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/statements/list"))
        .and(header_matcher("authorization", "Bearer t0k"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "statements": [] })))
        .mount(&mock_server)
        .await;

    let app = app(mock_server.uri());
    let (status, body) = send(&app, get("/api/v1/statements/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "detail": "Statement not found" }));

    let request = Request::builder()
        .uri("/api/v1/statements")
        .header(header::AUTHORIZATION, "Bearer t0k")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "statements": [] }));
}

#[tokio::test]
async fn test_non_json_statement_error_keeps_upstream_status() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/statements/abc"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/statements/list"))
        .respond_with(
            ResponseTemplate::new(502).set_body_raw("<html>Bad Gateway</html>", "text/html"),
        )
        .mount(&mock_server)
        .await;

    let app = app(mock_server.uri());
    let (status, body) = send(&app, get("/api/v1/statements/abc")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({ "detail": "Backend error: 503" }));

    let (status, body) = send(&app, get("/api/v1/statements")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, json!({ "detail": "Backend error: 502" }));
}

async fn submit_once(
    services: &PlannerServices,
    config: &Config,
    form: &AffordabilityForm,
) -> (AffordabilityProjection, Duration) {
    let planner = AffordabilityPlanner::new(services.clone(), PlannerSettings::from_config(config));
    planner.select_goal(Goal::House).await.unwrap();
    let started = std::time::Instant::now();
    let projection = planner.submit_analysis(form).await.unwrap();
    (projection, started.elapsed())
}

#[tokio::test]
async fn test_hung_analysis_backend_opens_circuit() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/house-analysis"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "projected_value_5_years": 70000 }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let config = Config {
        analysis_timeout: Duration::from_millis(200),
        ..create_test_config(mock_server.uri())
    };
    let client = BackendClient::new(config.backend_base_url.clone(), config.proxy_timeout).unwrap();
    let services = PlannerServices {
        analysis: Arc::new(BackendAnalysisService::new(client.clone())),
        search: Arc::new(BackendHouseSearch::new(client, &config)),
        history: None,
    };
    let form: AffordabilityForm = serde_json::from_value(json!({
        "monthly_income": 5000,
        "monthly_rent": 1500,
        "monthly_credit_card": 800,
        "risk_tolerance": "moderate"
    }))
    .unwrap();

    // Five hung calls in a row open the circuit.
    for _ in 0..5 {
        let (projection, _) = submit_once(&services, &config, &form).await;
        assert_eq!(projection.data_source, DataSource::EstimatedFallback);
        assert!(projection.recommendations[0].contains("did not respond"));
    }

    let (projection, elapsed) = submit_once(&services, &config, &form).await;
    assert_eq!(projection.data_source, DataSource::EstimatedFallback);
    assert!(projection.recommendations[0].contains("currently unavailable"));
    assert!(elapsed < Duration::from_millis(150));
}

#[tokio::test]
async fn test_statement_upload_is_forwarded_verbatim() {
    let mock_server = MockServer::start().await;
    let content_type = "multipart/form-data; boundary=XyZ";
    Mock::given(method("POST"))
        .and(path("/api/v1/statements/upload"))
        .and(header_matcher("content-type", content_type))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "statement_id": "s-1" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = app(mock_server.uri());
    let body = "--XyZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"s.pdf\"\r\n\r\n%PDF\r\n--XyZ--\r\n";
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/statements/upload")
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({ "statement_id": "s-1" }));
}

#[tokio::test]
async fn test_transactions_keep_query_string() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/transactions"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = app(mock_server.uri());
    let (status, body) = send(&app, get("/api/v1/transactions?limit=5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{ "id": 1 }]));
}

#[tokio::test]
async fn test_house_search_validates_and_forwards_authorization() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/house-search"))
        .and(header_matcher("authorization", "Bearer abc"))
        .and(body_partial_json(json!({
            "location": "Toronto, ON",
            "downpayment": 60000.0,
            "leverage": 5.0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "houses": [] })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = app(mock_server.uri());

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/house-search",
            json!({ "location": "Toronto, ON", "downpayment": 0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/house-search")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer abc")
        .body(Body::from(
            json!({ "location": "Toronto, ON", "downpayment": 60000 }).to_string(),
        ))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "houses": [] }));
}

#[tokio::test]
async fn test_insights_from_dashboard() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/dashboard"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_spent": 1000.0,
            "total_transactions": 12,
            "avg_transaction": 83.33,
            "spending_by_category": [
                { "category": "Dining", "transaction_count": 8, "total_amount": 400.0 },
                { "category": "Pharmacy", "transaction_count": 4, "total_amount": 600.0 }
            ]
        })))
        .mount(&mock_server)
        .await;

    let app = app(mock_server.uri());
    let (status, body) = send(&app, get("/api/v1/insights")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["categories"][0]["rule"], "food");
    assert_eq!(body["categories"][0]["severity"], "high");
    assert_eq!(body["categories"][1]["rule"], "health");
    assert_eq!(body["overview"][0]["title"], "Pharmacy is your biggest expense");
}

#[tokio::test]
async fn test_plan_session_lifecycle() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/house-analysis"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "monthly_savings": 810.0,
            "projected_value_5_years": 58000.0,
            "expected_annual_return": 0.07,
            "rbc_api_used": true
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/house-search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "houses": [{ "address": "9 Erb St", "price": 290000.0 }]
        })))
        .mount(&mock_server)
        .await;

    let app = app(mock_server.uri());

    let (status, plan) = send(
        &app,
        json_request("POST", "/api/v1/plans", json!({ "goal": "house" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(plan["phase"], "collecting-input");
    let id = plan["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/v1/plans/{}/analysis", id),
            json!({ "monthly_income": 1000 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Missing required fields"));

    let (status, projection) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/v1/plans/{}/analysis", id),
            json!({
                "monthly_income": 5000,
                "monthly_rent": 1500,
                "monthly_credit_card": 800,
                "risk_tolerance": "moderate"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(projection["data_source"], "external-api");
    assert_eq!(projection["projected_value_5_years"], 58000.0);

    let (status, snapshot) = send(&app, get(&format!("/api/v1/plans/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["phase"], "results-ready");
    assert_eq!(snapshot["risk"]["label"], "Moderate");

    let (status, snapshot) = send(
        &app,
        json_request(
            "PUT",
            &format!("/api/v1/plans/{}/location", id),
            json!({ "location": "Kitchener, ON" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(snapshot["search_location"], "Kitchener, ON");

    let (status, snapshot) = send(
        &app,
        json_request("POST", &format!("/api/v1/plans/{}/reset", id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["phase"], "idle");
    assert!(snapshot["projection"].is_null());

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/plans/{}", id))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get(&format!("/api/v1/plans/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_spending_history_is_cached() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/dashboard"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_spent": -742.5,
            "total_transactions": 31,
            "avg_transaction": 23.95,
            "spending_by_category": []
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = BackendClient::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
    let history = DashboardSpendingHistory::new(client);

    assert_eq!(history.monthly_credit_card_spend().await.unwrap(), Some(742.5));
    assert_eq!(history.monthly_credit_card_spend().await.unwrap(), Some(742.5));
}

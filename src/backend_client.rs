use crate::errors::AppError;
use crate::models::{
    DashboardSummary, HouseAnalysisRequest, HouseAnalysisResponse, HouseSearchRequest,
    HouseSearchResponse,
};
use reqwest::{header, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Client for the FastAPI backend.
///
/// Every outbound call goes through here so the base URL is injected once at
/// startup. Each method takes the timeout of its own call site.
#[derive(Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    default_timeout: Duration,
}

/// Status and JSON body relayed verbatim from the backend.
#[derive(Debug, Clone)]
pub struct RelayedResponse {
    pub status: u16,
    pub body: Value,
}

impl BackendClient {
    /// Creates a new `BackendClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the backend, without trailing slash.
    /// * `default_timeout` - Bound used by calls that do not pass their own.
    pub fn new(base_url: String, default_timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create backend client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        timeout: Duration,
        authorization: Option<&str>,
    ) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url).timeout(timeout);
        match authorization {
            Some(auth) => builder.header(header::AUTHORIZATION, auth),
            None => builder,
        }
    }

    /// Sends the request and decodes a success body; non-2xx becomes
    /// [`AppError::Upstream`] carrying the backend's detail text.
    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T, AppError> {
        let response = builder.send().await.map_err(|e| {
            tracing::error!("{} request failed: {}", what, e);
            AppError::from(e)
        })?;

        if !response.status().is_success() {
            return Err(upstream_error(response, what).await);
        }

        response.json::<T>().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse {} response: {}", what, e))
        })
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
        authorization: Option<&str>,
        what: &str,
    ) -> Result<T, AppError> {
        tracing::info!("POST {}{} ({})", self.base_url, path, what);
        let builder = self
            .request(Method::POST, path, timeout, authorization)
            .json(body);
        self.send_json(builder, what).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        timeout: Duration,
        authorization: Option<&str>,
        what: &str,
    ) -> Result<T, AppError> {
        tracing::info!("GET {}{} ({})", self.base_url, path, what);
        let builder = self.request(Method::GET, path, timeout, authorization);
        self.send_json(builder, what).await
    }

    /// Raw analysis call, body relayed untouched.
    pub async fn house_analysis_raw(
        &self,
        request: &HouseAnalysisRequest,
        timeout: Duration,
    ) -> Result<Value, AppError> {
        self.post_json("/api/v1/house-analysis", request, timeout, None, "house analysis")
            .await
    }

    /// Gets a five-year projection from the Analysis Service.
    pub async fn house_analysis(
        &self,
        request: &HouseAnalysisRequest,
        timeout: Duration,
    ) -> Result<HouseAnalysisResponse, AppError> {
        self.post_json("/api/v1/house-analysis", request, timeout, None, "house analysis")
            .await
    }

    pub async fn house_search_raw(
        &self,
        request: &HouseSearchRequest,
        authorization: Option<&str>,
        timeout: Duration,
    ) -> Result<Value, AppError> {
        self.post_json(
            "/api/v1/house-search",
            request,
            timeout,
            authorization,
            "house search",
        )
        .await
    }

    /// Searches listings for a location and down payment.
    pub async fn house_search(
        &self,
        request: &HouseSearchRequest,
        timeout: Duration,
    ) -> Result<HouseSearchResponse, AppError> {
        self.post_json("/api/v1/house-search", request, timeout, None, "house search")
            .await
    }

    pub async fn dashboard_raw(&self) -> Result<Value, AppError> {
        self.get_json("/api/v1/dashboard", self.default_timeout, None, "dashboard")
            .await
    }

    /// Aggregate spending of the latest statement.
    pub async fn dashboard(&self) -> Result<DashboardSummary, AppError> {
        self.get_json("/api/v1/dashboard", self.default_timeout, None, "dashboard")
            .await
    }

    /// Raw transactions listing; `query` is forwarded as the query string.
    pub async fn transactions(&self, query: Option<&str>) -> Result<Value, AppError> {
        let path = match query.filter(|q| !q.is_empty()) {
            Some(q) => format!("/api/v1/transactions?{}", q),
            None => "/api/v1/transactions".to_string(),
        };
        self.get_json(&path, self.default_timeout, None, "transactions")
            .await
    }

    /// Fetches a parsed statement. Any status is relayed.
    pub async fn statement(
        &self,
        id: &str,
        authorization: Option<&str>,
    ) -> Result<RelayedResponse, AppError> {
        let path = format!("/api/v1/statements/{}", urlencode_segment(id));
        tracing::info!("Fetching statement {} from backend", id);
        let builder = self.request(Method::GET, &path, self.default_timeout, authorization);
        relay(builder, "statement").await
    }

    /// Lists statements for the caller. Any status is relayed.
    pub async fn statements(&self, authorization: Option<&str>) -> Result<RelayedResponse, AppError> {
        let builder = self.request(
            Method::GET,
            "/api/v1/statements/list",
            self.default_timeout,
            authorization,
        );
        relay(builder, "statement list").await
    }

    /// Forwards an upload body (multipart or otherwise) without re-encoding it.
    pub async fn upload_statement(
        &self,
        body: Vec<u8>,
        content_type: Option<&str>,
        authorization: Option<&str>,
    ) -> Result<RelayedResponse, AppError> {
        tracing::info!("Forwarding statement upload ({} bytes)", body.len());
        let mut builder = self.request(
            Method::POST,
            "/api/v1/statements/upload",
            self.default_timeout,
            authorization,
        );
        if let Some(ct) = content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        relay(builder.body(body), "statement upload").await
    }
}

/// Relays status and body. An error body that is not JSON keeps the upstream
/// status with a generic `detail`.
async fn relay(builder: RequestBuilder, what: &str) -> Result<RelayedResponse, AppError> {
    let response = builder.send().await?;
    let status = response.status();
    let text = response.text().await?;

    let body = match serde_json::from_str::<Value>(&text) {
        Ok(body) => body,
        Err(_) if !status.is_success() => {
            tracing::warn!("{} returned {} with a non-JSON body: {}", what, status, text);
            json!({ "detail": format!("Backend error: {}", status.as_u16()) })
        }
        Err(e) => {
            return Err(AppError::ExternalApiError(format!(
                "Failed to parse {} response: {}",
                what, e
            )))
        }
    };
    Ok(RelayedResponse {
        status: status.as_u16(),
        body,
    })
}

/// Converts a non-success response into [`AppError::Upstream`].
///
/// Prefers the backend's `detail` (FastAPI) or `error` field, otherwise a
/// generic `Backend error: <status>` line.
async fn upstream_error(response: Response, what: &str) -> AppError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    tracing::warn!("{} returned {}: {}", what, status, text);

    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| {
            ["detail", "error"].iter().find_map(|key| match body.get(*key) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            })
        })
        .unwrap_or_else(|| format!("Backend error: {}", status));

    AppError::Upstream { status, message }
}

fn urlencode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

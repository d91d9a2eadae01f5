//! External services the planner depends on.
//!
//! The traits are the seams the workflow is written against; the `Backend*`
//! types implement them over [`BackendClient`].

use crate::backend_client::BackendClient;
use crate::circuit_breaker::{create_analysis_circuit_breaker, AnalysisCircuitBreaker};
use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::models::{HouseAnalysisRequest, HouseAnalysisResponse, HouseListing, HouseSearchRequest};
use async_trait::async_trait;
use failsafe::futures::CircuitBreaker;
use moka::future::Cache;
use std::time::Duration;
use tokio::time::Instant;

/// Produces five-year projections.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Answers by `deadline` or fails with [`AppError::Timeout`].
    async fn analyze(
        &self,
        request: &HouseAnalysisRequest,
        deadline: Instant,
    ) -> Result<HouseAnalysisResponse, AppError>;
}

/// Finds listings affordable with a given down payment.
#[async_trait]
pub trait HouseSearchService: Send + Sync {
    async fn search(&self, location: &str, down_payment: f64)
        -> Result<Vec<HouseListing>, AppError>;
}

/// Observed spending from uploaded statements.
#[async_trait]
pub trait SpendingHistory: Send + Sync {
    /// Monthly credit-card spend, or `None` when no statement has been uploaded.
    async fn monthly_credit_card_spend(&self) -> Result<Option<f64>, AppError>;
}

/// Analysis Service over the backend, behind a circuit breaker.
///
/// The deadline is enforced inside the breaker, so a hung backend counts as a
/// failure and opens the circuit like any other error.
pub struct BackendAnalysisService {
    client: BackendClient,
    breaker: AnalysisCircuitBreaker,
}

impl BackendAnalysisService {
    pub fn new(client: BackendClient) -> Self {
        Self {
            client,
            breaker: create_analysis_circuit_breaker(),
        }
    }
}

#[async_trait]
impl AnalysisService for BackendAnalysisService {
    async fn analyze(
        &self,
        request: &HouseAnalysisRequest,
        deadline: Instant,
    ) -> Result<HouseAnalysisResponse, AppError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let call = async {
            match tokio::time::timeout_at(deadline, self.client.house_analysis(request, remaining))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(AppError::Timeout(format!(
                    "house analysis after {:.1}s",
                    remaining.as_secs_f64()
                ))),
            }
        };
        match self.breaker.call(call).await {
            Ok(response) => Ok(response),
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("Analysis circuit open, skipping backend call");
                Err(AppError::ExternalApiError(
                    "analysis service circuit is open".to_string(),
                ))
            }
        }
    }
}

/// Search Service over the backend.
pub struct BackendHouseSearch {
    client: BackendClient,
    timeout: Duration,
    leverage: f64,
}

impl BackendHouseSearch {
    pub fn new(client: BackendClient, config: &Config) -> Self {
        Self {
            client,
            timeout: config.search_timeout,
            leverage: config.search_leverage,
        }
    }
}

#[async_trait]
impl HouseSearchService for BackendHouseSearch {
    async fn search(
        &self,
        location: &str,
        down_payment: f64,
    ) -> Result<Vec<HouseListing>, AppError> {
        let request = HouseSearchRequest {
            location: location.to_string(),
            downpayment: down_payment,
            leverage: self.leverage,
        };
        let response = self
            .client
            .house_search(&request, self.timeout)
            .await
            .with_context(|| format!("House search for {}", location))?;
        Ok(response.into_listings(down_payment))
    }
}

const HISTORY_CACHE_KEY: &str = "monthly_credit_card";

/// Spending history read from the Dashboard Service.
///
/// The uploaded statement covers one month of card activity, so its
/// `total_spent` is the observed monthly credit-card spend. Answers are cached
/// for five minutes.
pub struct DashboardSpendingHistory {
    client: BackendClient,
    cache: Cache<String, Option<f64>>,
}

impl DashboardSpendingHistory {
    pub fn new(client: BackendClient) -> Self {
        Self {
            client,
            cache: Cache::builder()
                .time_to_live(Duration::from_secs(300))
                .max_capacity(16)
                .build(),
        }
    }

    /// Drops the cached value, e.g. after a new statement upload.
    pub async fn invalidate(&self) {
        self.cache.invalidate(HISTORY_CACHE_KEY).await;
    }
}

#[async_trait]
impl SpendingHistory for DashboardSpendingHistory {
    async fn monthly_credit_card_spend(&self) -> Result<Option<f64>, AppError> {
        if let Some(cached) = self.cache.get(HISTORY_CACHE_KEY).await {
            tracing::debug!("Spending history cache hit");
            return Ok(cached);
        }

        let summary = self.client.dashboard().await?;
        let observed = Some(summary.total_spent.abs())
            .filter(|spent| summary.total_transactions > 0 && *spent > 0.0 && spent.is_finite());

        tracing::info!(
            "Observed monthly card spend from {} transactions: {:?}",
            summary.total_transactions,
            observed
        );
        self.cache
            .insert(HISTORY_CACHE_KEY.to_string(), observed)
            .await;

        Ok(observed)
    }
}

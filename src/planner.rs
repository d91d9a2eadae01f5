//! House affordability planning workflow.
//!
//! One [`AffordabilityPlanner`] drives one user from goal selection through
//! analysis to listings:
//!
//! 1. `idle` → `collecting-input` when the house goal is chosen.
//! 2. `collecting-input` → `analyzing` once the form validates.
//! 3. `analyzing` → `results-ready` with either the service projection or a
//!    local estimate; the analysis never ends in an error-only state.
//! 4. In `results-ready`, a house search runs in the background whenever the
//!    projected value is positive. Editing the location starts a new one.
//! 5. `back_to_selection` returns to `idle` from anywhere.
//!
//! Searches are tagged with `(generation, sequence)`. Only the latest-issued
//! search of the current generation may write listings, so a slow superseded
//! response never overwrites a newer one and nothing lands after a reset.

use crate::config::Config;
use crate::errors::AppError;
use crate::models::{
    AffordabilityForm, AffordabilityInput, AffordabilityProjection, Goal, HouseAnalysisRequest,
    HouseListing, RiskTolerance,
};
use crate::projection::{self, FallbackReason};
use crate::services::{AnalysisService, HouseSearchService, SpendingHistory};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlannerPhase {
    Idle,
    CollectingInput,
    Analyzing,
    ResultsReady,
}

impl PlannerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlannerPhase::Idle => "idle",
            PlannerPhase::CollectingInput => "collecting-input",
            PlannerPhase::Analyzing => "analyzing",
            PlannerPhase::ResultsReady => "results-ready",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchStatus {
    Idle,
    Searching,
    Complete,
}

#[derive(Debug, Clone)]
pub struct PlannerSettings {
    /// Ceiling for one analysis attempt, spending-history lookup included.
    pub analysis_timeout: Duration,
    pub default_location: String,
}

impl PlannerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            analysis_timeout: config.analysis_timeout,
            default_location: config.default_location.clone(),
        }
    }
}

/// Services a planner talks to.
#[derive(Clone)]
pub struct PlannerServices {
    pub analysis: Arc<dyn AnalysisService>,
    pub search: Arc<dyn HouseSearchService>,
    pub history: Option<Arc<dyn SpendingHistory>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskDisplay {
    pub tag: RiskTolerance,
    pub label: &'static str,
    pub description: &'static str,
}

impl From<RiskTolerance> for RiskDisplay {
    fn from(tag: RiskTolerance) -> Self {
        Self {
            tag,
            label: tag.label(),
            description: tag.description(),
        }
    }
}

/// Point-in-time view of a planner.
#[derive(Debug, Clone, Serialize)]
pub struct PlanSnapshot {
    pub id: Uuid,
    pub phase: PlannerPhase,
    pub goal: Option<Goal>,
    pub input: Option<AffordabilityInput>,
    pub risk: Option<RiskDisplay>,
    pub projection: Option<AffordabilityProjection>,
    pub listings: Vec<HouseListing>,
    pub search_status: SearchStatus,
    pub search_location: Option<String>,
    pub updated_at: DateTime<Utc>,
}

struct PlannerState {
    phase: PlannerPhase,
    goal: Option<Goal>,
    /// Bumped by `back_to_selection`; results from older generations are dropped.
    generation: u64,
    input: Option<AffordabilityInput>,
    projection: Option<AffordabilityProjection>,
    listings: Vec<HouseListing>,
    search_status: SearchStatus,
    search_location: Option<String>,
    /// Sequence of the most recently issued search.
    search_seq: u64,
    analysis_task: Option<AbortHandle>,
    search_tasks: Vec<JoinHandle<()>>,
    updated_at: DateTime<Utc>,
}

impl PlannerState {
    fn new() -> Self {
        Self {
            phase: PlannerPhase::Idle,
            goal: None,
            generation: 0,
            input: None,
            projection: None,
            listings: Vec::new(),
            search_status: SearchStatus::Idle,
            search_location: None,
            search_seq: 0,
            analysis_task: None,
            search_tasks: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Drives one house affordability plan.
pub struct AffordabilityPlanner {
    id: Uuid,
    services: PlannerServices,
    settings: PlannerSettings,
    state: Arc<Mutex<PlannerState>>,
}

/// What spawned work needs to write results back into a plan.
#[derive(Clone)]
struct PlanHandle {
    id: Uuid,
    search: Arc<dyn HouseSearchService>,
    state: Arc<Mutex<PlannerState>>,
}

impl AffordabilityPlanner {
    pub fn new(services: PlannerServices, settings: PlannerSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            services,
            settings,
            state: Arc::new(Mutex::new(PlannerState::new())),
        }
    }

    fn handle(&self) -> PlanHandle {
        PlanHandle {
            id: self.id,
            search: Arc::clone(&self.services.search),
            state: Arc::clone(&self.state),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn phase(&self) -> PlannerPhase {
        self.state.lock().await.phase
    }

    pub async fn snapshot(&self) -> PlanSnapshot {
        let state = self.state.lock().await;
        PlanSnapshot {
            id: self.id,
            phase: state.phase,
            goal: state.goal,
            input: state.input.clone(),
            risk: state.input.as_ref().map(|i| i.risk_tolerance.into()),
            projection: state.projection.clone(),
            listings: state.listings.clone(),
            search_status: state.search_status,
            search_location: state.search_location.clone(),
            updated_at: state.updated_at,
        }
    }

    /// Opens the input form for the house goal.
    pub async fn select_goal(&self, goal: Goal) -> Result<(), AppError> {
        if goal != Goal::House {
            return Err(AppError::BadRequest(
                "Only the house goal has a planning workflow".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        match state.phase {
            PlannerPhase::Idle => {
                state.phase = PlannerPhase::CollectingInput;
                state.goal = Some(goal);
                state.touch();
                tracing::info!(plan = %self.id, "House goal selected, collecting input");
                Ok(())
            }
            PlannerPhase::CollectingInput => Ok(()),
            other => Err(AppError::Conflict(format!(
                "Cannot choose a goal while {}",
                other.as_str()
            ))),
        }
    }

    /// Validates the form and produces a projection.
    ///
    /// Service errors and timeouts resolve to a local estimate. The only
    /// errors are validation, a wrong phase, or a reset while analyzing.
    ///
    /// The move to `results-ready` happens in a spawned task, so a caller
    /// that stops waiting still leaves the plan with its projection.
    pub async fn submit_analysis(
        &self,
        form: &AffordabilityForm,
    ) -> Result<AffordabilityProjection, AppError> {
        let publisher = {
            let mut state = self.state.lock().await;
            if state.phase != PlannerPhase::CollectingInput {
                return Err(AppError::Conflict(format!(
                    "Cannot submit an analysis while {}",
                    state.phase.as_str()
                )));
            }
            let input = form.validate(&self.settings.default_location)?;

            state.phase = PlannerPhase::Analyzing;
            state.input = Some(input.clone());
            state.touch();

            tracing::info!(
                plan = %self.id,
                "Starting analysis: income={} rent={} risk={} location={}",
                input.monthly_income,
                input.monthly_rent,
                input.risk_tolerance,
                input.location
            );

            let analysis = tokio::spawn(run_analysis(
                self.services.clone(),
                input.clone(),
                self.settings.analysis_timeout,
            ));
            state.analysis_task = Some(analysis.abort_handle());

            let handle = self.handle();
            let generation = state.generation;
            tokio::spawn(async move {
                let projection = match analysis.await {
                    Ok(projection) => projection,
                    Err(e) if e.is_cancelled() => return None,
                    Err(e) => {
                        tracing::error!(plan = %handle.id, "Analysis task failed: {}", e);
                        projection::fallback_projection(
                            &input,
                            None,
                            &FallbackReason::Unavailable(e.to_string()),
                        )
                    }
                };
                handle.publish(generation, &input, projection).await
            })
        };

        match publisher.await {
            Ok(Some(projection)) => Ok(projection),
            Ok(None) => Err(AppError::Cancelled(
                "Analysis discarded by returning to goal selection".to_string(),
            )),
            Err(e) => Err(AppError::InternalError(format!(
                "Analysis publisher failed: {}",
                e
            ))),
        }
    }

    /// Starts a listing search for `location` with `down_payment`.
    ///
    /// Only valid once results are ready. Replaces any earlier search.
    pub async fn search_houses(&self, location: &str, down_payment: f64) -> Result<(), AppError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(AppError::BadRequest("location cannot be empty".to_string()));
        }
        if !(down_payment.is_finite() && down_payment > 0.0) {
            return Err(AppError::BadRequest(
                "down payment must be greater than zero".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        if state.phase != PlannerPhase::ResultsReady {
            return Err(AppError::Conflict(format!(
                "Cannot search houses while {}",
                state.phase.as_str()
            )));
        }
        self.handle()
            .start_search(&mut state, location.to_string(), down_payment);
        Ok(())
    }

    /// Changes the location after results are shown and searches again with
    /// the same down payment.
    pub async fn edit_location(&self, location: &str) -> Result<(), AppError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(AppError::BadRequest("location cannot be empty".to_string()));
        }

        let mut state = self.state.lock().await;
        if state.phase != PlannerPhase::ResultsReady {
            return Err(AppError::Conflict(format!(
                "Cannot change location while {}",
                state.phase.as_str()
            )));
        }

        if let Some(input) = state.input.as_mut() {
            input.location = location.to_string();
        }
        let down_payment = state
            .projection
            .as_ref()
            .map(|p| p.projected_value_5_years)
            .unwrap_or(0.0);
        state.touch();

        self.handle()
            .start_search(&mut state, location.to_string(), down_payment);
        Ok(())
    }

    /// Returns to goal selection, discarding input, projection and listings.
    ///
    /// An in-flight analysis is aborted. In-flight searches keep running but
    /// their results are ignored.
    pub async fn back_to_selection(&self) {
        let mut state = self.state.lock().await;
        if let Some(task) = state.analysis_task.take() {
            task.abort();
        }
        state.generation += 1;
        state.phase = PlannerPhase::Idle;
        state.goal = None;
        state.input = None;
        state.projection = None;
        state.listings.clear();
        state.search_status = SearchStatus::Idle;
        state.search_location = None;
        state.touch();
        tracing::info!(plan = %self.id, "Returned to goal selection");
    }

    /// Waits until every issued search has finished.
    pub async fn wait_for_searches(&self) {
        loop {
            let tasks = {
                let mut state = self.state.lock().await;
                std::mem::take(&mut state.search_tasks)
            };
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::warn!(plan = %self.id, "Search task ended abnormally: {}", e);
                }
            }
        }
    }
}

impl PlanHandle {
    /// Stores a finished projection and starts the follow-up search.
    ///
    /// Returns `None` when the plan was reset after the analysis started.
    async fn publish(
        &self,
        generation: u64,
        input: &AffordabilityInput,
        projection: AffordabilityProjection,
    ) -> Option<AffordabilityProjection> {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            tracing::debug!(plan = %self.id, "Dropping analysis from an earlier generation");
            return None;
        }

        state.analysis_task = None;
        state.phase = PlannerPhase::ResultsReady;
        state.projection = Some(projection.clone());
        state.touch();

        tracing::info!(
            plan = %self.id,
            "Analysis ready ({:?}): savings={:.2}/month projected={:.2}",
            projection.data_source,
            projection.monthly_savings,
            projection.projected_value_5_years
        );

        self.start_search(
            &mut state,
            input.location.clone(),
            projection.projected_value_5_years,
        );
        Some(projection)
    }

    /// Issues a search under the caller's lock. Returns whether one started.
    fn start_search(&self, state: &mut PlannerState, location: String, down_payment: f64) -> bool {
        let location = location.trim().to_string();
        if !(down_payment.is_finite() && down_payment > 0.0) || location.is_empty() {
            tracing::info!(
                plan = %self.id,
                "No down payment to search with ({:.2}), skipping house search",
                down_payment
            );
            state.search_status = SearchStatus::Idle;
            state.listings.clear();
            return false;
        }

        state.search_seq += 1;
        let seq = state.search_seq;
        let generation = state.generation;
        state.search_status = SearchStatus::Searching;
        state.search_location = Some(location.clone());
        state.listings.clear();

        let search = Arc::clone(&self.search);
        let shared = Arc::clone(&self.state);
        let plan_id = self.id;

        tracing::info!(
            plan = %plan_id,
            "House search #{} for {} with ${:.0} down",
            seq,
            location,
            down_payment
        );

        let task = tokio::spawn(async move {
            let listings = match search.search(&location, down_payment).await {
                Ok(listings) => listings,
                Err(e) => {
                    tracing::warn!(plan = %plan_id, "House search for {} failed: {}", location, e);
                    Vec::new()
                }
            };

            let mut state = shared.lock().await;
            if state.generation != generation || state.search_seq != seq {
                tracing::debug!(
                    plan = %plan_id,
                    "Discarding stale house search #{} for {}",
                    seq,
                    location
                );
                return;
            }
            tracing::info!(
                plan = %plan_id,
                "House search #{} found {} listings",
                seq,
                listings.len()
            );
            state.listings = listings;
            state.search_status = SearchStatus::Complete;
            state.touch();
        });

        state.search_tasks.retain(|t| !t.is_finished());
        state.search_tasks.push(task);
        true
    }
}

/// One analysis attempt bounded by `ceiling`, ending in a projection either way.
async fn run_analysis(
    services: PlannerServices,
    input: AffordabilityInput,
    ceiling: Duration,
) -> AffordabilityProjection {
    let deadline = Instant::now() + ceiling;

    let observed = match (&services.history, input.monthly_credit_card_spend) {
        (Some(history), None) => {
            match tokio::time::timeout_at(deadline, history.monthly_credit_card_spend()).await {
                Ok(Ok(observed)) => observed,
                Ok(Err(e)) => {
                    tracing::warn!("Spending history unavailable: {}", e);
                    None
                }
                Err(_) => {
                    tracing::warn!("Spending history lookup used up the analysis timeout");
                    None
                }
            }
        }
        _ => None,
    };

    let known = projection::known_credit_card(&input, observed);
    let request = HouseAnalysisRequest::new(&input, known.map(|(amount, _)| amount));

    let call = services.analysis.analyze(&request, deadline);
    let reason = match tokio::time::timeout_at(deadline, call).await {
        Ok(Ok(response)) => {
            let (credit_card, source) = projection::resolve_credit_card(&input, observed);
            match response.into_projection(&input, credit_card, source) {
                Some(projection) => return projection,
                None => FallbackReason::IncompleteResponse,
            }
        }
        Ok(Err(e)) if e.is_timeout() => FallbackReason::Timeout {
            seconds: ceiling.as_secs(),
        },
        Ok(Err(e)) => FallbackReason::Unavailable(e.to_string()),
        Err(_) => FallbackReason::Timeout {
            seconds: ceiling.as_secs(),
        },
    };

    tracing::warn!("Analysis service failed ({:?}), using local estimate", reason);
    projection::fallback_projection(&input, observed, &reason)
}

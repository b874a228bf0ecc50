//! Reporter that synchronizes test results to TestRail.
//!
//! # Lifecycle
//!
//! ```text
//!   Idle ──run begin──► Collecting ──run end──► Published
//!                          │   ▲
//!                          └───┘ pass / fail / pending
//! ```
//!
//! - **run begin**: attach to the plan or run remembered in the run cache.
//!   In plan mode a new plan is created (and cached) when none is
//!   remembered; in run mode creation waits for the run end, when the
//!   observed cases are known.
//! - **pass / fail / pending**: the title's case ids each get a
//!   [`CaseResult`]. Nothing is sent yet.
//! - **run end**: create the run or plan entry for exactly the observed
//!   cases (unless one was reused), publish every result, log a link.
//!
//! Configuration is validated when the reporter is constructed, so a
//! missing option fails before the first event is handled. Everything after
//! that is logged rather than returned: TestRail problems never fail the
//! test run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::Reporter;
use crate::api::types::PlanEntryRun;
use crate::api::{ApiError, CaseResult, TestRailApi, Transport};
use crate::cache::{FileCache, RunCache, keys};
use crate::case_id::title_to_case_ids;
use crate::config::{ConfigError, Mode, ReporterConfig, ReporterOptions};
use crate::status::Status;

const DEFAULT_DESCRIPTION: &str = "Automated test results reported by testrail-reporter";

/// Errors raised while constructing a [`TestRailReporter`].
#[derive(Debug, thiserror::Error)]
pub enum ReporterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to set up TestRail client: {0}")]
    Client(#[from] ApiError),
}

/// Outcome of a published run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of results TestRail accepted.
    pub published: usize,
    /// Web URL of the plan or run.
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Collecting,
    Published,
}

struct State {
    api: TestRailApi,
    phase: Phase,
    results: Vec<CaseResult>,
    summary: Option<RunSummary>,
}

/// Reports test results to TestRail.
///
/// One reporter serves one test run.
pub struct TestRailReporter {
    config: Arc<ReporterConfig>,
    cache: Arc<dyn RunCache>,
    name: String,
    state: Mutex<State>,
}

impl TestRailReporter {
    /// Creates a reporter talking to TestRail over HTTP, with the run cache
    /// stored in the configured cache directory.
    pub fn new(options: &ReporterOptions) -> Result<Self, ReporterError> {
        let config = Arc::new(options.validate()?);
        let cache: Arc<dyn RunCache> = Arc::new(FileCache::open(&config.cache_dir));
        let api = TestRailApi::connect(config.clone(), cache.clone())?;
        Ok(Self::from_parts(config, cache, api))
    }

    /// Creates a reporter with an explicit transport and cache.
    pub fn with_transport(
        options: &ReporterOptions,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn RunCache>,
    ) -> Result<Self, ConfigError> {
        let config = Arc::new(options.validate()?);
        let api = TestRailApi::new(config.clone(), transport, cache.clone());
        Ok(Self::from_parts(config, cache, api))
    }

    fn from_parts(config: Arc<ReporterConfig>, cache: Arc<dyn RunCache>, api: TestRailApi) -> Self {
        let name = config.name.clone().unwrap_or_else(|| {
            format!(
                "Automated test run {}",
                chrono::Local::now().format("%b %-d %Y, %H:%M (%:z)")
            )
        });

        Self {
            config,
            cache,
            name,
            state: Mutex::new(State {
                api,
                phase: Phase::Idle,
                results: Vec::new(),
                summary: None,
            }),
        }
    }

    /// Name used for the created plan or run.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Results collected so far.
    pub async fn results(&self) -> Vec<CaseResult> {
        self.state.lock().await.results.clone()
    }

    /// Summary of the published run, once the run has ended.
    pub async fn summary(&self) -> Option<RunSummary> {
        self.state.lock().await.summary.clone()
    }

    fn description(&self) -> &str {
        self.config
            .description
            .as_deref()
            .unwrap_or(DEFAULT_DESCRIPTION)
    }

    fn cache_id(&self, key: &str, id: u64) {
        if let Err(e) = self.cache.store(key, id.into()) {
            error!(
                "Failed to cache TestRail {} {}: {}. A later invocation will create a new one.",
                key, id, e
            );
        }
    }

    async fn begin(&self, state: &mut State) {
        state.phase = Phase::Collecting;

        match &self.config.mode {
            Mode::Plan { milestone_id, .. } => {
                if let Some(plan_id) = self.cache.retrieve_as::<u64>(keys::PLAN_ID) {
                    info!("Using existing TestRail plan with ID: {}", plan_id);
                    state.api.set_plan_id(plan_id);
                } else {
                    info!("Creating TestRail plan with name: '{}'", self.name);
                    match state
                        .api
                        .create_plan(&self.name, self.description(), *milestone_id)
                        .await
                    {
                        Ok(plan_id) => self.cache_id(keys::PLAN_ID, plan_id),
                        Err(e) => error!("Failed to create TestRail plan: {}", e),
                    }
                }

                if let Some(run_id) = state
                    .api
                    .plan_id()
                    .and_then(|plan_id| self.cached_entry_run(plan_id))
                {
                    info!("Using existing TestRail run with ID: {}", run_id);
                    state.api.set_run_id(run_id);
                }
            }
            Mode::Run { .. } => {
                if let Some(run_id) = self.cache.retrieve_as::<u64>(keys::RUN_ID) {
                    info!("Using existing TestRail run with ID: {}", run_id);
                    state.api.set_run_id(run_id);
                } else {
                    debug!("No cached TestRail run, one is created when the run ends");
                }
            }
        }
    }

    /// Run of a plan entry created by an earlier invocation against `plan_id`.
    fn cached_entry_run(&self, plan_id: u64) -> Option<u64> {
        match &self.config.mode {
            Mode::Plan {
                entry_suite_id: Some(_),
                ..
            } => self
                .cache
                .retrieve_as::<PlanEntryRun>(keys::RUN_ID)
                .filter(|cached| cached.plan_id == plan_id)
                .map(|cached| cached.run_id),
            _ => None,
        }
    }

    async fn record(&self, title: &str, status: Status, comment: &str) {
        let case_ids = title_to_case_ids(title);
        if case_ids.is_empty() {
            debug!("No case ids in '{}'", title);
            return;
        }

        let mut state = self.state.lock().await;
        if state.phase == Phase::Published {
            warn!("Ignoring result of '{}' received after the run ended", title);
            return;
        }

        state.results.extend(
            case_ids
                .iter()
                .map(|&case_id| CaseResult::new(case_id, status, comment)),
        );

        debug!(
            "Recorded {} for [{}]",
            status,
            case_ids
                .iter()
                .map(|id| format!("C{}", id))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    /// Makes sure the client has a run (or plan) to publish into.
    ///
    /// Returns `false` when publishing has to be skipped.
    async fn prepare_target(&self, state: &mut State, case_ids: &[u64]) -> bool {
        match &self.config.mode {
            Mode::Run { suite_id } => {
                if state.api.run_id().is_some() {
                    return true;
                }
                info!(
                    "Creating TestRail run with name: '{}' from suite {}",
                    self.name, suite_id
                );
                match state
                    .api
                    .create_run(&self.name, self.description(), case_ids)
                    .await
                {
                    Ok(run_id) => {
                        self.cache_id(keys::RUN_ID, run_id);
                        true
                    }
                    Err(e) => {
                        error!("Failed to create TestRail run, results are not published: {}", e);
                        false
                    }
                }
            }
            Mode::Plan {
                entry_suite_id: Some(suite_id),
                ..
            } => {
                if state.api.run_id().is_some() {
                    return true;
                }
                let Some(plan_id) = state.api.plan_id() else {
                    error!("No TestRail plan available, results are not published");
                    return false;
                };
                info!(
                    "Adding entry '{}' for suite {} to TestRail plan",
                    self.name, suite_id
                );
                match state
                    .api
                    .create_plan_entry(&self.name, self.description(), case_ids)
                    .await
                {
                    Ok(run_id) => {
                        let cached = PlanEntryRun { plan_id, run_id };
                        if let Err(e) = self.cache.store_as(keys::RUN_ID, &cached) {
                            error!(
                                "Failed to cache TestRail run {}: {}. A later invocation will create a new one.",
                                run_id, e
                            );
                        }
                        true
                    }
                    Err(e) => {
                        error!(
                            "Failed to create TestRail plan entry, results are not published: {}",
                            e
                        );
                        false
                    }
                }
            }
            Mode::Plan {
                entry_suite_id: None,
                ..
            } => {
                if state.api.plan_id().is_none() {
                    error!("No TestRail plan available, results are not published");
                    return false;
                }
                true
            }
        }
    }

    async fn finish(&self, state: &mut State) {
        if state.results.is_empty() {
            warn!(
                "No test cases were matched with TestRail. Ensure that test titles contain case ids in the format C1234"
            );
            return;
        }

        let mut case_ids: Vec<u64> = Vec::new();
        for result in &state.results {
            if !case_ids.contains(&result.case_id) {
                case_ids.push(result.case_id);
            }
        }

        if !self.prepare_target(state, &case_ids).await {
            return;
        }

        let published = match state.api.publish_results(&state.results).await {
            Ok(published) => published,
            Err(e) => {
                error!("Failed to publish results to TestRail: {}", e);
                return;
            }
        };

        let id = if self.config.mode.is_plan() {
            state.api.plan_id()
        } else {
            state.api.run_id()
        };

        if let Some(id) = id {
            let url = self.config.view_url(id);
            info!(
                "{} results are published to {}",
                published,
                console::style(&url).magenta()
            );
            state.summary = Some(RunSummary { published, url });
        }
    }
}

#[async_trait]
impl Reporter for TestRailReporter {
    async fn on_run_begin(&self) {
        let mut state = self.state.lock().await;
        if state.phase != Phase::Idle {
            warn!("Ignoring repeated run begin");
            return;
        }
        self.begin(&mut state).await;
    }

    async fn on_test_pass(&self, title: &str, duration: Option<Duration>) {
        let comment = match duration {
            Some(d) => format!("Execution time: {}ms", d.as_millis()),
            None => "Passed".to_string(),
        };
        self.record(title, Status::Passed, &comment).await;
    }

    async fn on_test_fail(&self, title: &str, error: &str) {
        self.record(title, self.config.failed_status, error).await;
    }

    async fn on_test_pending(&self, title: &str, reason: Option<&str>) {
        let Some(status) = self.config.pending_status else {
            debug!("Not reporting pending test '{}'", title);
            return;
        };
        self.record(title, status, reason.unwrap_or("Test pending"))
            .await;
    }

    async fn on_run_end(&self) {
        let mut state = self.state.lock().await;
        match state.phase {
            Phase::Published => {
                warn!("Ignoring repeated run end");
                return;
            }
            Phase::Idle => self.begin(&mut state).await,
            Phase::Collecting => {}
        }

        state.phase = Phase::Published;
        self.finish(&mut state).await;
    }
}

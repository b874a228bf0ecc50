//! TestRail API client.
//!
//! Wraps the handful of TestRail endpoints the reporter needs. All calls go
//! to `<host>/index.php?/api/v2/<action>/<url_data>` through a [`Transport`]
//! and share the same response handling:
//!
//! 1. A rate-limited response (`API Rate Limit Exceeded` in the `error`
//!    field, or HTTP 429) waits out the [`RateLimitPolicy`] cooldown and
//!    retries the identical request.
//! 2. Any other `error` field is an [`ApiError::Remote`].
//! 3. A non-2xx status without an `error` field is an [`ApiError::Status`].
//!
//! The client remembers the plan and run it works on. They are either
//! created through it or handed in from the run cache by the reporter.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use testrail_reporter::api::TestRailApi;
//! use testrail_reporter::cache::MemoryCache;
//! use testrail_reporter::config::load_config_str;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = load_config_str(r#"
//!     [testrail]
//!     host = "https://example.testrail.io"
//!     username = "ci@example.com"
//!     password = "secret"
//!     project_id = 3
//!     suite_id = 1
//! "#)?.testrail.validate()?;
//!
//! let mut api = TestRailApi::connect(Arc::new(config), Arc::new(MemoryCache::new()))?;
//! let run_id = api.create_run("Nightly", "Automated results", &[100, 200]).await?;
//! println!("Created run {}", run_id);
//! # Ok(())
//! # }
//! ```

pub mod retry;
pub mod transport;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::{RunCache, keys};
use crate::config::{Mode, ReporterConfig};

pub use retry::RateLimitPolicy;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};
pub use types::{CaseResult, RemotePlan, RemotePlanEntry, RemoteRun, RemoteTest};

use types::{
    NewPlan, NewPlanEntry, NewPlanRun, NewResult, NewRun, PlanRuns, PlanTests,
    ResultsForCases, TestsPage,
};

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by the TestRail client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request could not be sent or the response not read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// TestRail answered with an `error` field.
    #[error("TestRail API error: {0}")]
    Remote(String),

    /// TestRail answered with a failure status and no `error` field.
    #[error("TestRail returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The retry bound of the rate-limit policy was reached.
    #[error("TestRail API rate limit still exceeded after {0} retries")]
    RateLimited(u32),

    /// The response did not have the expected shape.
    #[error("Unexpected response from {action}: {reason}")]
    UnexpectedResponse { action: String, reason: String },

    /// The operation needs a plan or run that does not exist yet.
    #[error("No TestRail {0} id available")]
    MissingId(&'static str),
}

const API_PATH: &str = "index.php?/api/v2";

/// Client for the TestRail API.
pub struct TestRailApi {
    config: Arc<ReporterConfig>,
    transport: Arc<dyn Transport>,
    cache: Arc<dyn RunCache>,
    base: String,
    plan_id: Option<u64>,
    run_id: Option<u64>,
}

impl TestRailApi {
    /// Creates a client sending requests through `transport`.
    pub fn new(
        config: Arc<ReporterConfig>,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn RunCache>,
    ) -> Self {
        let base = format!("{}/{}", config.host, API_PATH);
        Self {
            config,
            transport,
            cache,
            base,
            plan_id: None,
            run_id: None,
        }
    }

    /// Creates a client using [`HttpTransport`] with the configured
    /// credentials and timeout.
    pub fn connect(config: Arc<ReporterConfig>, cache: Arc<dyn RunCache>) -> ApiResult<Self> {
        let transport = HttpTransport::new(config.credentials.clone(), config.request_timeout)?;
        Ok(Self::new(config, Arc::new(transport), cache))
    }

    pub fn plan_id(&self) -> Option<u64> {
        self.plan_id
    }

    pub fn run_id(&self) -> Option<u64> {
        self.run_id
    }

    /// Attaches the client to an existing plan.
    pub fn set_plan_id(&mut self, plan_id: u64) {
        self.plan_id = Some(plan_id);
    }

    /// Attaches the client to an existing run.
    pub fn set_run_id(&mut self, run_id: u64) {
        self.run_id = Some(run_id);
    }

    /// Creates a plan with one `include_all` entry per configured suite.
    pub async fn create_plan(
        &mut self,
        name: &str,
        description: &str,
        milestone_id: Option<u64>,
    ) -> ApiResult<u64> {
        let suite_ids = match &self.config.mode {
            Mode::Plan { suite_ids, .. } => suite_ids.clone(),
            Mode::Run { suite_id } => vec![*suite_id],
        };

        let entries = suite_ids
            .iter()
            .map(|&suite_id| NewPlanEntry {
                suite_id,
                name: format!("{} - Suite {}", name, suite_id),
                description: None,
                assignedto_id: None,
                include_all: true,
                case_ids: None,
                runs: Vec::new(),
            })
            .collect();

        let data = NewPlan {
            name,
            description,
            milestone_id,
            entries,
        };

        let plan: RemotePlan = self
            .post("add_plan", &self.config.project_id.to_string(), &data)
            .await?;

        info!("Created TestRail plan {}", plan.id);
        self.plan_id = Some(plan.id);
        Ok(plan.id)
    }

    /// Adds an entry scoped to `case_ids` to the current plan and makes its
    /// first run the active run.
    pub async fn create_plan_entry(
        &mut self,
        name: &str,
        description: &str,
        case_ids: &[u64],
    ) -> ApiResult<u64> {
        let plan_id = self.plan_id.ok_or(ApiError::MissingId("plan"))?;

        let data = NewPlanEntry {
            suite_id: self.entry_suite_id(),
            name: name.to_string(),
            description: Some(description),
            assignedto_id: self.config.assigned_to_id,
            include_all: false,
            case_ids: Some(case_ids),
            runs: vec![NewPlanRun {
                include_all: false,
                case_ids,
            }],
        };

        let entry: RemotePlanEntry = self
            .post("add_plan_entry", &plan_id.to_string(), &data)
            .await?;

        let run_id = entry
            .runs
            .first()
            .map(|run| run.id)
            .ok_or_else(|| ApiError::UnexpectedResponse {
                action: "add_plan_entry".to_string(),
                reason: "plan entry contains no runs".to_string(),
            })?;

        info!("Created TestRail plan entry with run {} in plan {}", run_id, plan_id);
        self.run_id = Some(run_id);
        Ok(run_id)
    }

    /// Creates a run scoped to the configured suite and `case_ids`.
    pub async fn create_run(
        &mut self,
        name: &str,
        description: &str,
        case_ids: &[u64],
    ) -> ApiResult<u64> {
        let data = NewRun {
            suite_id: self.entry_suite_id(),
            name,
            description,
            assignedto_id: self.config.assigned_to_id,
            include_all: false,
            case_ids,
        };

        let run: RemoteRun = self
            .post("add_run", &self.config.project_id.to_string(), &data)
            .await?;

        info!("Created TestRail run {}", run.id);
        self.run_id = Some(run.id);
        Ok(run.id)
    }

    /// Publishes `results` and returns how many results were accepted.
    ///
    /// Runs and plan entries receive one `add_results_for_cases` batch. A
    /// plan without an entry suite has no run of its own, so each case is
    /// matched to the tests of the plan's runs and gets one `add_result`
    /// per matching test; unmatched cases are skipped.
    pub async fn publish_results(&self, results: &[CaseResult]) -> ApiResult<usize> {
        match &self.config.mode {
            Mode::Plan {
                entry_suite_id: None,
                ..
            } => self.publish_to_plan_tests(results).await,
            Mode::Plan { .. } | Mode::Run { .. } => self.publish_batch(results).await,
        }
    }

    async fn publish_batch(&self, results: &[CaseResult]) -> ApiResult<usize> {
        let run_id = self.run_id.ok_or(ApiError::MissingId("run"))?;

        let _: Value = self
            .post(
                "add_results_for_cases",
                &run_id.to_string(),
                &ResultsForCases { results },
            )
            .await?;

        debug!("Published {} results to run {}", results.len(), run_id);
        Ok(results.len())
    }

    async fn publish_to_plan_tests(&self, results: &[CaseResult]) -> ApiResult<usize> {
        let plan_id = self.plan_id.ok_or(ApiError::MissingId("plan"))?;
        let tests = self.plan_tests(plan_id).await?;

        let mut published = 0;
        for result in results {
            let Some(test_ids) = tests.get(&result.case_id) else {
                warn!(
                    "Case C{} is not part of plan {}, skipping its result",
                    result.case_id, plan_id
                );
                continue;
            };

            for test_id in test_ids {
                let data = NewResult {
                    status_id: result.status_id,
                    comment: &result.comment,
                };
                match self.post::<_, Value>("add_result", &test_id.to_string(), &data).await {
                    Ok(_) => published += 1,
                    Err(e) => error!(
                        "Failed to publish result for case C{} (test {}): {}",
                        result.case_id, test_id, e
                    ),
                }
            }
        }

        Ok(published)
    }

    /// Maps case ids to test ids across every run of `plan_id`.
    ///
    /// The mapping and the plan's run ids are kept in the run cache so a
    /// repeated invocation against the same plan skips the lookups.
    async fn plan_tests(&self, plan_id: u64) -> ApiResult<BTreeMap<u64, Vec<u64>>> {
        if let Some(cached) = self
            .cache
            .retrieve_as::<PlanTests>(keys::TESTS)
            .filter(|cached| cached.plan_id == plan_id)
        {
            debug!("Using cached tests of plan {}", plan_id);
            return Ok(cached.tests);
        }

        let run_ids = self.plan_run_ids(plan_id).await?;

        let mut tests: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
        for run_id in run_ids {
            for test in self.get_tests(run_id).await? {
                if let Some(case_id) = test.case_id {
                    tests.entry(case_id).or_default().push(test.id);
                }
            }
        }

        let cached = PlanTests {
            plan_id,
            tests: tests.clone(),
        };
        if let Err(e) = self.cache.store_as(keys::TESTS, &cached) {
            error!("Failed to cache tests of plan {}: {}", plan_id, e);
        }

        Ok(tests)
    }

    async fn plan_run_ids(&self, plan_id: u64) -> ApiResult<Vec<u64>> {
        if let Some(cached) = self
            .cache
            .retrieve_as::<PlanRuns>(keys::RUNS)
            .filter(|cached| cached.plan_id == plan_id)
        {
            return Ok(cached.run_ids);
        }

        let plan = self.get_plan(plan_id).await?;
        let run_ids: Vec<u64> = plan
            .entries
            .iter()
            .flat_map(|entry| entry.runs.iter().map(|run| run.id))
            .collect();

        let cached = PlanRuns {
            plan_id,
            run_ids: run_ids.clone(),
        };
        if let Err(e) = self.cache.store_as(keys::RUNS, &cached) {
            error!("Failed to cache runs of plan {}: {}", plan_id, e);
        }

        Ok(run_ids)
    }

    /// Fetches a plan with its entries.
    pub async fn get_plan(&self, plan_id: u64) -> ApiResult<RemotePlan> {
        self.get("get_plan", &plan_id.to_string()).await
    }

    /// Fetches every test of a run, following pagination links.
    pub async fn get_tests(&self, run_id: u64) -> ApiResult<Vec<RemoteTest>> {
        let mut tests = Vec::new();
        let mut path = format!("get_tests/{}", run_id);

        loop {
            let value = self.send(Method::Get, &path, None).await?;
            let page: TestsPage = decode("get_tests", value)?;

            match page {
                TestsPage::Bare(page_tests) => {
                    tests.extend(page_tests);
                    break;
                }
                TestsPage::Paged {
                    tests: page_tests,
                    links,
                } => {
                    tests.extend(page_tests);
                    match links.next.as_deref().and_then(next_page_path) {
                        Some(next) => path = next,
                        None => break,
                    }
                }
            }
        }

        debug!("Fetched {} tests of run {}", tests.len(), run_id);
        Ok(tests)
    }

    /// Deletes the current plan (plan mode) or run (run mode).
    pub async fn delete_report(&mut self) -> ApiResult<()> {
        if self.config.mode.is_plan() {
            let plan_id = self.plan_id.ok_or(ApiError::MissingId("plan"))?;
            self.send(Method::Post, &format!("delete_plan/{}", plan_id), None)
                .await?;
            info!("Deleted TestRail plan {}", plan_id);
            self.plan_id = None;
        } else {
            let run_id = self.run_id.ok_or(ApiError::MissingId("run"))?;
            self.send(Method::Post, &format!("delete_run/{}", run_id), None)
                .await?;
            info!("Deleted TestRail run {}", run_id);
        }
        self.run_id = None;
        Ok(())
    }

    fn entry_suite_id(&self) -> u64 {
        match &self.config.mode {
            Mode::Run { suite_id } => *suite_id,
            Mode::Plan {
                entry_suite_id: Some(suite_id),
                ..
            } => *suite_id,
            Mode::Plan { suite_ids, .. } => suite_ids.first().copied().unwrap_or_default(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, action: &str, url_data: &str) -> ApiResult<T> {
        let value = self
            .send(Method::Get, &format!("{}/{}", action, url_data), None)
            .await?;
        decode(action, value)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        action: &str,
        url_data: &str,
        data: &B,
    ) -> ApiResult<T> {
        let body = serde_json::to_value(data).map_err(|e| ApiError::UnexpectedResponse {
            action: action.to_string(),
            reason: format!("failed to encode request: {}", e),
        })?;
        let value = self
            .send(Method::Post, &format!("{}/{}", action, url_data), Some(body))
            .await?;
        decode(action, value)
    }

    /// Sends one API call, waiting out rate limits.
    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> ApiResult<Value> {
        let request = ApiRequest {
            method,
            url: format!("{}/{}", self.base, path),
            body,
        };
        let policy = self.config.rate_limit;
        let mut retries = 0;

        loop {
            let response = self.transport.send(&request).await?;
            let error = response.error_message();

            if retry::is_rate_limited(response.status, error.as_deref()) {
                if !policy.should_retry(retries) {
                    return Err(ApiError::RateLimited(retries));
                }
                warn!(
                    "TestRail API rate limit reached: waiting {}s and then retrying {}",
                    policy.cooldown.as_secs(),
                    request.action()
                );
                tokio::time::sleep(policy.cooldown).await;
                retries += 1;
                continue;
            }

            if let Some(error) = error {
                return Err(ApiError::Remote(error));
            }

            if !response.is_success() {
                return Err(ApiError::Status {
                    status: response.status,
                    body: match response.body {
                        Value::String(s) => s,
                        other => other.to_string(),
                    },
                });
            }

            return Ok(response.body);
        }
    }
}

fn decode<T: DeserializeOwned>(action: &str, value: Value) -> ApiResult<T> {
    serde_json::from_value(value).map_err(|e| ApiError::UnexpectedResponse {
        action: action.to_string(),
        reason: e.to_string(),
    })
}

/// Turns a pagination link such as `/api/v2/get_tests/5&limit=250&offset=250`
/// into a path relative to the API base.
fn next_page_path(link: &str) -> Option<String> {
    link.split_once("/api/v2/")
        .map(|(_, rest)| rest.to_string())
        .filter(|rest| !rest.is_empty())
}

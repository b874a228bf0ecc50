//! Configuration schema definitions for the TestRail reporter.
//!
//! Two layers are defined here:
//!
//! - [`ReporterOptions`]: the raw options exactly as written in the TOML
//!   file. Every field is optional so that a missing value can be reported
//!   by name.
//! - [`ReporterConfig`]: the validated, immutable configuration produced by
//!   [`ReporterOptions::validate`] and used everywhere else.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! └── ReporterOptions [testrail]
//!     ├── host / username / password        - always required
//!     ├── project_id                         - always required
//!     ├── suite_id                           - required unless use_plan
//!     ├── suite_ids                          - required when use_plan
//!     └── naming, milestone, cache, backoff  - optional
//! ```
//!
//! Option names are snake_case; the camelCase spellings used by other
//! reporter integrations (`projectId`, `suiteIds`, `usePlan`, ...) are
//! accepted as aliases, and `domain` is accepted for `host`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::retry::RateLimitPolicy;
use crate::status::{self, Status};

/// Root configuration structure.
///
/// # TOML Structure
///
/// ```toml
/// [testrail]
/// host = "https://example.testrail.io"
/// username = "ci@example.com"
/// password = "api-key"
/// project_id = 3
/// suite_id = 1
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Reporter options.
    pub testrail: ReporterOptions,
}

/// Raw reporter options.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `use_plan` | false |
/// | `cache_dir` | `"."` |
/// | `rate_limit_cooldown_secs` | 60 |
/// | `rate_limit_max_retries` | unbounded |
/// | `request_timeout_secs` | 60 |
/// | `failed_status` | `"failed"` |
/// | `pending_status` | `"blocked"` |
/// | `report_pending` | true |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReporterOptions {
    /// Base URL of the TestRail instance. `https://` is assumed when no
    /// scheme is given.
    #[serde(alias = "domain")]
    pub host: Option<String>,

    /// TestRail user (usually an email address).
    pub username: Option<String>,

    /// Password or API key.
    pub password: Option<String>,

    #[serde(alias = "projectId")]
    pub project_id: Option<u64>,

    /// Suite used in run mode, and for plan entries in plan mode.
    #[serde(alias = "suiteId")]
    pub suite_id: Option<u64>,

    /// Suites included in a plan (plan mode).
    #[serde(alias = "suiteIds")]
    pub suite_ids: Option<Vec<u64>>,

    /// Report into a plan of runs instead of a single run.
    #[serde(default, alias = "usePlan")]
    pub use_plan: bool,

    #[serde(alias = "assignedToId")]
    pub assigned_to_id: Option<u64>,

    #[serde(alias = "runName")]
    pub run_name: Option<String>,

    #[serde(alias = "planName")]
    pub plan_name: Option<String>,

    #[serde(alias = "runDescription")]
    pub run_description: Option<String>,

    #[serde(alias = "planDescription")]
    pub plan_description: Option<String>,

    /// Milestone the created plan is attached to (plan mode).
    #[serde(alias = "milestoneId")]
    pub milestone_id: Option<u64>,

    /// Directory holding the run cache. Supports `~`.
    #[serde(alias = "cacheDir")]
    pub cache_dir: Option<String>,

    #[serde(default = "default_cooldown", alias = "rateLimitCooldownSecs")]
    pub rate_limit_cooldown_secs: u64,

    #[serde(alias = "rateLimitMaxRetries")]
    pub rate_limit_max_retries: Option<u32>,

    #[serde(default = "default_request_timeout", alias = "requestTimeoutSecs")]
    pub request_timeout_secs: u64,

    /// Status recorded for failed tests. Use `"retest"` for the legacy
    /// behavior.
    #[serde(
        default = "default_failed_status",
        with = "status::by_name",
        alias = "failedStatus"
    )]
    pub failed_status: Status,

    /// Status recorded for pending (skipped) tests.
    #[serde(
        default = "default_pending_status",
        with = "status::by_name",
        alias = "pendingStatus"
    )]
    pub pending_status: Status,

    /// Whether pending tests are reported at all.
    #[serde(default = "default_true", alias = "reportPending")]
    pub report_pending: bool,
}

impl Default for ReporterOptions {
    fn default() -> Self {
        Self {
            host: None,
            username: None,
            password: None,
            project_id: None,
            suite_id: None,
            suite_ids: None,
            use_plan: false,
            assigned_to_id: None,
            run_name: None,
            plan_name: None,
            run_description: None,
            plan_description: None,
            milestone_id: None,
            cache_dir: None,
            rate_limit_cooldown_secs: default_cooldown(),
            rate_limit_max_retries: None,
            request_timeout_secs: default_request_timeout(),
            failed_status: default_failed_status(),
            pending_status: default_pending_status(),
            report_pending: true,
        }
    }
}

fn default_cooldown() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    60
}

fn default_failed_status() -> Status {
    Status::Failed
}

fn default_pending_status() -> Status {
    Status::Blocked
}

fn default_true() -> bool {
    true
}

/// Errors raised while validating reporter options.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required option is absent or blank.
    #[error("Missing {0} value. Please update the [testrail] section of the reporter configuration")]
    MissingField(&'static str),

    /// An option is present but unusable.
    #[error("Invalid {field} value: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Credentials for HTTP basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Reporting mode, selected once at validation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Results go to a single run scoped to one suite.
    Run { suite_id: u64 },

    /// Results go to a plan with one entry per suite.
    ///
    /// With an `entry_suite_id`, each invocation adds a plan entry scoped to
    /// the observed cases and publishes to its run. Without one, results are
    /// matched against the tests of the plan's existing runs.
    Plan {
        suite_ids: Vec<u64>,
        milestone_id: Option<u64>,
        entry_suite_id: Option<u64>,
    },
}

impl Mode {
    pub fn is_plan(&self) -> bool {
        matches!(self, Mode::Plan { .. })
    }

    /// Path segment used in TestRail web URLs (`plans` or `runs`).
    pub fn view_path(&self) -> &'static str {
        match self {
            Mode::Plan { .. } => "plans",
            Mode::Run { .. } => "runs",
        }
    }
}

/// Validated reporter configuration.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Base URL without trailing slash, always with a scheme.
    pub host: String,
    pub credentials: Credentials,
    pub project_id: u64,
    pub mode: Mode,
    pub assigned_to_id: Option<u64>,
    /// Name for the created run or plan; a timestamped default is used when
    /// absent.
    pub name: Option<String>,
    pub description: Option<String>,
    pub cache_dir: PathBuf,
    pub rate_limit: RateLimitPolicy,
    pub request_timeout: Duration,
    pub failed_status: Status,
    /// `None` when pending tests are not reported.
    pub pending_status: Option<Status>,
}

impl ReporterOptions {
    /// Checks required options and builds the typed configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the first missing
    /// option, in the order host, username, password, project_id, then
    /// suite_ids or suite_id depending on `use_plan`.
    pub fn validate(&self) -> Result<ReporterConfig, ConfigError> {
        let host = required_str(&self.host, "host")?;
        let username = required_str(&self.username, "username")?;
        let password = required_str(&self.password, "password")?;
        let project_id = self.project_id.ok_or(ConfigError::MissingField("project_id"))?;

        let mode = if self.use_plan {
            let suite_ids = match &self.suite_ids {
                Some(ids) if !ids.is_empty() => ids.clone(),
                _ => return Err(ConfigError::MissingField("suite_ids")),
            };
            Mode::Plan {
                suite_ids,
                milestone_id: self.milestone_id,
                entry_suite_id: self.suite_id,
            }
        } else {
            let suite_id = self.suite_id.ok_or(ConfigError::MissingField("suite_id"))?;
            Mode::Run { suite_id }
        };

        if self.rate_limit_cooldown_secs == 0 && self.rate_limit_max_retries.is_none() {
            return Err(ConfigError::Invalid {
                field: "rate_limit_cooldown_secs",
                reason: "a zero cooldown requires rate_limit_max_retries".to_string(),
            });
        }

        let mut rate_limit = RateLimitPolicy::new(Duration::from_secs(self.rate_limit_cooldown_secs));
        if let Some(max) = self.rate_limit_max_retries {
            rate_limit = rate_limit.with_max_retries(max);
        }

        let (name, description) = if self.use_plan {
            (
                self.plan_name.clone().or_else(|| self.run_name.clone()),
                self.plan_description
                    .clone()
                    .or_else(|| self.run_description.clone()),
            )
        } else {
            (self.run_name.clone(), self.run_description.clone())
        };

        let cache_dir = match &self.cache_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).into_owned()),
            None => PathBuf::from("."),
        };

        Ok(ReporterConfig {
            host: normalize_host(&host),
            credentials: Credentials { username, password },
            project_id,
            mode,
            assigned_to_id: self.assigned_to_id,
            name,
            description,
            cache_dir,
            rate_limit,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            failed_status: self.failed_status,
            pending_status: self.report_pending.then_some(self.pending_status),
        })
    }
}

fn required_str(value: &Option<String>, field: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::MissingField(field)),
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

impl ReporterConfig {
    /// Web URL of a plan or run, e.g. `https://x.testrail.io/index.php?/runs/view/7`.
    pub fn view_url(&self, id: u64) -> String {
        format!("{}/index.php?/{}/view/{}", self.host, self.mode.view_path(), id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_options() -> ReporterOptions {
        ReporterOptions {
            host: Some("https://fake.testrail.io".to_string()),
            username: Some("foo@bar.baz".to_string()),
            password: Some("fake1234".to_string()),
            project_id: Some(3),
            suite_id: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_run_mode() {
        let config = run_options().validate().unwrap();
        assert_eq!(config.mode, Mode::Run { suite_id: 1 });
        assert_eq!(config.project_id, 3);
        assert_eq!(config.host, "https://fake.testrail.io");
        assert_eq!(config.rate_limit, RateLimitPolicy::default());
        assert_eq!(config.pending_status, Some(Status::Blocked));
    }

    #[test]
    fn test_missing_password() {
        let mut options = run_options();
        options.password = None;
        assert_eq!(
            options.validate().unwrap_err(),
            ConfigError::MissingField("password")
        );
    }

    #[test]
    fn test_blank_host_is_missing() {
        let mut options = run_options();
        options.host = Some("   ".to_string());
        assert_eq!(options.validate().unwrap_err(), ConfigError::MissingField("host"));
    }

    #[test]
    fn test_run_mode_requires_suite_id() {
        let mut options = run_options();
        options.suite_id = None;
        assert_eq!(
            options.validate().unwrap_err(),
            ConfigError::MissingField("suite_id")
        );
    }

    #[test]
    fn test_plan_mode_requires_suite_ids() {
        let mut options = run_options();
        options.use_plan = true;
        assert_eq!(
            options.validate().unwrap_err(),
            ConfigError::MissingField("suite_ids")
        );

        options.suite_ids = Some(vec![]);
        assert_eq!(
            options.validate().unwrap_err(),
            ConfigError::MissingField("suite_ids")
        );
    }

    #[test]
    fn test_plan_mode() {
        let mut options = run_options();
        options.use_plan = true;
        options.suite_id = None;
        options.suite_ids = Some(vec![1, 2]);
        options.milestone_id = Some(9);
        options.run_name = Some("run".to_string());
        options.plan_name = Some("plan".to_string());

        let config = options.validate().unwrap();
        assert_eq!(
            config.mode,
            Mode::Plan {
                suite_ids: vec![1, 2],
                milestone_id: Some(9),
                entry_suite_id: None,
            }
        );
        assert_eq!(config.name.as_deref(), Some("plan"));
        assert_eq!(config.view_url(17), "https://fake.testrail.io/index.php?/plans/view/17");
    }

    #[test]
    fn test_host_normalization() {
        let mut options = run_options();
        options.host = Some("fake.testrail.io/".to_string());
        let config = options.validate().unwrap();
        assert_eq!(config.host, "https://fake.testrail.io");
        assert_eq!(config.view_url(7), "https://fake.testrail.io/index.php?/runs/view/7");
    }

    #[test]
    fn test_report_pending_disabled() {
        let mut options = run_options();
        options.report_pending = false;
        assert_eq!(options.validate().unwrap().pending_status, None);
    }

    #[test]
    fn test_zero_cooldown_needs_bound() {
        let mut options = run_options();
        options.rate_limit_cooldown_secs = 0;
        assert!(matches!(
            options.validate().unwrap_err(),
            ConfigError::Invalid { field: "rate_limit_cooldown_secs", .. }
        ));

        options.rate_limit_max_retries = Some(3);
        let config = options.validate().unwrap();
        assert_eq!(config.rate_limit.max_retries, Some(3));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let config = run_options().validate().unwrap();
        let debug = format!("{:?}", config.credentials);
        assert!(debug.contains("foo@bar.baz"));
        assert!(!debug.contains("fake1234"));
    }

    #[test]
    fn test_deserialize_camel_case_aliases() {
        let config: Config = toml::from_str(
            r#"
            [testrail]
            domain = "fake.testrail.io"
            username = "foo@bar.baz"
            password = "fake1234"
            projectId = 3
            usePlan = true
            suiteIds = [1, 2]
            runName = "fake run name"
            failedStatus = "retest"
            "#,
        )
        .unwrap();

        let options = &config.testrail;
        assert_eq!(options.host.as_deref(), Some("fake.testrail.io"));
        assert!(options.use_plan);
        assert_eq!(options.suite_ids, Some(vec![1, 2]));
        assert_eq!(options.failed_status, Status::Retest);
        assert_eq!(options.pending_status, Status::Blocked);
        assert_eq!(options.rate_limit_cooldown_secs, 60);
        assert!(options.report_pending);
    }

    #[test]
    fn test_deserialize_rejects_unknown_status() {
        let result: Result<Config, _> = toml::from_str(
            r#"
            [testrail]
            failed_status = "skipped"
            "#,
        );
        assert!(result.is_err());
    }
}

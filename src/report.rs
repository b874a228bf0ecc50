//! Test run reporting.
//!
//! A [`Reporter`] receives the lifecycle events of a test run. The host
//! runner awaits each handler before delivering the next event, so a
//! reporter sees the run strictly in order.
//!
//! [`TestRailReporter`] is the reporter that synchronizes results to
//! TestRail.

pub mod testrail;

use std::time::Duration;

use async_trait::async_trait;

pub use testrail::{ReporterError, RunSummary, TestRailReporter};

/// A test reporter receives events during test execution.
///
/// Handlers never fail: a reporter logs its own problems so that reporting
/// can never break the test run.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Called once when the run starts, before any test event.
    async fn on_run_begin(&self);

    /// Called when a test passes.
    async fn on_test_pass(&self, title: &str, duration: Option<Duration>);

    /// Called when a test fails.
    async fn on_test_fail(&self, title: &str, error: &str);

    /// Called when a test is skipped or pending.
    async fn on_test_pending(&self, title: &str, reason: Option<&str>);

    /// Called once when all tests have completed.
    async fn on_run_end(&self);
}

//! testrail-reporter: publishes test run results to TestRail.
//!
//! A host test runner delivers run lifecycle events to a [`Reporter`]. The
//! [`TestRailReporter`] extracts case ids (`C1234`) from test titles,
//! collects one result per case, and at the end of the run creates the
//! TestRail run (or plan entry) and publishes every result in one batch.
//!
//! # Architecture
//!
//! - **Config**: TOML options, validated into a typed [`ReporterConfig`]
//! - **Api**: TestRail client with rate-limit retry, behind a transport seam
//! - **Cache**: durable key/value store linking repeated invocations to one
//!   plan or run
//! - **Report**: the reporter lifecycle
//! - **Events**: JSON-lines event stream for runners in other processes
//!
//! # Example
//!
//! ```no_run
//! use testrail_reporter::config::load_config;
//! use testrail_reporter::report::{Reporter, TestRailReporter};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config(std::path::Path::new("testrail-reporter.toml"))?;
//!     let reporter = TestRailReporter::new(&config.testrail)?;
//!
//!     reporter.on_run_begin().await;
//!     reporter.on_test_fail("checkout C1234", "expected 200, got 500").await;
//!     reporter.on_run_end().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cache;
pub mod case_id;
pub mod config;
pub mod events;
pub mod report;
pub mod status;

// Re-export commonly used types
pub use api::{ApiError, CaseResult, TestRailApi};
pub use cache::{FileCache, MemoryCache, RunCache};
pub use case_id::title_to_case_ids;
pub use config::{Config, ReporterConfig, ReporterOptions, load_config};
pub use report::{Reporter, TestRailReporter};
pub use status::Status;

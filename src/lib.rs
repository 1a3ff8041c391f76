//! Loadramp - a staged-concurrency HTTP load generator
//!
//! Loadramp grows a population of workers in fixed stages, holds peak load for
//! the rest of the run, and mixes a configurable share of login calls that
//! fuzz an authentication endpoint with a fixed set of credential scenarios.
//! Outcomes from all workers are merged into one aggregate that is reported
//! periodically and exported to a JSON file when the run ends.
//!
//! # Example
//!
//! ```rust,no_run
//! use loadramp::LoadTestBuilder;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let outcome = LoadTestBuilder::new()
//!         .base_url("http://localhost:3000")
//!         .duration(Duration::from_secs(600))
//!         .max_concurrency(20)
//!         .stages(5)
//!         .stage_duration(Duration::from_secs(60))
//!         .login_percentage(20)
//!         .run()
//!         .await?;
//!
//!     println!("{} requests, exported to {}",
//!         outcome.snapshot.total_requests,
//!         outcome.export_path.display());
//!     Ok(())
//! }
//! ```

pub mod attack;
pub mod catalog;
pub mod error;
pub mod export;
pub mod metrics;
pub mod models;
pub mod ramp;
pub mod report;
pub mod select;
mod utils;

pub use attack::{CallOutcome, RunOutcome};
pub use catalog::Catalog;
pub use error::ConfigError;
pub use metrics::{Aggregator, MetricsSnapshot};
pub use models::{EndpointDescriptor, FuzzConfig, LoginScenario, RunConfig};
pub use utils::{parse_endpoint, parse_endpoints};

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Builder for configuring and running a load test
pub struct LoadTestBuilder {
    base_url: String,
    duration: Duration,
    max_concurrency: usize,
    stages: usize,
    stage_duration: Duration,
    login_percentage: u8,
    request_timeout: Duration,
    report_interval: Duration,
    output_dir: PathBuf,
    endpoint_csv: bool,
    progress: bool,
    catalog: Option<Catalog>,
    include_sign_up: bool,
}

impl Default for LoadTestBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            duration: Duration::from_secs(50 * 60),
            max_concurrency: 20,
            stages: 5,
            stage_duration: Duration::from_secs(120),
            login_percentage: 20,
            request_timeout: Duration::from_secs(30),
            report_interval: Duration::from_secs(60),
            output_dir: PathBuf::from("."),
            endpoint_csv: false,
            progress: false,
            catalog: None,
            include_sign_up: false,
        }
    }
}

impl LoadTestBuilder {
    /// Create a new LoadTestBuilder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL of the service under test
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the total test duration
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the nominal peak number of concurrent workers
    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the number of ramp stages
    pub fn stages(mut self, stages: usize) -> Self {
        self.stages = stages;
        self
    }

    /// Set the duration of each ramp stage
    pub fn stage_duration(mut self, stage_duration: Duration) -> Self {
        self.stage_duration = stage_duration;
        self
    }

    /// Set the share of calls sent to the login endpoint (0-100)
    pub fn login_percentage(mut self, login_percentage: u8) -> Self {
        self.login_percentage = login_percentage;
        self
    }

    /// Set the per-call timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the interval between periodic reports
    pub fn report_interval(mut self, every: Duration) -> Self {
        self.report_interval = every;
        self
    }

    /// Set the directory that receives the export
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Also write the per-endpoint breakdown as CSV
    pub fn endpoint_csv(mut self, enabled: bool) -> Self {
        self.endpoint_csv = enabled;
        self
    }

    /// Show a progress bar while the run is active
    pub fn progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    /// Replace the default endpoint catalog
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Add the sign-up endpoint to the default catalog
    pub fn include_sign_up(mut self, enabled: bool) -> Self {
        self.include_sign_up = enabled;
        self
    }

    /// Build and validate the run configuration
    pub fn build(&self) -> Result<RunConfig, ConfigError> {
        let base_url = Url::parse(&self.base_url)
            .map_err(|e| ConfigError::InvalidBaseUrl(format!("{}: {e}", self.base_url)))?;
        let config = RunConfig {
            base_url,
            duration: self.duration,
            max_concurrency: self.max_concurrency,
            stages: self.stages,
            stage_duration: self.stage_duration,
            login_percentage: self.login_percentage,
            request_timeout: self.request_timeout,
            report_interval: self.report_interval,
            output_dir: self.output_dir.clone(),
            endpoint_csv: self.endpoint_csv,
            progress: self.progress,
        };
        config.validate()?;
        Ok(config)
    }

    /// Run the load test to completion
    pub async fn run(self) -> Result<RunOutcome> {
        let config = self.build()?;
        let catalog = self
            .catalog
            .unwrap_or_else(|| Catalog::with_defaults(self.include_sign_up));
        attack::run(&config, catalog).await
    }
}

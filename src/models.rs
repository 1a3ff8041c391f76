use rand::RngCore;
use reqwest::Method;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Produces a request body for one call. May draw from the random source.
pub type PayloadFn = fn(&mut dyn RngCore) -> Value;

/// Describes one callable operation on the target service
#[derive(Debug, Clone)]
pub struct EndpointDescriptor {
    /// Path relative to the base URL, e.g. `/api/v1/users`
    pub path: String,
    /// HTTP method used for every call
    pub method: Method,
    /// Optional body generator, invoked once per call
    pub payload: Option<PayloadFn>,
    /// Marks the authentication endpoint that receives login scenarios
    pub login: bool,
}

impl EndpointDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            payload: None,
            login: false,
        }
    }

    pub fn with_payload(mut self, payload: PayloadFn) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn login(method: Method, path: impl Into<String>) -> Self {
        Self {
            login: true,
            ..Self::new(method, path)
        }
    }
}

/// A named credential shape sent to the login endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginScenario {
    pub name: &'static str,
    pub username: Option<&'static str>,
    pub password: Option<&'static str>,
}

impl LoginScenario {
    /// JSON body for this scenario. Absent fields are omitted, not nulled.
    pub fn payload(&self) -> Value {
        let mut body = Map::new();
        if let Some(username) = self.username {
            body.insert("username".to_string(), Value::from(username));
        }
        if let Some(password) = self.password {
            body.insert("password".to_string(), Value::from(password));
        }
        Value::Object(body)
    }
}

/// Run parameters, fixed for the lifetime of a run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Base URL of the service under test
    pub base_url: Url,
    /// Total test duration, measured from run start
    pub duration: Duration,
    /// Nominal peak number of concurrent workers
    pub max_concurrency: usize,
    /// Number of ramp stages
    pub stages: usize,
    /// How long each ramp stage lasts
    pub stage_duration: Duration,
    /// Share of calls directed at the login endpoint (0-100)
    pub login_percentage: u8,
    /// Per-call timeout
    pub request_timeout: Duration,
    /// Interval between periodic reports
    pub report_interval: Duration,
    /// Directory that receives the export artifact
    pub output_dir: PathBuf,
    /// Also write a per-endpoint CSV next to the export
    pub endpoint_csv: bool,
    /// Show a progress bar while the run is active
    pub progress: bool,
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages == 0 {
            return Err(ConfigError::NoStages);
        }
        if self.max_concurrency < self.stages {
            return Err(ConfigError::ConcurrencyBelowStages {
                max_concurrency: self.max_concurrency,
                stages: self.stages,
            });
        }
        if self.login_percentage > 100 {
            return Err(ConfigError::LoginPercentage(self.login_percentage));
        }
        if self.duration.is_zero() {
            return Err(ConfigError::ZeroDuration("duration"));
        }
        if self.stage_duration.is_zero() {
            return Err(ConfigError::ZeroDuration("stage duration"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("request timeout"));
        }
        if self.report_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("report interval"));
        }
        Ok(())
    }

    /// Time covered by the ramp stages alone
    pub fn ramp_duration(&self) -> Duration {
        self.stage_duration
            .saturating_mul(u32::try_from(self.stages).unwrap_or(u32::MAX))
    }
}

/// Parameters of a standalone login fuzzing session
#[derive(Debug, Clone)]
pub struct FuzzConfig {
    pub base_url: Url,
    /// Path of the login endpoint
    pub login_path: String,
    /// Number of sequential login calls
    pub iterations: u64,
    /// Pause after each call
    pub delay: Duration,
    pub request_timeout: Duration,
}

impl FuzzConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::NoIterations);
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("request timeout"));
        }
        if !self.login_path.starts_with('/') {
            return Err(ConfigError::InvalidEndpoint(format!(
                "path must start with '/': {}",
                self.login_path
            )));
        }
        Ok(())
    }
}

/// Outcome of a completed call as seen by the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Successful,
    Failed,
    Errored,
}

impl LoginOutcome {
    /// 200 is a successful login, 401 is an expected rejection, anything else is an error.
    pub fn from_status(status: u16) -> Self {
        match status {
            200 => LoginOutcome::Successful,
            401 => LoginOutcome::Failed,
            _ => LoginOutcome::Errored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RunConfig {
        RunConfig {
            base_url: Url::parse("http://localhost:3000").unwrap(),
            duration: Duration::from_secs(3000),
            max_concurrency: 20,
            stages: 5,
            stage_duration: Duration::from_secs(120),
            login_percentage: 20,
            request_timeout: Duration::from_secs(30),
            report_interval: Duration::from_secs(60),
            output_dir: PathBuf::from("."),
            endpoint_csv: false,
            progress: false,
        }
    }

    #[test]
    fn accepts_a_sane_config() {
        assert_eq!(config().validate(), Ok(()));
        assert_eq!(config().ramp_duration(), Duration::from_secs(600));
    }

    #[test]
    fn rejects_concurrency_below_stages() {
        let cfg = RunConfig {
            max_concurrency: 3,
            ..config()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ConcurrencyBelowStages {
                max_concurrency: 3,
                stages: 5
            })
        );
    }

    #[test]
    fn rejects_zero_stages_and_bad_percentage() {
        let cfg = RunConfig {
            stages: 0,
            ..config()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::NoStages));

        let cfg = RunConfig {
            login_percentage: 101,
            ..config()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::LoginPercentage(101)));
    }

    #[test]
    fn rejects_zero_durations() {
        let cfg = RunConfig {
            stage_duration: Duration::ZERO,
            ..config()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroDuration("stage duration"))
        );
    }

    #[test]
    fn scenario_payload_omits_missing_fields() {
        let scenario = LoginScenario {
            name: "missing_password",
            username: Some("test"),
            password: None,
        };
        assert_eq!(scenario.payload(), serde_json::json!({ "username": "test" }));
    }

    #[test]
    fn login_outcome_classification() {
        assert_eq!(LoginOutcome::from_status(200), LoginOutcome::Successful);
        assert_eq!(LoginOutcome::from_status(401), LoginOutcome::Failed);
        assert_eq!(LoginOutcome::from_status(500), LoginOutcome::Errored);
        assert_eq!(LoginOutcome::from_status(204), LoginOutcome::Errored);
    }
}

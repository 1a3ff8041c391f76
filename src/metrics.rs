//! Run-wide aggregation of call outcomes.
//!
//! All workers write into one [`Aggregator`]. Every update is a composite
//! operation applied under a single lock, so a [`MetricsSnapshot`] never shows
//! half of an update (e.g. a bumped `count` without its duration).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::models::LoginOutcome;

/// Per-endpoint breakdown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStats {
    /// Calls made, including transport failures
    pub count: u64,
    /// Non-2xx responses plus transport failures
    pub error_count: u64,
    /// Calls that produced no response at all
    pub transport_failures: u64,
    pub cumulative_duration_ms: u64,
    /// `None` until the first response is recorded
    pub min_duration_ms: Option<u64>,
    pub max_duration_ms: Option<u64>,
}

impl EndpointStats {
    /// Calls that produced a response and therefore a duration sample
    pub fn responded(&self) -> u64 {
        self.count - self.transport_failures
    }

    pub fn mean_duration_ms(&self) -> Option<f64> {
        match self.responded() {
            0 => None,
            n => Some(self.cumulative_duration_ms as f64 / n as f64),
        }
    }

    fn record_duration(&mut self, duration_ms: u64) {
        self.cumulative_duration_ms += duration_ms;
        self.min_duration_ms = Some(
            self.min_duration_ms
                .map_or(duration_ms, |min| min.min(duration_ms)),
        );
        self.max_duration_ms = Some(
            self.max_duration_ms
                .map_or(duration_ms, |max| max.max(duration_ms)),
        );
    }
}

/// Outcomes of calls made against the login endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginMetrics {
    /// Login calls started; always equals the sum of `scenario_counts`
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub errored: u64,
    pub scenario_counts: BTreeMap<String, u64>,
}

impl LoginMetrics {
    /// Login calls that reached an outcome
    pub fn completed(&self) -> u64 {
        self.successful + self.failed + self.errored
    }
}

/// A consistent point-in-time copy of the aggregate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub transport_failures: u64,
    pub status_code_counts: BTreeMap<u16, u64>,
    pub per_endpoint: BTreeMap<String, EndpointStats>,
    pub response_time_samples: Vec<u64>,
    pub login_metrics: LoginMetrics,
}

/// A call that produced an HTTP response
#[derive(Debug, Clone, Copy)]
pub struct CompletedCall<'a> {
    pub path: &'a str,
    pub status: u16,
    pub duration: Duration,
    /// Set for calls against the login endpoint
    pub login: bool,
    /// The response arrived but its body could not be read
    pub body_error: bool,
}

impl CompletedCall<'_> {
    /// Non-2xx responses are errors, except a 401 from the login endpoint,
    /// which is the expected rejection of a bad credential.
    pub fn is_error(&self) -> bool {
        if self.body_error {
            return true;
        }
        if self.login && self.status == 401 {
            return false;
        }
        !(200..300).contains(&self.status)
    }
}

/// A call that produced no response
#[derive(Debug, Clone, Copy)]
pub struct TransportFailure<'a> {
    pub path: &'a str,
    pub login: bool,
}

/// Shared, concurrently updated metrics for one run
#[derive(Debug, Default)]
pub struct Aggregator {
    state: Mutex<MetricsSnapshot>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a composite update half
    // applied (no update panics midway), so a poisoned state is still valid.
    fn state(&self) -> MutexGuard<'_, MetricsSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a call that produced a response, whatever its status.
    pub fn record_completed_call(&self, call: CompletedCall<'_>) {
        let duration_ms = duration_ms(call.duration);
        let is_error = call.is_error();
        let mut guard = self.state();
        let state = &mut *guard;

        state.total_requests += 1;
        state.response_time_samples.push(duration_ms);
        *state.status_code_counts.entry(call.status).or_insert(0) += 1;

        let endpoint = state.per_endpoint.entry(call.path.to_string()).or_default();
        endpoint.count += 1;
        endpoint.record_duration(duration_ms);
        if is_error {
            endpoint.error_count += 1;
            state.total_errors += 1;
        }

        if call.login {
            match LoginOutcome::from_status(call.status) {
                LoginOutcome::Successful => state.login_metrics.successful += 1,
                LoginOutcome::Failed => state.login_metrics.failed += 1,
                LoginOutcome::Errored => state.login_metrics.errored += 1,
            }
        }
    }

    /// Records a call that failed before any response was observed.
    pub fn record_transport_failure(&self, failure: TransportFailure<'_>) {
        let mut guard = self.state();
        let state = &mut *guard;

        state.total_requests += 1;
        state.total_errors += 1;
        state.transport_failures += 1;

        let endpoint = state
            .per_endpoint
            .entry(failure.path.to_string())
            .or_default();
        endpoint.count += 1;
        endpoint.error_count += 1;
        endpoint.transport_failures += 1;

        if failure.login {
            state.login_metrics.errored += 1;
        }
    }

    /// Counts a login scenario at the moment it is drawn, before the call is made.
    pub fn record_scenario_selection(&self, scenario: &str) {
        let mut state = self.state();
        let login = &mut state.login_metrics;
        login.total += 1;
        *login
            .scenario_counts
            .entry(scenario.to_string())
            .or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.state().clone()
    }

    pub fn total_requests(&self) -> u64 {
        self.state().total_requests
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

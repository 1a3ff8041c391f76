use anyhow::{Context, Result};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{error, info, warn};
use url::Url;

use crate::catalog::Catalog;
use crate::export::{self, ExportDocument};
use crate::metrics::{Aggregator, CompletedCall, MetricsSnapshot, TransportFailure};
use crate::models::{EndpointDescriptor, FuzzConfig, RunConfig};
use crate::ramp::RampPlan;
use crate::report;
use crate::select::{PreparedCall, is_login_call, select_call};

/// Response body, decoded as JSON when it parses and kept as text otherwise
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    pub fn decode(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

/// What one call produced. Already recorded in the aggregator when returned.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Completed {
        status: u16,
        latency: Duration,
        /// `None` when the body could not be read
        body: Option<ResponseBody>,
    },
    TransportFailure {
        latency: Duration,
        error: String,
    },
}

/// Everything a worker needs, shared read-only between workers
pub struct RunContext {
    pub client: Client,
    pub base_url: Url,
    pub catalog: Catalog,
    pub aggregator: Arc<Aggregator>,
    pub login_percentage: u8,
}

/// Final state of a finished run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub snapshot: MetricsSnapshot,
    /// Workers alive after each stage that started
    pub stage_workers: Vec<usize>,
    pub export_path: PathBuf,
    pub csv_path: Option<PathBuf>,
}

/// Appends `path` to the base URL, keeping any path prefix the base carries.
pub fn endpoint_url(base_url: &Url, path: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{}{path}", base_url.as_str().trim_end_matches('/')))
}

pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Performs one HTTP call and records its outcome.
///
/// Never fails: transport errors and bad statuses are counted, logged, and
/// returned as data.
pub async fn execute_call(
    client: &Client,
    base_url: &Url,
    call: &PreparedCall<'_>,
    aggregator: &Aggregator,
) -> CallOutcome {
    let endpoint = call.endpoint;
    let path = endpoint.path.as_str();
    let login = call.is_login();
    let marker = if login { " [LOGIN TEST]" } else { "" };

    let url = match endpoint_url(base_url, path) {
        Ok(url) => url,
        Err(e) => {
            aggregator.record_transport_failure(TransportFailure { path, login });
            error!(
                event = "request_error",
                method = %endpoint.method,
                path,
                login,
                error = %e,
                "Invalid URL for {} {}{}",
                endpoint.method,
                path,
                marker
            );
            return CallOutcome::TransportFailure {
                latency: Duration::ZERO,
                error: e.to_string(),
            };
        }
    };

    let mut request = client
        .request(endpoint.method.clone(), url)
        .header(CONTENT_TYPE, "application/json");
    if endpoint.method != Method::GET
        && let Some(body) = &call.body
    {
        request = request.json(body);
    }

    let start = Instant::now();
    match request.send().await {
        Ok(response) => {
            let latency = start.elapsed();
            let status = response.status().as_u16();

            let body = match response.bytes().await {
                Ok(bytes) => Some(ResponseBody::decode(&bytes)),
                Err(e) => {
                    warn!(
                        event = "body_error",
                        method = %endpoint.method,
                        path,
                        status,
                        error = %e,
                        "Failed to read response body"
                    );
                    None
                }
            };

            let completed = CompletedCall {
                path,
                status,
                duration: latency,
                login,
                body_error: body.is_none(),
            };
            aggregator.record_completed_call(completed);

            let latency_ms = latency.as_millis() as u64;
            if completed.is_error() {
                warn!(
                    event = "request_failure",
                    method = %endpoint.method,
                    path,
                    status,
                    latency_ms,
                    login,
                    "{} {} - {} - {}ms{}",
                    endpoint.method,
                    path,
                    status,
                    latency_ms,
                    marker
                );
            } else {
                info!(
                    event = "request_success",
                    method = %endpoint.method,
                    path,
                    status,
                    latency_ms,
                    login,
                    "{} {} - {} - {}ms{}",
                    endpoint.method,
                    path,
                    status,
                    latency_ms,
                    marker
                );
            }

            CallOutcome::Completed {
                status,
                latency,
                body,
            }
        }
        Err(e) => {
            let latency = start.elapsed();
            aggregator.record_transport_failure(TransportFailure { path, login });

            let latency_ms = latency.as_millis() as u64;
            error!(
                event = "request_error",
                method = %endpoint.method,
                path,
                latency_ms,
                login,
                error = %e,
                "Network error calling {} {} after {}ms{}: {}",
                endpoint.method,
                path,
                latency_ms,
                marker,
                e
            );

            CallOutcome::TransportFailure {
                latency,
                error: e.to_string(),
            }
        }
    }
}

/// Pause between two calls of one worker: mostly short, occasionally long.
pub fn think_time<R: Rng + ?Sized>(rng: &mut R) -> Duration {
    let millis = if rng.gen_bool(0.1) {
        rng.gen_range(1000..=3000)
    } else {
        rng.gen_range(50..=500)
    };
    Duration::from_millis(millis)
}

/// Issues calls until `deadline`. One call at a time; the call in flight when
/// the deadline passes is allowed to finish.
pub async fn run_worker(id: usize, ctx: Arc<RunContext>, deadline: Instant) {
    info!(worker = id, event = "worker_started", "Worker {} started", id);
    let mut rng = StdRng::from_entropy();

    while Instant::now() < deadline {
        let login = is_login_call(&mut rng, ctx.login_percentage);
        let Some(call) = select_call(&ctx.catalog, login, &mut rng, &ctx.aggregator) else {
            warn!(
                worker = id,
                login, "No endpoint available for this call, stopping worker"
            );
            break;
        };

        execute_call(&ctx.client, &ctx.base_url, &call, &ctx.aggregator).await;

        let pause = think_time(&mut rng);
        sleep_until(deadline.min(Instant::now() + pause)).await;
    }

    info!(worker = id, event = "worker_finished", "Worker {} finished", id);
}

fn progress_bar(config: &RunConfig) -> Result<ProgressBar> {
    if !config.progress {
        return Ok(ProgressBar::hidden());
    }

    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7}s {msg}")
        .context("Invalid progress bar template")?
        .progress_chars("##-");
    let pb = ProgressBar::new(config.duration.as_secs());
    pb.set_style(style);
    Ok(pb)
}

fn spawn_progress(pb: ProgressBar, started: Instant, deadline: Instant) -> JoinHandle<()> {
    tokio::spawn(async move {
        while Instant::now() < deadline {
            pb.set_position(started.elapsed().as_secs());
            sleep(Duration::from_secs(1)).await;
        }
        pb.finish_with_message("load test completed");
    })
}

/// Drives the worker population through the ramp, holds peak load until the
/// deadline, and waits for every worker to finish.
///
/// Returns the population reached at each stage that started before the deadline.
pub async fn drive(config: &RunConfig, ctx: Arc<RunContext>) -> Result<Vec<usize>> {
    let plan = RampPlan::from_config(config);
    let started = Instant::now();
    let deadline = started + config.duration;

    let pb = progress_bar(config)?;
    let progress = config
        .progress
        .then(|| spawn_progress(pb.clone(), started, deadline));
    let reporter = tokio::spawn(report::run_periodic(
        ctx.aggregator.clone(),
        config.report_interval,
        deadline,
    ));

    let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(plan.peak());
    let mut stage_workers = Vec::with_capacity(plan.stage_count());
    for stage in plan.stages() {
        if Instant::now() >= deadline {
            warn!(
                stage = stage.index,
                "Test duration elapsed before the ramp finished, skipping remaining stages"
            );
            break;
        }

        info!(
            event = "stage_started",
            stage = stage.index,
            workers = stage.target,
            "Ramping up to {} concurrent users (Stage {}/{})",
            stage.target,
            stage.index,
            plan.stage_count()
        );
        pb.set_message(format!("stage {}/{}", stage.index, plan.stage_count()));

        for _ in 0..stage.added {
            let id = workers.len();
            workers.push(tokio::spawn(run_worker(id, ctx.clone(), deadline)));
        }
        stage_workers.push(workers.len());

        sleep_until(deadline.min(Instant::now() + plan.stage_duration())).await;
        report::print_report(&format!("Stage {} completed", stage.index), &ctx.aggregator);
    }

    let hold = plan.hold_duration();
    if !hold.is_zero() && Instant::now() < deadline {
        info!(
            event = "hold_started",
            workers = workers.len(),
            "Maintaining peak load of {} users for {}",
            workers.len(),
            humantime::format_duration(deadline.saturating_duration_since(Instant::now()))
        );
        pb.set_message("holding peak load");
        sleep_until(deadline).await;
    }

    for (id, result) in join_all(workers).await.into_iter().enumerate() {
        if let Err(e) = result {
            error!(worker = id, error = %e, "Worker terminated abnormally");
        }
    }

    if let Err(e) = reporter.await {
        warn!(error = %e, "Periodic reporter terminated abnormally");
    }
    if let Some(handle) = progress {
        handle.abort();
        pb.finish_and_clear();
    }

    Ok(stage_workers)
}

/// Runs a complete load test: ramp, hold, final report and export.
pub async fn run(config: &RunConfig, catalog: Catalog) -> Result<RunOutcome> {
    config.validate()?;
    catalog.check_login_percentage(config.login_percentage)?;

    if config.ramp_duration() > config.duration {
        warn!(
            "Ramp of {} stages x {} exceeds the test duration of {}; later stages will be skipped",
            config.stages,
            humantime::format_duration(config.stage_duration),
            humantime::format_duration(config.duration)
        );
    }

    info!(
        event = "load_test_started",
        base_url = %config.base_url,
        max_concurrency = config.max_concurrency,
        stages = config.stages,
        "Starting load test for {}",
        humantime::format_duration(config.duration)
    );
    info!(
        "Login tests will be approximately {}% of total traffic",
        config.login_percentage
    );

    let aggregator = Arc::new(Aggregator::new());
    let ctx = Arc::new(RunContext {
        client: build_client(config.request_timeout)?,
        base_url: config.base_url.clone(),
        catalog,
        aggregator: aggregator.clone(),
        login_percentage: config.login_percentage,
    });

    let stage_workers = drive(config, ctx).await?;

    report::print_report("Final Results", &aggregator);

    let snapshot = aggregator.snapshot();
    let timestamp = chrono::Utc::now();
    let document = ExportDocument::new(config, snapshot.clone(), timestamp);
    let export_path = export::write_document(&config.output_dir, &document)?;
    info!(event = "exported", path = %export_path.display(), "Results exported to {}", export_path.display());

    let csv_path = if config.endpoint_csv {
        let path = export::write_endpoint_csv(&config.output_dir, timestamp, &snapshot)?;
        info!(event = "exported", path = %path.display(), "Endpoint breakdown written to {}", path.display());
        Some(path)
    } else {
        None
    };

    info!(event = "load_test_completed", "Load test completed");
    Ok(RunOutcome {
        snapshot,
        stage_workers,
        export_path,
        csv_path,
    })
}

/// Sends a fixed number of sequential login calls, each with a random scenario.
pub async fn run_login_fuzz(config: &FuzzConfig) -> Result<MetricsSnapshot> {
    config.validate()?;

    let catalog = Catalog::new(vec![EndpointDescriptor::login(
        Method::POST,
        config.login_path.clone(),
    )])?;
    let client = build_client(config.request_timeout)?;
    let aggregator = Aggregator::new();
    let mut rng = StdRng::from_entropy();

    info!(
        event = "login_fuzz_started",
        iterations = config.iterations,
        "Starting login endpoint tests against {}{}",
        config.base_url,
        config.login_path
    );

    for i in 0..config.iterations {
        let Some(call) = select_call(&catalog, true, &mut rng, &aggregator) else {
            break;
        };
        if let Some(scenario) = call.scenario {
            info!(
                iteration = i + 1,
                scenario = scenario.name,
                "Test #{}/{}: scenario {}",
                i + 1,
                config.iterations,
                scenario.name
            );
        }
        execute_call(&client, &config.base_url, &call, &aggregator).await;
        if !config.delay.is_zero() {
            sleep(config.delay).await;
        }
    }

    report::print_report("Login Test Summary", &aggregator);
    Ok(aggregator.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn think_time_stays_in_either_band() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut long = 0;
        for _ in 0..10_000 {
            let ms = think_time(&mut rng).as_millis();
            assert!((50..=500).contains(&ms) || (1000..=3000).contains(&ms));
            if ms >= 1000 {
                long += 1;
            }
        }
        assert!((700..1300).contains(&long), "got {long}");
    }

    #[test]
    fn endpoint_url_keeps_the_base_path() {
        let base = Url::parse("http://localhost:3000/gateway").unwrap();
        assert_eq!(
            endpoint_url(&base, "/api/v1/users").unwrap().as_str(),
            "http://localhost:3000/gateway/api/v1/users"
        );

        let trailing = Url::parse("http://localhost:3000/gateway/").unwrap();
        assert_eq!(
            endpoint_url(&trailing, "/api/v1/users").unwrap().as_str(),
            "http://localhost:3000/gateway/api/v1/users"
        );

        let bare = Url::parse("http://localhost:3000").unwrap();
        assert_eq!(
            endpoint_url(&bare, "/api/v2/auth/login").unwrap().as_str(),
            "http://localhost:3000/api/v2/auth/login"
        );
    }

    #[test]
    fn body_decoding_falls_back_to_text() {
        assert_eq!(
            ResponseBody::decode(br#"{"ok":true}"#),
            ResponseBody::Json(serde_json::json!({ "ok": true }))
        );
        assert_eq!(
            ResponseBody::decode(b"plain text"),
            ResponseBody::Text("plain text".to_string())
        );
    }
}

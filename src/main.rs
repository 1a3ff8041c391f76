use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use loadramp::catalog::DEFAULT_LOGIN_PATH;
use loadramp::{Catalog, FuzzConfig, LoadTestBuilder, parse_endpoints};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a staged load test
    Run {
        /// Base URL of the service under test
        #[arg(long, env = "LOADRAMP_BASE_URL", default_value = loadramp::DEFAULT_BASE_URL)]
        base_url: String,

        /// Total duration of the test
        #[arg(long, env = "LOADRAMP_DURATION", default_value = "50m")]
        duration: humantime::Duration,

        /// Peak number of concurrent workers
        #[arg(long, env = "LOADRAMP_MAX_CONCURRENCY", default_value = "20")]
        max_concurrency: usize,

        /// Number of ramp-up stages
        #[arg(long, env = "LOADRAMP_STAGES", default_value = "5")]
        stages: usize,

        /// Duration of each ramp-up stage
        #[arg(long, env = "LOADRAMP_STAGE_DURATION", default_value = "2m")]
        stage_duration: humantime::Duration,

        /// Percentage of calls sent to the login endpoint (0-100)
        #[arg(long, env = "LOADRAMP_LOGIN_PERCENTAGE", default_value = "20")]
        login_percentage: u8,

        /// Per-request timeout
        #[arg(long, env = "LOADRAMP_TIMEOUT", default_value = "30s")]
        timeout: humantime::Duration,

        /// Interval between periodic reports
        #[arg(long, env = "LOADRAMP_REPORT_EVERY", default_value = "60s")]
        report_every: humantime::Duration,

        /// Directory for the results export
        #[arg(long, env = "LOADRAMP_OUTPUT_DIR", default_value = ".")]
        output_dir: PathBuf,

        /// Also write the per-endpoint breakdown as CSV
        #[arg(long)]
        endpoint_csv: bool,

        /// Endpoint to call, e.g. "GET /api/v1/users" (replaces the default set)
        #[arg(long = "endpoint", value_name = "value")]
        endpoints: Vec<String>,

        /// Path of the login endpoint
        #[arg(long, default_value = DEFAULT_LOGIN_PATH)]
        login_path: String,

        /// Add the sign-up endpoint with random user payloads to the default set
        #[arg(long)]
        include_signup: bool,

        /// Show a progress bar
        #[arg(long)]
        progress: bool,
    },

    /// Fire sequential login calls with random credential scenarios
    FuzzLogin {
        /// Base URL of the service under test
        #[arg(long, env = "LOADRAMP_BASE_URL", default_value = loadramp::DEFAULT_BASE_URL)]
        base_url: String,

        /// Path of the login endpoint
        #[arg(long, default_value = DEFAULT_LOGIN_PATH)]
        login_path: String,

        /// Number of login calls
        #[arg(long, default_value = "1000")]
        iterations: u64,

        /// Delay between calls
        #[arg(long, default_value = "100ms")]
        delay: humantime::Duration,

        /// Per-request timeout
        #[arg(long, default_value = "30s")]
        timeout: humantime::Duration,
    },
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))?
        .add_directive("hyper=off".parse()?)
        .add_directive("reqwest=off".parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_catalog(endpoints: &[String], login_path: &str, include_signup: bool) -> Result<Catalog> {
    let regular = if endpoints.is_empty() {
        Catalog::with_defaults(false).regular().to_vec()
    } else {
        parse_endpoints(endpoints)?
    };
    Ok(Catalog::with_endpoints(regular, login_path, include_signup)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command {
        Commands::Run {
            base_url,
            duration,
            max_concurrency,
            stages,
            stage_duration,
            login_percentage,
            timeout,
            report_every,
            output_dir,
            endpoint_csv,
            endpoints,
            login_path,
            include_signup,
            progress,
        } => {
            let catalog = build_catalog(&endpoints, &login_path, include_signup)?;
            let outcome = LoadTestBuilder::new()
                .base_url(base_url)
                .duration(duration.into())
                .max_concurrency(max_concurrency)
                .stages(stages)
                .stage_duration(stage_duration.into())
                .login_percentage(login_percentage)
                .request_timeout(timeout.into())
                .report_interval(report_every.into())
                .output_dir(output_dir)
                .endpoint_csv(endpoint_csv)
                .progress(progress)
                .catalog(catalog)
                .run()
                .await?;

            info!(
                total_requests = outcome.snapshot.total_requests,
                export = %outcome.export_path.display(),
                "Run finished"
            );
        }
        Commands::FuzzLogin {
            base_url,
            login_path,
            iterations,
            delay,
            timeout,
        } => {
            let config = FuzzConfig {
                base_url: Url::parse(&base_url)
                    .with_context(|| format!("Invalid base URL: {base_url}"))?,
                login_path,
                iterations,
                delay: Duration::from(delay),
                request_timeout: timeout.into(),
            };
            loadramp::attack::run_login_fuzz(&config).await?;
            info!("Tests completed");
        }
    }

    Ok(())
}

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::metrics::MetricsSnapshot;
use crate::models::RunConfig;
use crate::report::Summary;

/// Run parameters as recorded in the export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedConfig {
    pub base_url: String,
    /// Seconds
    pub duration: u64,
    pub max_concurrency: usize,
    pub stages: usize,
    /// Seconds
    pub stage_duration: u64,
    pub login_test_percentage: u8,
}

impl From<&RunConfig> for ExportedConfig {
    fn from(config: &RunConfig) -> Self {
        Self {
            base_url: config.base_url.to_string(),
            duration: config.duration.as_secs(),
            max_concurrency: config.max_concurrency,
            stages: config.stages,
            stage_duration: config.stage_duration.as_secs(),
            login_test_percentage: config.login_percentage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedResults {
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
    pub summary: Summary,
}

/// The document written once at the end of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub config: ExportedConfig,
    pub results: ExportedResults,
    pub timestamp: DateTime<Utc>,
    pub test_duration: String,
}

impl ExportDocument {
    pub fn new(config: &RunConfig, snapshot: MetricsSnapshot, timestamp: DateTime<Utc>) -> Self {
        let summary = Summary::from_snapshot(&snapshot);
        Self {
            config: ExportedConfig::from(config),
            results: ExportedResults {
                metrics: snapshot,
                summary,
            },
            timestamp,
            test_duration: humantime::format_duration(config.duration).to_string(),
        }
    }
}

/// File name for an export taken at `timestamp`
pub fn artifact_name(timestamp: DateTime<Utc>, extension: &str) -> String {
    format!(
        "load-test-results-{}.{extension}",
        timestamp.format("%Y-%m-%dT%H-%M-%S-%3f")
    )
}

/// Creates `path` and fills it through `write`. The file is never overwritten,
/// and is removed again if `write` fails.
fn write_new_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;

    let mut writer = BufWriter::new(file);
    let written = write(&mut writer).and_then(|()| Ok(writer.flush()?));
    if written.is_err() {
        drop(writer);
        let _ = fs::remove_file(path);
    }
    written
}

/// Writes `document` to a new file in `dir`. Refuses to overwrite an existing file.
pub fn write_document(dir: &Path, document: &ExportDocument) -> Result<PathBuf> {
    let path = dir.join(artifact_name(document.timestamp, "json"));
    write_new_file(&path, |writer| {
        serde_json::to_writer_pretty(writer, document)
            .with_context(|| format!("Failed to serialize results to {}", path.display()))
    })?;
    Ok(path)
}

/// Writes the per-endpoint breakdown as CSV next to the JSON export.
pub fn write_endpoint_csv(
    dir: &Path,
    timestamp: DateTime<Utc>,
    snapshot: &MetricsSnapshot,
) -> Result<PathBuf> {
    let path = dir.join(artifact_name(timestamp, "csv"));
    write_new_file(&path, |writer| {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record([
            "path",
            "count",
            "error_count",
            "transport_failures",
            "avg_ms",
            "min_ms",
            "max_ms",
        ])?;

        for (endpoint, stats) in &snapshot.per_endpoint {
            csv_writer.write_record([
                endpoint.clone(),
                stats.count.to_string(),
                stats.error_count.to_string(),
                stats.transport_failures.to_string(),
                stats
                    .mean_duration_ms()
                    .map(|avg| format!("{avg:.2}"))
                    .unwrap_or_default(),
                stats
                    .min_duration_ms
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
                stats
                    .max_duration_ms
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn artifact_names_carry_the_timestamp() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(
            artifact_name(ts, "json"),
            "load-test-results-2026-03-01T12-30-05-000.json"
        );
        let later = ts + chrono::Duration::milliseconds(1);
        assert_ne!(artifact_name(ts, "json"), artifact_name(later, "json"));
    }

    #[test]
    fn failed_write_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");

        let result = write_new_file(&path, |writer| {
            writer.write_all(b"{\"results\":")?;
            anyhow::bail!("serializer gave up")
        });

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn existing_file_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taken.json");
        fs::write(&path, "keep").unwrap();

        assert!(write_new_file(&path, |_| Ok(())).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep");
    }

    #[test]
    fn test_duration_is_human_readable() {
        let config = crate::LoadTestBuilder::new().build().unwrap();
        let document = ExportDocument::new(&config, MetricsSnapshot::default(), Utc::now());
        assert_eq!(document.test_duration, "50m");
    }
}

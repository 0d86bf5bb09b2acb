use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::aggregate::AggregatedResult;
use crate::dispatch::RunReport;
use crate::error::RunError;
use crate::executor::PartitionRun;
use crate::project::Coordinates;

pub const STATE_DIR: &str = ".mutfleet";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub partition_id: String,
    pub unit: String,
    pub duration_ms: u64,
    pub final_state: Option<String>,
    pub error: Option<String>,
}

impl PartitionSummary {
    pub fn from_run(run: &PartitionRun) -> Self {
        PartitionSummary {
            partition_id: run.partition_id.clone(),
            unit: run.unit.clone(),
            duration_ms: run.duration.as_millis() as u64,
            final_state: run.final_state().map(|s| s.to_string()),
            error: match &run.outcome {
                Ok(collected) => collected.parse_error.clone(),
                Err(e) => Some(e.to_string()),
            },
        }
    }
}

/// Result of one run, keyed on disk by build coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunBundle {
    pub run_id: String,
    pub coordinates: Coordinates,
    pub started_at: u64,
    pub finished_at: u64,
    pub partition_count: usize,
    pub partitions: Vec<PartitionSummary>,
    pub result: AggregatedResult,
}

impl RunBundle {
    pub fn from_report(report: &RunReport, coordinates: &Coordinates, started_at: u64) -> Self {
        RunBundle {
            run_id: report.run_id.clone(),
            coordinates: coordinates.clone(),
            started_at,
            finished_at: unix_now(),
            partition_count: report.partitions.len(),
            partitions: report.runs.iter().map(PartitionSummary::from_run).collect(),
            result: report.result.clone(),
        }
    }

    pub fn failed_partitions(&self) -> usize {
        self.partitions.iter().filter(|p| p.error.is_some()).count()
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn bundle_path(project_root: &Path, coordinates: &Coordinates) -> PathBuf {
    project_root
        .join(STATE_DIR)
        .join(format!("{}.json", coordinates.slug()))
}

pub fn save_bundle(project_root: &Path, bundle: &RunBundle) -> Result<PathBuf, RunError> {
    let path = bundle_path(project_root, &bundle.coordinates);
    save_to_path(bundle, &path)?;
    Ok(path)
}

pub fn save_to_path(bundle: &RunBundle, path: &Path) -> Result<(), RunError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| RunError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(bundle).map_err(|source| RunError::Bundle {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| RunError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_from_path(path: &Path) -> Result<RunBundle, RunError> {
    let data = std::fs::read_to_string(path).map_err(|source| RunError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| RunError::Bundle {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_bundle(project_root: &Path, coordinates: &Coordinates) -> Result<RunBundle, RunError> {
    load_from_path(&bundle_path(project_root, coordinates))
}

/// Most recently finished bundle under the project's state directory.
pub fn load_latest(project_root: &Path) -> Option<RunBundle> {
    let entries = std::fs::read_dir(project_root.join(STATE_DIR)).ok()?;
    entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|p| load_from_path(&p).ok())
        .max_by_key(|b| b.finished_at)
}

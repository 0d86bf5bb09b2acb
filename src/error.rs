use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Unusable configuration. Raised before any remote work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_parallel_units must be at least 1")]
    NoParallelism,
    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },
    #[error("unknown partition strategy '{0}'. Expected PACKAGE or DEFAULT")]
    UnknownStrategy(String),
    #[error("unknown image pull policy '{0}'. Expected Always, IfNotPresent or Never")]
    UnknownPullPolicy(String),
    #[error("namespace '{0}' is not a valid DNS-1123 label")]
    InvalidNamespace(String),
    #[error("an image must be configured")]
    MissingImage,
    #[error("invalid glob '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("project at {0} has no pom.xml or source roots")]
    NotAProject(PathBuf),
}

/// Source tree could not be read, encoded or written back.
#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is {size} bytes, over the {limit} byte entry limit")]
    EntryTooLarge {
        path: PathBuf,
        size: usize,
        limit: usize,
    },
    #[error("refusing to write outside the tree: {0}")]
    UnsafePath(String),
    #[error("entry '{key}' is marked base64 but does not decode: {reason}")]
    BadEncoding { key: String, reason: String },
}

impl PackagingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PackagingError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A create, poll, fetch or delete call against the cluster failed.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("`{command}` exited with {code:?}: {stderr}")]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("unexpected response from cluster: {0}")]
    Response(String),
}

/// The remote structured report is missing or malformed.
#[derive(Debug, Error)]
pub enum ReportParseError {
    #[error("artifact '{0}' was not produced by the unit")]
    Missing(String),
    #[error("malformed mutation report: {0}")]
    Malformed(String),
}

/// Everything that can fail a single partition. Never aborts sibling partitions.
#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("packaging failed: {0}")]
    Packaging(#[from] PackagingError),
    #[error("cluster api error: {0}")]
    Cluster(#[from] ClusterError),
    #[error("unit {unit} failed: {reason}")]
    UnitFailed { unit: String, reason: String },
    #[error("timed out after {}s ({diagnostics})", elapsed.as_secs())]
    Timeout {
        elapsed: Duration,
        diagnostics: String,
    },
    #[error("run budget exhausted before the partition finished")]
    RunTimeout,
}

/// Run-level failures surfaced to the caller as hard errors.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build worker pool: {0}")]
    Pool(String),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("result bundle {path} is not valid: {source}")]
    Bundle {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Packaging(#[from] PackagingError),
}

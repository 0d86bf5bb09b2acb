use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::glob::NameFilter;

pub const DEFAULT_CONFIG_FILE: &str = "mutfleet.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartitionStrategy {
    /// One partition per package.
    Package,
    /// Discovery-order batches capped at `classes_per_partition`.
    Default,
}

impl FromStr for PartitionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PACKAGE" => Ok(PartitionStrategy::Package),
            "DEFAULT" | "SIZE" => Ok(PartitionStrategy::Default),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullPolicy {
    Always,
    IfNotPresent,
    Never,
}

impl PullPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullPolicy::Always => "Always",
            PullPolicy::IfNotPresent => "IfNotPresent",
            PullPolicy::Never => "Never",
        }
    }
}

impl fmt::Display for PullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PullPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(PullPolicy::Always),
            "ifnotpresent" => Ok(PullPolicy::IfNotPresent),
            "never" => Ok(PullPolicy::Never),
            _ => Err(ConfigError::UnknownPullPolicy(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Comma-separated globs selecting classes to mutate. Empty selects all.
    pub target_classes: String,
    /// Comma-separated globs selecting test classes. Empty selects all.
    pub target_tests: String,
    pub partition_strategy: PartitionStrategy,
    pub classes_per_partition: usize,
    pub max_parallel_units: usize,
    pub unit_timeout_seconds: u64,
    /// Budget for the whole pool, on top of the per-unit timeout.
    pub run_timeout_seconds: u64,
    pub poll_interval_seconds: u64,
    pub progress_interval_seconds: u64,
    pub memory_limit: String,
    pub cpu_limit: String,
    pub namespace: String,
    pub image: String,
    pub image_pull_policy: PullPolicy,
    pub kubectl: String,
    /// Resource file extensions that get shipped alongside code.
    pub resource_extensions: Vec<String>,
    pub max_entry_bytes: usize,
    /// Command the remote unit runs inside the reconstructed tree.
    pub build_command: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            target_classes: String::new(),
            target_tests: String::new(),
            partition_strategy: PartitionStrategy::Default,
            classes_per_partition: 10,
            max_parallel_units: 4,
            unit_timeout_seconds: 1800,
            run_timeout_seconds: 7200,
            poll_interval_seconds: 5,
            progress_interval_seconds: 60,
            memory_limit: "2Gi".to_string(),
            cpu_limit: "1".to_string(),
            namespace: "default".to_string(),
            image: String::new(),
            image_pull_policy: PullPolicy::IfNotPresent,
            kubectl: "kubectl".to_string(),
            resource_extensions: ["properties", "xml", "yml", "yaml", "json", "txt", "sql"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_entry_bytes: 1_000_000,
            build_command: "mvn -B -q test-compile org.pitest:pitest-maven:mutationCoverage"
                .to_string(),
        }
    }
}

impl RunConfig {
    /// Load `path`, or defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(RunConfig::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from(path),
            source,
        })
    }

    pub fn with_target_classes(mut self, globs: impl Into<String>) -> Self {
        self.target_classes = globs.into();
        self
    }

    pub fn with_target_tests(mut self, globs: impl Into<String>) -> Self {
        self.target_tests = globs.into();
        self
    }

    pub fn with_strategy(mut self, strategy: PartitionStrategy) -> Self {
        self.partition_strategy = strategy;
        self
    }

    pub fn with_max_parallel_units(mut self, units: usize) -> Self {
        self.max_parallel_units = units;
        self
    }

    pub fn with_unit_timeout_seconds(mut self, secs: u64) -> Self {
        self.unit_timeout_seconds = secs;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn unit_timeout(&self) -> Duration {
        Duration::from_secs(self.unit_timeout_seconds)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_seconds)
    }

    pub fn class_filter(&self) -> Result<NameFilter, ConfigError> {
        NameFilter::parse(&self.target_classes)
    }

    pub fn test_filter(&self) -> Result<NameFilter, ConfigError> {
        NameFilter::parse(&self.target_tests)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel_units < 1 {
            return Err(ConfigError::NoParallelism);
        }
        let positive = [
            ("classes_per_partition", self.classes_per_partition as u64),
            ("unit_timeout_seconds", self.unit_timeout_seconds),
            ("run_timeout_seconds", self.run_timeout_seconds),
            ("poll_interval_seconds", self.poll_interval_seconds),
            ("max_entry_bytes", self.max_entry_bytes as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::ZeroValue { field });
            }
        }
        if self.image.trim().is_empty() {
            return Err(ConfigError::MissingImage);
        }
        if !is_dns_label(&self.namespace) {
            return Err(ConfigError::InvalidNamespace(self.namespace.clone()));
        }
        self.class_filter()?;
        self.test_filter()?;
        Ok(())
    }
}

pub fn is_dns_label(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > 63 {
        return false;
    }
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    edge_ok(bytes[0])
        && edge_ok(bytes[bytes.len() - 1])
        && bytes
            .iter()
            .all(|&b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

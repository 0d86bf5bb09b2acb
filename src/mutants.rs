use serde::{Deserialize, Serialize};

/// Outcome reported by the external tool for one mutant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutantStatus {
    Killed,
    Survived,
    NoCoverage,
    TimedOut,
    MemoryError,
    RunError,
    NonViable,
    #[serde(other)]
    Unknown,
}

impl MutantStatus {
    pub fn parse(text: &str) -> Self {
        match text.trim().to_ascii_uppercase().as_str() {
            "KILLED" => MutantStatus::Killed,
            "SURVIVED" => MutantStatus::Survived,
            "NO_COVERAGE" => MutantStatus::NoCoverage,
            "TIMED_OUT" => MutantStatus::TimedOut,
            "MEMORY_ERROR" => MutantStatus::MemoryError,
            "RUN_ERROR" => MutantStatus::RunError,
            "NON_VIABLE" => MutantStatus::NonViable,
            _ => MutantStatus::Unknown,
        }
    }
}

/// One mutant as reported by a partition's structured report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMutation {
    pub mutated_class: String,
    pub mutated_method: String,
    pub line_number: usize,
    pub mutator_id: String,
    pub description: String,
    pub detected: bool,
    pub killing_test: Option<String>,
    pub status: MutantStatus,
    pub source_file: String,
    pub package_name: String,
    pub first_line: usize,
    pub last_line: usize,
    pub index_list: Vec<u32>,
    pub block_list: Vec<u32>,
}

impl RawMutation {
    pub fn key(&self) -> UniqueMutationKey {
        UniqueMutationKey {
            mutated_class: self.mutated_class.clone(),
            mutated_method: self.mutated_method.clone(),
            line_number: self.line_number,
            mutator_id: self.mutator_id.clone(),
        }
    }

    /// Class name without its package, with nested-class suffixes stripped.
    pub fn simple_class_name(&self) -> &str {
        simple_class_name(&self.mutated_class)
    }
}

/// A raw mutation plus the source-level detail used for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedMutation {
    #[serde(flatten)]
    pub raw: RawMutation,
    pub original_code_snippet: String,
    pub synthesized_mutated_snippet: String,
    pub block_id: i64,
    pub diff: String,
}

impl EnrichedMutation {
    /// Wrap a raw mutation with no source detail attached.
    pub fn unenhanced(raw: RawMutation) -> Self {
        EnrichedMutation {
            raw,
            original_code_snippet: String::new(),
            synthesized_mutated_snippet: String::new(),
            block_id: -1,
            diff: String::new(),
        }
    }

    pub fn key(&self) -> UniqueMutationKey {
        self.raw.key()
    }

    pub fn detected(&self) -> bool {
        self.raw.detected
    }
}

/// Identity of a logical mutant across partitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UniqueMutationKey {
    pub mutated_class: String,
    pub mutated_method: String,
    pub line_number: usize,
    pub mutator_id: String,
}

pub fn simple_class_name(fqcn: &str) -> &str {
    let last = fqcn.rsplit('.').next().unwrap_or(fqcn);
    last.split('$').next().unwrap_or(last)
}

pub fn package_of(fqcn: &str) -> &str {
    match fqcn.rfind('.') {
        Some(idx) => &fqcn[..idx],
        None => "",
    }
}

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::cluster::{REPORT_ARTIFACT, SUMMARY_ARTIFACT};
use crate::error::ReportParseError;
use crate::mutants::{MutantStatus, RawMutation, package_of};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedOutput {
    pub mutations: Vec<RawMutation>,
    pub summary: Option<String>,
    /// Set when the report was missing or unreadable.
    pub parse_error: Option<String>,
}

/// A missing or malformed report yields zero mutations, not a failure.
pub fn collect(partition_id: &str, artifacts: &BTreeMap<String, String>) -> CollectedOutput {
    let summary = artifacts.get(SUMMARY_ARTIFACT).cloned();
    let parsed = artifacts
        .get(REPORT_ARTIFACT)
        .ok_or_else(|| ReportParseError::Missing(REPORT_ARTIFACT.to_string()))
        .and_then(|xml| parse_mutations_xml(xml));

    match parsed {
        Ok(mutations) => {
            tracing::info!(partition = partition_id, "collected {} mutations", mutations.len());
            CollectedOutput {
                mutations,
                summary,
                parse_error: None,
            }
        }
        Err(e) => {
            tracing::warn!(partition = partition_id, "no usable report: {e}");
            CollectedOutput {
                mutations: Vec::new(),
                summary,
                parse_error: Some(e.to_string()),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct XmlReport {
    #[serde(rename = "mutation", default)]
    mutations: Vec<XmlMutation>,
}

#[derive(Debug, Deserialize)]
struct XmlMutation {
    #[serde(rename = "@detected", default)]
    detected: String,
    #[serde(rename = "@status", default)]
    status: String,
    #[serde(rename = "sourceFile", default)]
    source_file: String,
    #[serde(rename = "mutatedClass")]
    mutated_class: String,
    #[serde(rename = "mutatedMethod")]
    mutated_method: String,
    #[serde(rename = "lineNumber")]
    line_number: usize,
    mutator: String,
    #[serde(default)]
    indexes: Option<XmlIndexes>,
    #[serde(default)]
    blocks: Option<XmlBlocks>,
    #[serde(rename = "index", default)]
    index: Vec<u32>,
    #[serde(rename = "block", default)]
    block: Vec<u32>,
    #[serde(rename = "killingTest", default)]
    killing_test: Option<String>,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct XmlIndexes {
    #[serde(rename = "index", default)]
    index: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct XmlBlocks {
    #[serde(rename = "block", default)]
    block: Vec<u32>,
}

impl XmlMutation {
    fn into_raw(self) -> RawMutation {
        let package_name = package_of(&self.mutated_class).to_string();
        let index_list = match self.indexes {
            Some(wrapped) => wrapped.index,
            None => self.index,
        };
        let block_list = match self.blocks {
            Some(wrapped) => wrapped.block,
            None => self.block,
        };
        RawMutation {
            detected: self.detected.trim().eq_ignore_ascii_case("true"),
            status: MutantStatus::parse(&self.status),
            source_file: self.source_file,
            package_name,
            mutated_method: self.mutated_method,
            line_number: self.line_number,
            first_line: self.line_number,
            last_line: self.line_number,
            mutator_id: self.mutator,
            index_list,
            block_list,
            killing_test: self
                .killing_test
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            description: self.description,
            mutated_class: self.mutated_class,
        }
    }
}

/// Parse the tool's XML report: a `<mutations>` root listing `<mutation>` elements.
pub fn parse_mutations_xml(xml: &str) -> Result<Vec<RawMutation>, ReportParseError> {
    if xml.trim().is_empty() {
        return Err(ReportParseError::Malformed("empty document".to_string()));
    }
    let report: XmlReport =
        quick_xml::de::from_str(xml).map_err(|e| ReportParseError::Malformed(e.to_string()))?;
    Ok(report.mutations.into_iter().map(XmlMutation::into_raw).collect())
}

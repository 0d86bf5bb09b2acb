use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::mutants::{EnrichedMutation, UniqueMutationKey};

/// One partition's contribution: its mutations, or why it produced none.
#[derive(Debug, Clone)]
pub struct PartitionResult {
    pub partition_id: String,
    pub outcome: Result<Vec<EnrichedMutation>, String>,
}

impl PartitionResult {
    pub fn success(partition_id: impl Into<String>, mutations: Vec<EnrichedMutation>) -> Self {
        PartitionResult {
            partition_id: partition_id.into(),
            outcome: Ok(mutations),
        }
    }

    pub fn failure(partition_id: impl Into<String>, error: impl Into<String>) -> Self {
        PartitionResult {
            partition_id: partition_id.into(),
            outcome: Err(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub mutations_by_class: BTreeMap<String, Vec<EnrichedMutation>>,
    pub total: usize,
    pub killed: usize,
    pub score: f64,
    pub errors: Vec<String>,
}

impl AggregatedResult {
    pub fn survived(&self) -> usize {
        self.total - self.killed
    }

    pub fn mutations(&self) -> impl Iterator<Item = &EnrichedMutation> {
        self.mutations_by_class.values().flatten()
    }

    pub fn class(&self, name: &str) -> Option<&[EnrichedMutation]> {
        self.mutations_by_class.get(name).map(Vec::as_slice)
    }
}

/// Merge partitions in input order, one mutation per key, kills preferred.
pub fn aggregate(results: Vec<PartitionResult>) -> AggregatedResult {
    let mut seen_partitions = HashSet::new();
    let mut unique: BTreeMap<UniqueMutationKey, EnrichedMutation> = BTreeMap::new();
    let mut errors = Vec::new();

    for result in results {
        if !seen_partitions.insert(result.partition_id.clone()) {
            tracing::warn!(partition = %result.partition_id, "duplicate partition result dropped");
            continue;
        }
        let mutations = match result.outcome {
            Ok(mutations) => mutations,
            Err(e) => {
                errors.push(format!("{}: {e}", result.partition_id));
                continue;
            }
        };
        for mutation in mutations {
            merge(&mut unique, mutation);
        }
    }

    let total = unique.len();
    let killed = unique.values().filter(|m| m.detected()).count();
    let mut mutations_by_class: BTreeMap<String, Vec<EnrichedMutation>> = BTreeMap::new();
    for mutation in unique.into_values() {
        mutations_by_class
            .entry(mutation.raw.mutated_class.clone())
            .or_default()
            .push(mutation);
    }

    AggregatedResult {
        mutations_by_class,
        total,
        killed,
        score: score(killed, total),
        errors,
    }
}

fn merge(unique: &mut BTreeMap<UniqueMutationKey, EnrichedMutation>, mutation: EnrichedMutation) {
    match unique.get_mut(&mutation.key()) {
        Some(stored) => {
            if !stored.detected() && mutation.detected() {
                *stored = mutation;
            }
        }
        None => {
            unique.insert(mutation.key(), mutation);
        }
    }
}

pub fn score(killed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        killed as f64 / total as f64 * 100.0
    }
}

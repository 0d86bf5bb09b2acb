use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::{PartitionStrategy, RunConfig};
use crate::mutants::{package_of, simple_class_name};

/// An independently executable slice of the class/test universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub id: String,
    pub target_classes: BTreeSet<String>,
    pub target_tests: BTreeSet<String>,
    pub properties: BTreeMap<String, String>,
}

impl Partition {
    fn new(id: String, classes: BTreeSet<String>, tests: BTreeSet<String>) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("targetClasses".to_string(), join(&classes));
        properties.insert("targetTests".to_string(), join(&tests));
        Partition {
            id,
            target_classes: classes,
            target_tests: tests,
            properties,
        }
    }
}

fn join(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

pub fn partition(classes: &[String], tests: &[String], config: &RunConfig) -> Vec<Partition> {
    match config.partition_strategy {
        PartitionStrategy::Package => by_package(classes, tests),
        PartitionStrategy::Default => by_size(classes, tests, config.classes_per_partition),
    }
}

/// One partition per non-empty package, in order of first appearance.
pub fn by_package(classes: &[String], tests: &[String]) -> Vec<Partition> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
    for class in classes {
        let pkg = package_of(class);
        let group = groups.entry(pkg).or_insert_with(|| {
            order.push(pkg);
            BTreeSet::new()
        });
        group.insert(class.clone());
    }

    order
        .into_iter()
        .map(|pkg| {
            let members = groups.remove(pkg).unwrap_or_default();
            let sibling_pkgs = [pkg.to_string(), format!("{pkg}.test"), format!("{pkg}.tests")];
            let tests: BTreeSet<String> = tests
                .iter()
                .filter(|t| {
                    let test_pkg = package_of(t);
                    sibling_pkgs.iter().any(|p| p == test_pkg)
                        || members.iter().any(|c| test_matches_class(t, c))
                })
                .cloned()
                .collect();
            let id = if pkg.is_empty() { "(default)".to_string() } else { pkg.to_string() };
            let mut partition = Partition::new(id, members, tests);
            partition.properties.insert("package".to_string(), pkg.to_string());
            partition
        })
        .collect()
}

/// Discovery-order batches of at most `max_classes`; the trailing short batch is kept.
pub fn by_size(classes: &[String], tests: &[String], max_classes: usize) -> Vec<Partition> {
    let max_classes = max_classes.max(1);
    let mut seen = HashSet::new();
    let unique: Vec<&String> = classes.iter().filter(|c| seen.insert(c.as_str())).collect();

    unique
        .chunks(max_classes)
        .enumerate()
        .map(|(idx, chunk)| {
            let members: BTreeSet<String> = chunk.iter().map(|c| (*c).clone()).collect();
            let tests: BTreeSet<String> = tests
                .iter()
                .filter(|t| members.iter().any(|c| test_matches_class(t, c)))
                .cloned()
                .collect();
            Partition::new(format!("batch-{idx:03}"), members, tests)
        })
        .collect()
}

/// `FooTest`, `TestFoo` and anything containing `Foo` cover class `Foo`.
pub fn test_matches_class(test: &str, class: &str) -> bool {
    let test_name = simple_class_name(test);
    let class_name = simple_class_name(class);
    if class_name.is_empty() {
        return false;
    }
    test_name == format!("{class_name}Test")
        || test_name == format!("Test{class_name}")
        || test_name.contains(class_name)
}

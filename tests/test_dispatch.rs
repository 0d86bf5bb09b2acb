mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{FakeCluster, Script, fast_settings, report, sample_project, succeed};
use mutfleet::config::{PartitionStrategy, RunConfig};
use mutfleet::dispatch::{dispatch, run_all};
use mutfleet::error::PartitionError;
use mutfleet::executor::{Executor, UnitState};
use mutfleet::partition::{Partition, by_size};
use mutfleet::project::ProjectDescriptor;
use tempfile::TempDir;

fn batches(n: usize) -> Vec<Partition> {
    let classes: Vec<String> = (0..n).map(|i| format!("com.acme.C{i}")).collect();
    by_size(&classes, &[], 1)
}

fn slow_success() -> Script {
    Script::Succeed {
        polls: 3,
        artifacts: common::artifacts(&report(&[])),
    }
}

fn project(dir: &TempDir) -> Arc<ProjectDescriptor> {
    sample_project(dir.path());
    Arc::new(ProjectDescriptor::discover(dir.path()).unwrap())
}

#[test]
fn results_keep_partition_order_and_respect_pool_bound() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeCluster::new(slow_success()));
    let executor = Executor::new(fake.clone(), project(&dir), fast_settings(Duration::from_secs(5)));
    let partitions = batches(5);

    let runs = dispatch(&executor, &partitions, 2, Duration::from_secs(30)).unwrap();

    let ids: Vec<&str> = runs.iter().map(|r| r.partition_id.as_str()).collect();
    assert_eq!(ids, vec!["batch-000", "batch-001", "batch-002", "batch-003", "batch-004"]);
    assert!(runs.iter().all(|r| r.outcome.is_ok()));
    assert!(runs.iter().all(|r| r.final_state() == Some(UnitState::Cleaned)));
    assert!(fake.max_live() <= 2, "saw {} live units", fake.max_live());
    assert_eq!(fake.deleted_units().len(), 5);
}

#[test]
fn one_failing_partition_does_not_abort_siblings() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(
        FakeCluster::new(slow_success()).with(
            "batch-001",
            Script::Fail {
                summary: "BUILD FAILURE".to_string(),
            },
        ),
    );
    let executor = Executor::new(fake.clone(), project(&dir), fast_settings(Duration::from_secs(5)));

    let runs = dispatch(&executor, &batches(3), 3, Duration::from_secs(30)).unwrap();

    assert!(runs[0].outcome.is_ok());
    assert!(matches!(runs[1].outcome, Err(PartitionError::UnitFailed { .. })));
    assert!(runs[2].outcome.is_ok());
}

#[test]
fn run_budget_abandons_and_tears_down_outstanding_units() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeCluster::new(Script::Hang));
    let executor = Executor::new(fake.clone(), project(&dir), fast_settings(Duration::from_secs(10)));

    let started = Instant::now();
    let runs = dispatch(&executor, &batches(3), 1, Duration::from_millis(80)).unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(runs.len(), 3);
    for run in &runs {
        assert!(matches!(run.outcome, Err(PartitionError::RunTimeout)));
        // Queued partitions never start; the in-flight one cancels and cleans itself.
        assert!(run.history.is_empty() || run.final_state() == Some(UnitState::Cleaned));
    }
    assert_eq!(runs[0].final_state(), Some(UnitState::Cleaned));
    let deleted = fake.deleted_units();
    for unit in ["mutfleet-t1-0", "mutfleet-t1-1", "mutfleet-t1-2"] {
        assert!(deleted.iter().any(|d| d == unit), "{unit} was not torn down");
    }
    assert!(fake.deleted_configs().iter().any(|c| c == "mutfleet-t1-0-src"));
}

#[test]
fn slow_publish_past_the_budget_never_creates_units() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeCluster::new(Script::Hang).with_publish_delay(Duration::from_millis(200)));
    let executor = Executor::new(fake.clone(), project(&dir), fast_settings(Duration::from_secs(10)));

    let runs = dispatch(&executor, &batches(2), 2, Duration::from_millis(50)).unwrap();

    assert!(runs.iter().all(|r| matches!(r.outcome, Err(PartitionError::RunTimeout))));
    assert!(fake.created().is_empty(), "units created after the budget expired");

    let events = fake.events();
    let published = fake.published();
    assert!(!published.is_empty());
    for (config, _) in &published {
        let publish = events.iter().position(|e| *e == format!("publish {config}")).unwrap();
        let last_delete = events
            .iter()
            .rposition(|e| *e == format!("delete-config {config}"))
            .unwrap_or_else(|| panic!("{config} leaked: {events:?}"));
        assert!(last_delete > publish, "{config} deleted before it was published: {events:?}");
    }
}

#[test]
fn empty_partition_list_dispatches_nothing() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeCluster::new(Script::Hang));
    let executor = Executor::new(fake.clone(), project(&dir), fast_settings(Duration::from_secs(1)));

    let runs = dispatch(&executor, &[], 4, Duration::from_secs(1)).unwrap();
    assert!(runs.is_empty());
    assert!(fake.created().is_empty());
}

fn package_config() -> RunConfig {
    let mut config = RunConfig::default()
        .with_strategy(PartitionStrategy::Package)
        .with_image("registry.local/mutfleet:test")
        .with_namespace("ci")
        .with_max_parallel_units(2)
        .with_unit_timeout_seconds(1);
    config.poll_interval_seconds = 1;
    config.run_timeout_seconds = 60;
    config
}

#[test]
fn run_all_enriches_and_records_timed_out_partition() {
    let dir = TempDir::new().unwrap();
    let project = project(&dir);
    let cart = report(&[
        (
            "com.acme.cart.Cart",
            "add",
            7,
            "org.pitest.mutationtest.engine.gregor.mutators.ConditionalsBoundaryMutator",
            true,
            "changed conditional boundary",
        ),
        (
            "com.acme.cart.Cart",
            "add",
            8,
            "org.pitest.mutationtest.engine.gregor.mutators.MathMutator",
            false,
            "Replaced integer addition with subtraction",
        ),
    ]);
    let fake = Arc::new(
        FakeCluster::new(Script::Hang)
            .with("com.acme.cart", succeed(&cart))
            .with("com.acme.order", Script::Hang),
    );

    let run = run_all(fake.clone(), project, &package_config(), "r1").unwrap();

    assert_eq!(run.partitions.len(), 2);
    assert_eq!(run.result.total, 2);
    assert_eq!(run.result.killed, 1);
    assert_eq!(run.result.score, 50.0);
    assert_eq!(run.result.errors.len(), 1);
    assert!(run.result.errors[0].starts_with("com.acme.order: timed out"));

    let mutations = run.result.class("com.acme.cart.Cart").unwrap();
    let boundary = mutations.iter().find(|m| m.raw.line_number == 7).unwrap();
    assert_eq!(boundary.original_code_snippet, "if (price > 0)");
    assert_eq!(boundary.synthesized_mutated_snippet, "if (price >= 0)");
    assert_eq!(boundary.diff, "- if (price > 0)\n+ if (price >= 0)\n");
    assert_eq!(boundary.raw.first_line, 6);
    assert_eq!(boundary.raw.last_line, 10);

    let math = mutations.iter().find(|m| m.raw.line_number == 8).unwrap();
    assert_eq!(math.synthesized_mutated_snippet, "total = total - price;");

    let deleted = fake.deleted_units();
    assert!(deleted.contains(&"mutfleet-r1-0".to_string()));
    assert!(deleted.contains(&"mutfleet-r1-1".to_string()));
}

#[test]
fn malformed_report_is_listed_as_a_partition_error() {
    let dir = TempDir::new().unwrap();
    let project = project(&dir);
    let fake = Arc::new(
        FakeCluster::new(succeed(&report(&[])))
            .with("com.acme.cart", succeed("<mutations><mutation>garbage")),
    );

    let run = run_all(fake.clone(), project, &package_config(), "r4").unwrap();

    assert_eq!(run.result.total, 0);
    assert_eq!(run.result.errors.len(), 1);
    assert!(run.result.errors[0].starts_with("com.acme.cart: "));
    assert!(run.result.errors[0].contains("malformed mutation report"));
}

#[test]
fn run_all_with_no_matching_classes_is_empty() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeCluster::new(Script::Hang));
    let config = package_config().with_target_classes("org.other.*");

    let run = run_all(fake.clone(), project(&dir), &config, "r2").unwrap();
    assert!(run.partitions.is_empty());
    assert!(run.runs.is_empty());
    assert_eq!(run.result.total, 0);
    assert!(fake.created().is_empty());
}

#[test]
fn run_all_rejects_invalid_config_before_remote_work() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeCluster::new(Script::Hang));
    let config = package_config().with_image("");

    assert!(run_all(fake.clone(), project(&dir), &config, "r3").is_err());
    assert!(fake.published().is_empty());
}

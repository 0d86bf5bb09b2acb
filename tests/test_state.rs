use std::fs;
use std::time::Duration;

use mutfleet::aggregate::{PartitionResult, aggregate};
use mutfleet::collector::CollectedOutput;
use mutfleet::dispatch::RunReport;
use mutfleet::error::PartitionError;
use mutfleet::executor::{PartitionRun, UnitState};
use mutfleet::mutants::{EnrichedMutation, MutantStatus, RawMutation};
use mutfleet::partition::by_size;
use mutfleet::project::Coordinates;
use mutfleet::state::{self, PartitionSummary, RunBundle, STATE_DIR};
use tempfile::TempDir;

fn coords(version: &str) -> Coordinates {
    Coordinates {
        group_id: "com.acme".to_string(),
        artifact_id: "shop".to_string(),
        version: version.to_string(),
    }
}

fn mutation(line: usize, detected: bool) -> EnrichedMutation {
    EnrichedMutation {
        raw: RawMutation {
            mutated_class: "com.acme.Cart".to_string(),
            mutated_method: "add".to_string(),
            line_number: line,
            mutator_id: "org.pitest.mutationtest.engine.gregor.mutators.MathMutator".to_string(),
            description: "Replaced integer addition with subtraction".to_string(),
            detected,
            killing_test: None,
            status: if detected { MutantStatus::Killed } else { MutantStatus::Survived },
            source_file: "Cart.java".to_string(),
            package_name: "com.acme".to_string(),
            first_line: 6,
            last_line: 10,
            index_list: vec![5],
            block_list: vec![1],
        },
        original_code_snippet: "total = total + price;".to_string(),
        synthesized_mutated_snippet: "total = total - price;".to_string(),
        block_id: 1,
        diff: "- total = total + price;\n+ total = total - price;\n".to_string(),
    }
}

fn bundle(run_id: &str, version: &str, finished_at: u64) -> RunBundle {
    RunBundle {
        run_id: run_id.to_string(),
        coordinates: coords(version),
        started_at: finished_at.saturating_sub(30),
        finished_at,
        partition_count: 1,
        partitions: vec![PartitionSummary {
            partition_id: "batch-000".to_string(),
            unit: "mutfleet-a-0".to_string(),
            duration_ms: 1200,
            final_state: Some("Cleaned".to_string()),
            error: None,
        }],
        result: aggregate(vec![PartitionResult::success(
            "batch-000",
            vec![mutation(8, true), mutation(9, false)],
        )]),
    }
}

#[test]
fn bundle_round_trips_through_disk() {
    let dir = TempDir::new().unwrap();
    let original = bundle("a1", "1.0", 1_700_000_000);

    let path = state::save_bundle(dir.path(), &original).unwrap();
    assert_eq!(path, dir.path().join(STATE_DIR).join("com.acme_shop_1.0.json"));

    let loaded = state::load_bundle(dir.path(), &coords("1.0")).unwrap();
    assert_eq!(loaded, original);
    assert_eq!(loaded.result.total, 2);
    assert_eq!(loaded.result.survived(), 1);
    let snippet = &loaded.result.class("com.acme.Cart").unwrap()[1].synthesized_mutated_snippet;
    assert_eq!(snippet, "total = total - price;");
}

#[test]
fn bundle_path_is_keyed_by_coordinates() {
    let root = std::path::Path::new("/work/shop");
    let odd = Coordinates {
        group_id: "com.acme".to_string(),
        artifact_id: "shop/api".to_string(),
        version: "1.0 SNAPSHOT".to_string(),
    };
    assert_eq!(
        state::bundle_path(root, &odd),
        root.join(".mutfleet").join("com.acme_shop_api_1.0_SNAPSHOT.json")
    );
}

#[test]
fn missing_bundle_is_a_read_error() {
    let dir = TempDir::new().unwrap();
    let err = state::load_bundle(dir.path(), &coords("9.9")).unwrap_err();
    assert!(err.to_string().contains("failed to read"));
}

#[test]
fn corrupt_bundle_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = state::bundle_path(dir.path(), &coords("1.0"));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "{ not json").unwrap();
    let err = state::load_from_path(&path).unwrap_err();
    assert!(err.to_string().contains("not valid"));
}

#[test]
fn load_latest_picks_most_recent_finish() {
    let dir = TempDir::new().unwrap();
    assert!(state::load_latest(dir.path()).is_none());

    state::save_bundle(dir.path(), &bundle("old", "1.0", 1_000)).unwrap();
    state::save_bundle(dir.path(), &bundle("new", "2.0", 2_000)).unwrap();
    fs::write(dir.path().join(STATE_DIR).join("junk.json"), "[]").unwrap();
    fs::write(dir.path().join(STATE_DIR).join("notes.txt"), "ignore me").unwrap();

    let latest = state::load_latest(dir.path()).unwrap();
    assert_eq!(latest.run_id, "new");
}

#[test]
fn from_report_summarizes_each_partition() {
    let partitions = by_size(&["com.acme.A".to_string(), "com.acme.B".to_string()], &[], 1);
    let runs = vec![
        PartitionRun {
            partition_id: "batch-000".to_string(),
            unit: "mutfleet-x-0".to_string(),
            history: vec![UnitState::Created, UnitState::Succeeded, UnitState::Cleaned],
            duration: Duration::from_millis(1500),
            outcome: Ok(CollectedOutput::default()),
        },
        PartitionRun {
            partition_id: "batch-001".to_string(),
            unit: "mutfleet-x-1".to_string(),
            history: Vec::new(),
            duration: Duration::from_secs(3),
            outcome: Err(PartitionError::RunTimeout),
        },
    ];
    let report = RunReport {
        run_id: "x".to_string(),
        partitions,
        runs,
        result: aggregate(vec![
            PartitionResult::success("batch-000", Vec::new()),
            PartitionResult::failure("batch-001", "run budget exhausted"),
        ]),
    };

    let bundle = RunBundle::from_report(&report, &coords("1.0"), 10);
    assert_eq!(bundle.run_id, "x");
    assert_eq!(bundle.partition_count, 2);
    assert_eq!(bundle.started_at, 10);
    assert!(bundle.finished_at >= 10);
    assert_eq!(bundle.failed_partitions(), 1);

    assert_eq!(bundle.partitions[0].duration_ms, 1500);
    assert_eq!(bundle.partitions[0].final_state.as_deref(), Some("Cleaned"));
    assert_eq!(bundle.partitions[1].final_state, None);
    assert!(bundle.partitions[1].error.as_deref().unwrap().contains("run budget"));
}

#[test]
fn unreadable_report_is_recorded_on_the_summary() {
    let run = PartitionRun {
        partition_id: "batch-000".to_string(),
        unit: "mutfleet-x-0".to_string(),
        history: vec![UnitState::Created, UnitState::Succeeded, UnitState::Collected, UnitState::Cleaned],
        duration: Duration::from_millis(900),
        outcome: Ok(CollectedOutput {
            parse_error: Some("malformed mutation report: unexpected end of input".to_string()),
            ..CollectedOutput::default()
        }),
    };

    let summary = PartitionSummary::from_run(&run);
    assert_eq!(summary.final_state.as_deref(), Some("Cleaned"));
    assert!(summary.error.as_deref().unwrap().starts_with("malformed mutation report"));
}

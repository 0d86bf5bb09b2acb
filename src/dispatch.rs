use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use rayon::ThreadPoolBuilder;

use crate::aggregate::{self, AggregatedResult, PartitionResult};
use crate::cluster::ClusterClient;
use crate::config::RunConfig;
use crate::enrich::Enricher;
use crate::error::{PartitionError, RunError};
use crate::executor::{Executor, ExecutorSettings, PartitionRun};
use crate::partition::{self, Partition};
use crate::project::ProjectDescriptor;

/// Longest wait for in-flight workers to tear their own units down after the
/// run budget expired.
const TEARDOWN_GRACE: Duration = Duration::from_secs(30);

/// Run every partition, at most `max_parallel` at a time, within `run_timeout`.
///
/// Results come back in partition order. Once the budget runs out, queued
/// partitions are never started and in-flight ones are cancelled; anything
/// still unreported after [`TEARDOWN_GRACE`] is torn down from here.
pub fn dispatch(
    executor: &Executor,
    partitions: &[Partition],
    max_parallel: usize,
    run_timeout: Duration,
) -> Result<Vec<PartitionRun>, RunError> {
    if partitions.is_empty() {
        return Ok(Vec::new());
    }
    let workers = max_parallel.max(1).min(partitions.len());
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("mutfleet-worker-{i}"))
        .build()
        .map_err(|e| RunError::Pool(e.to_string()))?;
    tracing::info!("dispatching {} partitions on {workers} workers", partitions.len());

    let started = Instant::now();
    let deadline = started + run_timeout;
    let expired = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel::<(usize, Option<PartitionRun>)>();

    for (ordinal, partition) in partitions.iter().enumerate() {
        let executor = executor.clone();
        let partition = partition.clone();
        let expired = Arc::clone(&expired);
        let tx = tx.clone();
        pool.spawn(move || {
            if expired.load(Ordering::SeqCst) {
                tracing::debug!(partition = %partition.id, "run budget spent, not starting");
                let _ = tx.send((ordinal, None));
                return;
            }
            let run = executor.run_with_cancel(ordinal, &partition, &expired);
            // The receiver is gone once the teardown grace ran out.
            let _ = tx.send((ordinal, Some(run)));
        });
    }
    drop(tx);

    let mut slots: Vec<Option<PartitionRun>> = partitions.iter().map(|_| None).collect();
    let mut received = 0;
    let mut deadline = deadline;
    while received < partitions.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((ordinal, run)) => {
                slots[ordinal] = run;
                received += 1;
            }
            Err(RecvTimeoutError::Timeout) if !expired.load(Ordering::SeqCst) => {
                expired.store(true, Ordering::SeqCst);
                tracing::warn!(
                    "run budget of {}s exhausted with {} partitions outstanding",
                    run_timeout.as_secs(),
                    partitions.len() - received
                );
                deadline = Instant::now() + TEARDOWN_GRACE;
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("{} partitions did not finish teardown in time", partitions.len() - received);
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let runs = slots
        .into_iter()
        .enumerate()
        .map(|(ordinal, slot)| match slot {
            Some(run) => run,
            None => abandon(executor, ordinal, &partitions[ordinal], started.elapsed()),
        })
        .collect();
    Ok(runs)
}

/// Forced teardown for a partition that missed the run budget.
fn abandon(executor: &Executor, ordinal: usize, partition: &Partition, elapsed: Duration) -> PartitionRun {
    let handle = executor.handle_for(ordinal);
    let client = executor.client();
    if let Err(e) = client.delete_unit(&handle) {
        tracing::warn!(unit = %handle.unit, "forced teardown failed: {e}");
    }
    if let Err(e) = client.delete_config(&handle) {
        tracing::warn!(config = %handle.config, "forced teardown failed: {e}");
    }
    PartitionRun {
        partition_id: partition.id.clone(),
        unit: handle.unit,
        history: Vec::new(),
        duration: elapsed,
        outcome: Err(PartitionError::RunTimeout),
    }
}

/// Enrich successful runs. Failed runs and unreadable reports become error entries.
pub fn into_results(runs: &[PartitionRun], enricher: &mut Enricher) -> Vec<PartitionResult> {
    runs.iter()
        .map(|run| match &run.outcome {
            Ok(collected) => match &collected.parse_error {
                Some(e) => PartitionResult::failure(&run.partition_id, e.clone()),
                None => PartitionResult::success(
                    &run.partition_id,
                    enricher.enrich_all(collected.mutations.clone()),
                ),
            },
            Err(e) => PartitionResult::failure(&run.partition_id, e.to_string()),
        })
        .collect()
}

/// Everything one run produced.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub partitions: Vec<Partition>,
    pub runs: Vec<PartitionRun>,
    pub result: AggregatedResult,
}

/// Validate, partition, execute, enrich and aggregate.
pub fn run_all(
    client: Arc<dyn ClusterClient>,
    project: Arc<ProjectDescriptor>,
    config: &RunConfig,
    run_id: &str,
) -> Result<RunReport, RunError> {
    config.validate()?;
    let class_filter = config.class_filter()?;
    let test_filter = config.test_filter()?;

    let classes: Vec<String> = project
        .classes()
        .into_iter()
        .filter(|c| class_filter.matches(c))
        .collect();
    let tests: Vec<String> = project
        .test_classes()
        .into_iter()
        .filter(|t| test_filter.matches(t))
        .collect();
    let partitions = partition::partition(&classes, &tests, config);
    tracing::info!(
        run = run_id,
        "{} classes, {} tests, {} partitions",
        classes.len(),
        tests.len(),
        partitions.len()
    );
    if partitions.is_empty() {
        return Ok(RunReport {
            run_id: run_id.to_string(),
            partitions,
            runs: Vec::new(),
            result: AggregatedResult::default(),
        });
    }

    let executor = Executor::new(
        client,
        Arc::clone(&project),
        ExecutorSettings::from_config(config, run_id),
    );
    let runs = dispatch(&executor, &partitions, config.max_parallel_units, config.run_timeout())?;

    let mut enricher = Enricher::new(project.source_roots.clone());
    let result = aggregate::aggregate(into_results(&runs, &mut enricher));
    Ok(RunReport {
        run_id: run_id.to_string(),
        partitions,
        runs,
        result,
    })
}

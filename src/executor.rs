use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::cluster::{ClusterClient, SUMMARY_ARTIFACT, UnitHandle, UnitPhase, UnitSpec, remote_script};
use crate::collector::{self, CollectedOutput};
use crate::config::{PullPolicy, RunConfig};
use crate::error::PartitionError;
use crate::packager::{self, PackageOptions};
use crate::partition::Partition;
use crate::project::ProjectDescriptor;

/// Consecutive failed status polls tolerated before the unit is given up on.
const MAX_POLL_ERRORS: u32 = 3;

/// `Cleaned` is reached on every path, failures included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Created,
    ConfigPublished,
    Scheduled,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Collected,
    Cleaned,
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub run_id: String,
    pub namespace: String,
    pub image: String,
    pub pull_policy: PullPolicy,
    pub memory_limit: String,
    pub cpu_limit: String,
    pub build_command: String,
    pub resource_extensions: Vec<String>,
    pub max_entry_bytes: usize,
    pub poll_interval: Duration,
    pub progress_interval: Duration,
    pub unit_timeout: Duration,
}

impl ExecutorSettings {
    pub fn from_config(config: &RunConfig, run_id: &str) -> Self {
        ExecutorSettings {
            run_id: run_id.to_string(),
            namespace: config.namespace.clone(),
            image: config.image.clone(),
            pull_policy: config.image_pull_policy,
            memory_limit: config.memory_limit.clone(),
            cpu_limit: config.cpu_limit.clone(),
            build_command: config.build_command.clone(),
            resource_extensions: config.resource_extensions.clone(),
            max_entry_bytes: config.max_entry_bytes,
            poll_interval: config.poll_interval(),
            progress_interval: config.progress_interval(),
            unit_timeout: config.unit_timeout(),
        }
    }
}

/// What one partition produced, successful or not.
#[derive(Debug)]
pub struct PartitionRun {
    pub partition_id: String,
    pub unit: String,
    pub history: Vec<UnitState>,
    pub duration: Duration,
    pub outcome: Result<CollectedOutput, PartitionError>,
}

impl PartitionRun {
    pub fn final_state(&self) -> Option<UnitState> {
        self.history.last().copied()
    }
}

struct StateTracker<'a> {
    partition: &'a str,
    unit: &'a str,
    history: Vec<UnitState>,
}

impl<'a> StateTracker<'a> {
    fn new(partition: &'a str, unit: &'a str) -> Self {
        StateTracker {
            partition,
            unit,
            history: vec![UnitState::Created],
        }
    }

    fn current(&self) -> UnitState {
        *self.history.last().unwrap_or(&UnitState::Created)
    }

    fn advance(&mut self, next: UnitState) {
        tracing::info!(
            partition = self.partition,
            unit = self.unit,
            "{} -> {}",
            self.current(),
            next
        );
        self.history.push(next);
    }

    fn dump(&self) -> String {
        self.history
            .iter()
            .map(UnitState::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

#[derive(Clone)]
pub struct Executor {
    client: Arc<dyn ClusterClient>,
    project: Arc<ProjectDescriptor>,
    settings: Arc<ExecutorSettings>,
}

impl Executor {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        project: Arc<ProjectDescriptor>,
        settings: ExecutorSettings,
    ) -> Self {
        Executor {
            client,
            project,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub fn client(&self) -> &Arc<dyn ClusterClient> {
        &self.client
    }

    pub fn handle_for(&self, ordinal: usize) -> UnitHandle {
        UnitHandle::new(&self.settings.namespace, &self.settings.run_id, ordinal)
    }

    /// Run one partition end to end. Never panics on remote failures and
    /// always tears its unit down before returning.
    pub fn run(&self, ordinal: usize, partition: &Partition) -> PartitionRun {
        self.run_with_cancel(ordinal, partition, &AtomicBool::new(false))
    }

    /// Like [`Executor::run`], but gives up with [`PartitionError::RunTimeout`]
    /// once `cancel` is set. Cleanup still runs afterwards.
    pub fn run_with_cancel(&self, ordinal: usize, partition: &Partition, cancel: &AtomicBool) -> PartitionRun {
        let started = Instant::now();
        let handle = self.handle_for(ordinal);
        let mut tracker = StateTracker::new(&partition.id, &handle.unit);

        let outcome = self.drive(partition, &handle, &mut tracker, cancel);
        if let Err(e) = &outcome {
            tracing::warn!(partition = %partition.id, "partition failed: {e}");
        }
        self.cleanup(&handle, &mut tracker);

        PartitionRun {
            partition_id: partition.id.clone(),
            unit: handle.unit.clone(),
            history: tracker.history,
            duration: started.elapsed(),
            outcome,
        }
    }

    fn drive(
        &self,
        partition: &Partition,
        handle: &UnitHandle,
        tracker: &mut StateTracker<'_>,
        cancel: &AtomicBool,
    ) -> Result<CollectedOutput, PartitionError> {
        let options = PackageOptions {
            resource_extensions: &self.settings.resource_extensions,
            max_entry_bytes: self.settings.max_entry_bytes,
        };
        let channel = packager::package_project(&self.project, partition, &options)?;
        check_cancel(cancel)?;
        self.client.publish_config(handle, &channel)?;
        tracker.advance(UnitState::ConfigPublished);

        check_cancel(cancel)?;
        self.client.create_unit(&self.unit_spec(handle, partition))?;
        tracker.advance(UnitState::Scheduled);

        match self.poll(handle, tracker, cancel)? {
            UnitPhase::Succeeded => {
                let artifacts = self.client.fetch_artifacts(handle)?;
                tracker.advance(UnitState::Collected);
                Ok(collector::collect(&partition.id, &artifacts))
            }
            _ => {
                let reason = match self.client.fetch_artifacts(handle) {
                    Ok(artifacts) => {
                        tracker.advance(UnitState::Collected);
                        artifacts
                            .get(SUMMARY_ARTIFACT)
                            .map(|s| tail(s, 20))
                            .unwrap_or_else(|| "no summary produced".to_string())
                    }
                    Err(e) => format!("no summary available: {e}"),
                };
                Err(PartitionError::UnitFailed {
                    unit: handle.unit.clone(),
                    reason,
                })
            }
        }
    }

    fn unit_spec(&self, handle: &UnitHandle, partition: &Partition) -> UnitSpec {
        UnitSpec {
            handle: handle.clone(),
            partition_id: partition.id.clone(),
            image: self.settings.image.clone(),
            pull_policy: self.settings.pull_policy,
            memory_limit: self.settings.memory_limit.clone(),
            cpu_limit: self.settings.cpu_limit.clone(),
            script: remote_script(&self.settings.build_command),
            // Let the cluster reap the unit a little after we stop waiting for it.
            deadline_seconds: self.settings.unit_timeout.as_secs() + 60,
        }
    }

    /// Poll until the unit reaches a terminal phase or the unit budget runs out.
    fn poll(
        &self,
        handle: &UnitHandle,
        tracker: &mut StateTracker<'_>,
        cancel: &AtomicBool,
    ) -> Result<UnitPhase, PartitionError> {
        let started = Instant::now();
        let mut last_progress = Instant::now();
        let mut last_phase = UnitPhase::Unknown;
        let mut poll_errors = 0;

        loop {
            match self.client.unit_phase(handle) {
                Ok(phase) => {
                    poll_errors = 0;
                    last_phase = phase;
                    if phase != UnitPhase::Pending
                        && phase != UnitPhase::Unknown
                        && tracker.current() == UnitState::Scheduled
                    {
                        tracker.advance(UnitState::Running);
                    }
                    if phase.is_terminal() {
                        tracker.advance(if phase == UnitPhase::Succeeded {
                            UnitState::Succeeded
                        } else {
                            UnitState::Failed
                        });
                        return Ok(phase);
                    }
                }
                Err(e) => {
                    poll_errors += 1;
                    tracing::warn!(unit = %handle.unit, "status poll failed ({poll_errors}/{MAX_POLL_ERRORS}): {e}");
                    if poll_errors >= MAX_POLL_ERRORS {
                        return Err(e.into());
                    }
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= self.settings.unit_timeout {
                tracker.advance(UnitState::TimedOut);
                return Err(PartitionError::Timeout {
                    elapsed,
                    diagnostics: format!(
                        "unit {} last phase {:?}, states {}",
                        handle.unit,
                        last_phase,
                        tracker.dump()
                    ),
                });
            }

            if last_progress.elapsed() >= self.settings.progress_interval {
                tracing::info!(
                    unit = %handle.unit,
                    "still {:?} after {}s",
                    last_phase,
                    elapsed.as_secs()
                );
                last_progress = Instant::now();
            }

            check_cancel(cancel)?;
            let remaining = self.settings.unit_timeout.saturating_sub(elapsed);
            std::thread::sleep(self.settings.poll_interval.min(remaining));
        }
    }

    /// Delete the unit and its config channel. Failures are logged only.
    fn cleanup(&self, handle: &UnitHandle, tracker: &mut StateTracker<'_>) {
        if let Err(e) = self.client.delete_unit(handle) {
            tracing::warn!(unit = %handle.unit, "failed to delete unit: {e}");
        }
        if let Err(e) = self.client.delete_config(handle) {
            tracing::warn!(config = %handle.config, "failed to delete config channel: {e}");
        }
        tracker.advance(UnitState::Cleaned);
    }
}

fn check_cancel(cancel: &AtomicBool) -> Result<(), PartitionError> {
    if cancel.load(Ordering::SeqCst) {
        return Err(PartitionError::RunTimeout);
    }
    Ok(())
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

use std::collections::BTreeMap;
use std::io::Write;
use std::process::{Command, Stdio};

use serde_json::{Value, json};

use crate::config::PullPolicy;
use crate::error::ClusterError;
use crate::packager::SourceChannel;

pub const CONFIG_MOUNT: &str = "/config";
pub const WORKSPACE_DIR: &str = "/workspace";
pub const RESULTS_DIR: &str = "/results";
pub const REPORT_ARTIFACT: &str = "mutations.xml";
pub const SUMMARY_ARTIFACT: &str = "summary.txt";

const MARKER: &str = "@@mutfleet-artifact";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl UnitPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitPhase::Succeeded | UnitPhase::Failed)
    }
}

/// Names of the remote objects backing one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitHandle {
    pub namespace: String,
    pub unit: String,
    pub config: String,
}

impl UnitHandle {
    pub fn new(namespace: &str, run_id: &str, ordinal: usize) -> Self {
        let unit = dns_name(&format!("mutfleet-{run_id}-{ordinal}"));
        let config = dns_name(&format!("{unit}-src"));
        UnitHandle {
            namespace: namespace.to_string(),
            unit,
            config,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnitSpec {
    pub handle: UnitHandle,
    pub partition_id: String,
    pub image: String,
    pub pull_policy: PullPolicy,
    pub memory_limit: String,
    pub cpu_limit: String,
    pub script: String,
    pub deadline_seconds: u64,
}

/// Everything the executor needs from a cluster. Implementations are shared
/// across worker threads.
pub trait ClusterClient: Send + Sync {
    fn publish_config(&self, handle: &UnitHandle, channel: &SourceChannel) -> Result<(), ClusterError>;
    fn create_unit(&self, spec: &UnitSpec) -> Result<(), ClusterError>;
    fn unit_phase(&self, handle: &UnitHandle) -> Result<UnitPhase, ClusterError>;
    fn fetch_artifacts(&self, handle: &UnitHandle) -> Result<BTreeMap<String, String>, ClusterError>;
    fn delete_unit(&self, handle: &UnitHandle) -> Result<(), ClusterError>;
    fn delete_config(&self, handle: &UnitHandle) -> Result<(), ClusterError>;
}

/// DNS-1123 name: lowercase alphanumerics and `-`, at most 63 chars.
pub fn dns_name(raw: &str) -> String {
    let mut name: String = raw
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    name.truncate(63);
    name.trim_matches('-').to_string()
}

fn label_value(raw: &str) -> String {
    let mut value: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect();
    value.truncate(63);
    value.trim_matches(|c: char| !c.is_ascii_alphanumeric()).to_string()
}

/// Shell run by the unit: rebuild the tree, run the tool, frame the artifacts.
pub fn remote_script(build_command: &str) -> String {
    format!(
        r#"set -u
mutfleet unpack --from {config} --to {workspace} || exit 3
cd {workspace}
{build} "-DtargetClasses=$(cat {config}/mutfleet.targetClasses)" "-DtargetTests=$(cat {config}/mutfleet.targetTests)" -DoutputFormats=XML -DtimestampedReports=false > {results}/{summary} 2>&1
status=$?
{emit_summary}
report=$(find {workspace} -name {report} | head -n 1)
if [ -n "$report" ]; then
{emit_report}
fi
exit $status
"#,
        config = CONFIG_MOUNT,
        workspace = WORKSPACE_DIR,
        results = RESULTS_DIR,
        build = build_command,
        summary = SUMMARY_ARTIFACT,
        report = REPORT_ARTIFACT,
        emit_summary = emit_artifact(SUMMARY_ARTIFACT, &format!("{RESULTS_DIR}/{SUMMARY_ARTIFACT}")),
        emit_report = emit_artifact(REPORT_ARTIFACT, "\"$report\""),
    )
}

fn emit_artifact(name: &str, path: &str) -> String {
    format!("echo '{MARKER} {name} begin@@'; cat {path}; echo; echo '{MARKER} {name} end@@'")
}

/// Pull framed artifacts out of a unit's log stream.
pub fn split_artifacts(log: &str) -> BTreeMap<String, String> {
    let mut artifacts = BTreeMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;
    for line in log.lines() {
        if let Some(rest) = line.strip_prefix(MARKER) {
            let rest = rest.trim().trim_end_matches("@@");
            if let Some(name) = rest.strip_suffix(" begin") {
                current = Some((name.to_string(), Vec::new()));
                continue;
            }
            if let Some(name) = rest.strip_suffix(" end") {
                if let Some((open, lines)) = current.take() {
                    if open == name {
                        artifacts.insert(open, lines.join("\n").trim_end().to_string());
                    }
                }
                continue;
            }
        }
        if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    artifacts
}

pub fn config_manifest(handle: &UnitHandle, channel: &SourceChannel) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": handle.config,
            "namespace": handle.namespace,
            "labels": { "app.kubernetes.io/managed-by": "mutfleet" },
        },
        "data": channel.entries(),
    })
}

pub fn unit_manifest(spec: &UnitSpec) -> Value {
    let labels = json!({
        "app.kubernetes.io/managed-by": "mutfleet",
        "mutfleet/partition": label_value(&spec.partition_id),
    });
    json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": spec.handle.unit,
            "namespace": spec.handle.namespace,
            "labels": labels,
        },
        "spec": {
            "backoffLimit": 0,
            "activeDeadlineSeconds": spec.deadline_seconds,
            "ttlSecondsAfterFinished": 3600,
            "template": {
                "metadata": { "labels": labels },
                "spec": {
                    "restartPolicy": "Never",
                    "containers": [{
                        "name": "mutation",
                        "image": spec.image,
                        "imagePullPolicy": spec.pull_policy.as_str(),
                        "command": ["/bin/sh", "-c", spec.script],
                        "resources": {
                            "limits": { "memory": spec.memory_limit, "cpu": spec.cpu_limit },
                            "requests": { "memory": spec.memory_limit, "cpu": spec.cpu_limit },
                        },
                        "volumeMounts": [
                            { "name": "source", "mountPath": CONFIG_MOUNT, "readOnly": true },
                            { "name": "results", "mountPath": RESULTS_DIR },
                        ],
                    }],
                    "volumes": [
                        { "name": "source", "configMap": { "name": spec.handle.config } },
                        { "name": "results", "emptyDir": {} },
                    ],
                },
            },
        },
    })
}

/// Map a Job's `status` block onto a unit phase.
pub fn phase_from_status(job: &Value) -> UnitPhase {
    let status = &job["status"];
    let count = |field: &str| status[field].as_u64().unwrap_or(0);
    let condition = |kind: &str| {
        status["conditions"]
            .as_array()
            .is_some_and(|conds| {
                conds
                    .iter()
                    .any(|c| c["type"] == kind && c["status"] == "True")
            })
    };

    if count("succeeded") > 0 || condition("Complete") {
        UnitPhase::Succeeded
    } else if count("failed") > 0 || condition("Failed") {
        UnitPhase::Failed
    } else if count("active") > 0 {
        UnitPhase::Running
    } else if status.is_object() {
        UnitPhase::Pending
    } else {
        UnitPhase::Unknown
    }
}

/// Talks to the cluster through the `kubectl` binary. Holds no per-call state.
#[derive(Debug, Clone)]
pub struct KubectlClient {
    program: String,
}

impl KubectlClient {
    pub fn new(program: impl Into<String>) -> Self {
        KubectlClient {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<String, ClusterError> {
        let command_line = format!("{} {}", self.program, args.join(" "));
        tracing::debug!("{command_line}");

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|source| ClusterError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(bytes).map_err(|source| ClusterError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        }

        let output = child.wait_with_output().map_err(|source| ClusterError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        if !output.status.success() {
            return Err(ClusterError::Command {
                command: command_line,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn create(&self, manifest: &Value) -> Result<(), ClusterError> {
        let body = serde_json::to_vec(manifest).map_err(|e| ClusterError::Response(e.to_string()))?;
        self.run(&["create", "-f", "-"], Some(&body))?;
        Ok(())
    }

    fn delete(&self, kind: &str, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.run(
            &[
                "delete",
                kind,
                name,
                "-n",
                namespace,
                "--ignore-not-found",
                "--wait=false",
                "--cascade=background",
            ],
            None,
        )?;
        Ok(())
    }
}

impl ClusterClient for KubectlClient {
    fn publish_config(&self, handle: &UnitHandle, channel: &SourceChannel) -> Result<(), ClusterError> {
        self.create(&config_manifest(handle, channel))
    }

    fn create_unit(&self, spec: &UnitSpec) -> Result<(), ClusterError> {
        self.create(&unit_manifest(spec))
    }

    fn unit_phase(&self, handle: &UnitHandle) -> Result<UnitPhase, ClusterError> {
        let out = self.run(
            &["get", "job", &handle.unit, "-n", &handle.namespace, "-o", "json"],
            None,
        )?;
        let job: Value =
            serde_json::from_str(&out).map_err(|e| ClusterError::Response(e.to_string()))?;
        Ok(phase_from_status(&job))
    }

    fn fetch_artifacts(&self, handle: &UnitHandle) -> Result<BTreeMap<String, String>, ClusterError> {
        let target = format!("job/{}", handle.unit);
        let log = self.run(&["logs", &target, "-n", &handle.namespace, "--tail=-1"], None)?;
        Ok(split_artifacts(&log))
    }

    fn delete_unit(&self, handle: &UnitHandle) -> Result<(), ClusterError> {
        self.delete("job", &handle.namespace, &handle.unit)
    }

    fn delete_config(&self, handle: &UnitHandle) -> Result<(), ClusterError> {
        self.delete("configmap", &handle.namespace, &handle.config)
    }
}

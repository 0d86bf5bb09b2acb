#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use mutfleet::cluster::{ClusterClient, UnitHandle, UnitPhase, UnitSpec};
use mutfleet::config::PullPolicy;
use mutfleet::error::ClusterError;
use mutfleet::executor::ExecutorSettings;
use mutfleet::packager::SourceChannel;

/// How a scripted unit behaves.
#[derive(Debug, Clone)]
pub enum Script {
    /// Reports `Running` for `polls` polls, then succeeds with `artifacts`.
    Succeed {
        polls: usize,
        artifacts: BTreeMap<String, String>,
    },
    Fail {
        summary: String,
    },
    /// Never leaves `Running` until deleted.
    Hang,
    CreateError,
    PollError,
}

#[derive(Default)]
struct FakeState {
    unit_partition: HashMap<String, String>,
    polls: HashMap<String, usize>,
    published: Vec<(String, SourceChannel)>,
    created: Vec<UnitSpec>,
    deleted_units: Vec<String>,
    deleted_configs: Vec<String>,
    live: HashSet<String>,
    max_live: usize,
    events: Vec<String>,
}

/// In-memory cluster driven by per-partition scripts.
pub struct FakeCluster {
    scripts: HashMap<String, Script>,
    fallback: Script,
    publish_delay: Duration,
    state: Mutex<FakeState>,
}

impl FakeCluster {
    pub fn new(fallback: Script) -> Self {
        FakeCluster {
            scripts: HashMap::new(),
            fallback,
            publish_delay: Duration::ZERO,
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with(mut self, partition_id: &str, script: Script) -> Self {
        self.scripts.insert(partition_id.to_string(), script);
        self
    }

    /// Every `publish_config` call blocks for `delay` before it lands.
    pub fn with_publish_delay(mut self, delay: Duration) -> Self {
        self.publish_delay = delay;
        self
    }

    fn script_for_unit(&self, unit: &str) -> Script {
        let state = self.state.lock().unwrap();
        state
            .unit_partition
            .get(unit)
            .and_then(|p| self.scripts.get(p))
            .unwrap_or(&self.fallback)
            .clone()
    }

    pub fn published(&self) -> Vec<(String, SourceChannel)> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn created(&self) -> Vec<UnitSpec> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted_units(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_units.clone()
    }

    pub fn deleted_configs(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_configs.clone()
    }

    pub fn max_live(&self) -> usize {
        self.state.lock().unwrap().max_live
    }

    /// Cluster calls in the order they landed, e.g. `"publish mutfleet-t1-0-src"`.
    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }
}

fn api_error(msg: &str) -> ClusterError {
    ClusterError::Command {
        command: "kubectl fake".to_string(),
        code: Some(1),
        stderr: msg.to_string(),
    }
}

impl ClusterClient for FakeCluster {
    fn publish_config(&self, handle: &UnitHandle, channel: &SourceChannel) -> Result<(), ClusterError> {
        std::thread::sleep(self.publish_delay);
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("publish {}", handle.config));
        state.published.push((handle.config.clone(), channel.clone()));
        Ok(())
    }

    fn create_unit(&self, spec: &UnitSpec) -> Result<(), ClusterError> {
        if matches!(self.scripts.get(&spec.partition_id), Some(Script::CreateError)) {
            return Err(api_error("quota exceeded"));
        }
        let mut state = self.state.lock().unwrap();
        state
            .unit_partition
            .insert(spec.handle.unit.clone(), spec.partition_id.clone());
        state.events.push(format!("create {}", spec.handle.unit));
        state.created.push(spec.clone());
        state.live.insert(spec.handle.unit.clone());
        state.max_live = state.max_live.max(state.live.len());
        Ok(())
    }

    fn unit_phase(&self, handle: &UnitHandle) -> Result<UnitPhase, ClusterError> {
        let script = self.script_for_unit(&handle.unit);
        let mut state = self.state.lock().unwrap();
        if state.deleted_units.contains(&handle.unit) {
            return Err(api_error("jobs.batch not found"));
        }
        let polls = state.polls.entry(handle.unit.clone()).or_insert(0);
        *polls += 1;
        match script {
            Script::Succeed { polls: wait, .. } if *polls > wait => Ok(UnitPhase::Succeeded),
            Script::Succeed { .. } | Script::Hang => Ok(UnitPhase::Running),
            Script::Fail { .. } => Ok(UnitPhase::Failed),
            Script::PollError => Err(api_error("connection refused")),
            Script::CreateError => Ok(UnitPhase::Unknown),
        }
    }

    fn fetch_artifacts(&self, handle: &UnitHandle) -> Result<BTreeMap<String, String>, ClusterError> {
        match self.script_for_unit(&handle.unit) {
            Script::Succeed { artifacts, .. } => Ok(artifacts),
            Script::Fail { summary } => {
                let mut out = BTreeMap::new();
                out.insert("summary.txt".to_string(), summary);
                Ok(out)
            }
            _ => Ok(BTreeMap::new()),
        }
    }

    fn delete_unit(&self, handle: &UnitHandle) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("delete-unit {}", handle.unit));
        state.deleted_units.push(handle.unit.clone());
        state.live.remove(&handle.unit);
        Ok(())
    }

    fn delete_config(&self, handle: &UnitHandle) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("delete-config {}", handle.config));
        state.deleted_configs.push(handle.config.clone());
        Ok(())
    }
}

pub fn report(mutations: &[(&str, &str, usize, &str, bool, &str)]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<mutations>\n");
    for (class, method, line, mutator, detected, description) in mutations {
        let file = class.rsplit('.').next().unwrap_or(class);
        xml.push_str(&format!(
            "<mutation detected='{detected}' status='{status}'><sourceFile>{file}.java</sourceFile>\
             <mutatedClass>{class}</mutatedClass><mutatedMethod>{method}</mutatedMethod>\
             <lineNumber>{line}</lineNumber><mutator>{mutator}</mutator>\
             <indexes><index>1</index></indexes><blocks><block>0</block></blocks>\
             <killingTest>{killer}</killingTest><description>{description}</description></mutation>\n",
            status = if *detected { "KILLED" } else { "SURVIVED" },
            killer = if *detected { "com.acme.SomeTest" } else { "" },
        ));
    }
    xml.push_str("</mutations>\n");
    xml
}

pub fn artifacts(report_xml: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    out.insert("mutations.xml".to_string(), report_xml.to_string());
    out.insert("summary.txt".to_string(), "BUILD SUCCESS".to_string());
    out
}

pub fn succeed(report_xml: &str) -> Script {
    Script::Succeed {
        polls: 1,
        artifacts: artifacts(report_xml),
    }
}

pub fn fast_settings(unit_timeout: Duration) -> ExecutorSettings {
    ExecutorSettings {
        run_id: "t1".to_string(),
        namespace: "ci".to_string(),
        image: "registry.local/mutfleet:test".to_string(),
        pull_policy: PullPolicy::IfNotPresent,
        memory_limit: "1Gi".to_string(),
        cpu_limit: "1".to_string(),
        build_command: "mvn -B test".to_string(),
        resource_extensions: vec!["properties".to_string()],
        max_entry_bytes: 1_000_000,
        poll_interval: Duration::from_millis(5),
        progress_interval: Duration::from_millis(20),
        unit_timeout,
    }
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

pub const CART: &str = r#"package com.acme.cart;

public class Cart {
    private int total;

    public void add(int price) {
        if (price > 0) {
            total = total + price;
        }
    }
}
"#;

pub const ORDER: &str = r#"package com.acme.order;

public class Order {
    public boolean isLarge(int qty) {
        return qty >= 100;
    }
}
"#;

/// A two-package Maven project on disk.
pub fn sample_project(root: &Path) {
    write(
        root,
        "pom.xml",
        "<project><groupId>com.acme</groupId><artifactId>shop</artifactId><version>1.0</version></project>",
    );
    write(root, "src/main/java/com/acme/cart/Cart.java", CART);
    write(root, "src/main/java/com/acme/order/Order.java", ORDER);
    write(
        root,
        "src/test/java/com/acme/cart/CartTest.java",
        "package com.acme.cart;\nclass CartTest {}\n",
    );
    write(
        root,
        "src/test/java/com/acme/order/OrderTest.java",
        "package com.acme.order;\nclass OrderTest {}\n",
    );
}

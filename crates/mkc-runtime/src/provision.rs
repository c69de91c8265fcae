//! Cluster provisioning: dry-run previews, generated per-node config
//! snapshots, and VM creation with per-node confirmation and structured
//! per-node results.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use mkc_core::cluster::Cluster;
use mkc_core::node::Node;

use crate::backend::{self, VmBackend, VmState, launch_args};
use crate::orchestrator::Confirm;

/// How long to wait for a freshly launched machine to report running.
const LAUNCH_SETTLE_TIMEOUT: Duration = Duration::from_secs(120);
const LAUNCH_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// What happened to one node during creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Launched successfully (post-creation script problems are warnings,
    /// carried in `detail`).
    Created,
    /// Operator declined this node's confirmation prompt.
    Declined,
    /// The backend refused or failed the launch.
    Failed,
}

/// Structured per-node creation result - every entry names its node.
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub name: String,
    pub outcome: NodeOutcome,
    pub detail: String,
}

/// Results for a whole creation pass, in inventory order.
#[derive(Debug, Clone, Default)]
pub struct CreateReport {
    pub nodes: Vec<NodeReport>,
}

impl CreateReport {
    pub fn created(&self) -> usize {
        self.nodes
            .iter()
            .filter(|r| r.outcome == NodeOutcome::Created)
            .count()
    }

    pub fn failed(&self) -> Vec<&NodeReport> {
        self.nodes
            .iter()
            .filter(|r| r.outcome == NodeOutcome::Failed)
            .collect()
    }

    pub fn all_created(&self) -> bool {
        self.created() == self.nodes.len()
    }
}

/// The backend commands a creation pass would run, one per node in
/// inventory order. Used by `init --dry-run`.
pub fn planned_commands(cluster: &Cluster) -> Vec<(String, Vec<String>)> {
    cluster
        .nodes()
        .iter()
        .map(|node| ("multipass".to_string(), launch_args(node)))
        .collect()
}

/// Write each node's effective configuration tree as `<name>.yaml` under
/// `out_dir`. Returns the written paths in inventory order.
pub fn write_effective_configs(cluster: &Cluster, out_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory {}", out_dir.display()))?;

    let mut written = Vec::new();
    for node in cluster.nodes() {
        let path = out_dir.join(format!("{}.yaml", node.name));
        let text = serde_yaml::to_string(node.effective())
            .with_context(|| format!("failed to serialize config for node '{}'", node.name))?;
        fs::write(&path, text)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

/// Create every resolved node, in inventory order.
///
/// Each node gets its own confirmation prompt unless `assume_yes`. One
/// node's failure never stops the loop - the report carries a structured
/// result per node and the caller decides what partial success means.
pub fn create_nodes(
    backend: &dyn VmBackend,
    cluster: &Cluster,
    confirmer: &mut dyn Confirm,
    assume_yes: bool,
) -> CreateReport {
    let mut report = CreateReport::default();
    for node in cluster.nodes() {
        report.nodes.push(create_one(backend, node, confirmer, assume_yes));
    }
    report
}

fn create_one(
    backend: &dyn VmBackend,
    node: &Node,
    confirmer: &mut dyn Confirm,
    assume_yes: bool,
) -> NodeReport {
    let result = |outcome, detail: String| NodeReport {
        name: node.name.clone(),
        outcome,
        detail,
    };

    if !assume_yes && !confirmer.confirm(&format!("Create node '{}'?", node.name)) {
        return result(NodeOutcome::Declined, String::new());
    }

    if let Some(cloud_init) = &node.cloud_init {
        if !cloud_init.exists() {
            warn!(node = %node.name, path = %cloud_init.display(), "cloud-init file not found");
        }
    }

    info!(node = %node.name, role = %node.role, "launching");
    let launch = match backend.launch(node) {
        Ok(outcome) => outcome,
        Err(e) => return result(NodeOutcome::Failed, e.to_string()),
    };
    if !launch.ok {
        return result(NodeOutcome::Failed, launch.message);
    }

    match backend::wait_for_state(
        backend,
        &node.name,
        VmState::Running,
        LAUNCH_SETTLE_TIMEOUT,
        LAUNCH_POLL_INTERVAL,
    ) {
        Ok(true) => {}
        Ok(false) => {
            return result(
                NodeOutcome::Failed,
                "launched but never reported running".to_string(),
            );
        }
        Err(e) => return result(NodeOutcome::Failed, e.to_string()),
    }

    let script_problems = run_post_creation_scripts(backend, node);
    result(NodeOutcome::Created, script_problems.join("; "))
}

/// Copy each post-creation script into the guest and run it. Script
/// failures do not undo the creation - they are reported back as details.
fn run_post_creation_scripts(backend: &dyn VmBackend, node: &Node) -> Vec<String> {
    let mut problems = Vec::new();
    for script in &node.post_creation_scripts {
        let Some(file_name) = script.file_name().and_then(|n| n.to_str()) else {
            problems.push(format!("script path has no file name: {}", script.display()));
            continue;
        };
        if !script.exists() {
            problems.push(format!("script not found: {}", script.display()));
            continue;
        }

        info!(node = %node.name, script = %script.display(), "running post-creation script");
        let remote = format!("/tmp/{file_name}");
        if let Err(e) = backend.transfer(script, &node.name, &remote) {
            problems.push(e.to_string());
            continue;
        }
        match backend.exec(&node.name, &format!("chmod +x {remote} && {remote}")) {
            Ok(outcome) if outcome.ok => {}
            Ok(outcome) => problems.push(format!("{file_name} failed: {}", outcome.stderr)),
            Err(e) => problems.push(e.to_string()),
        }
    }
    problems
}

//! The virtualization backend boundary: a trait describing exactly the
//! operations the orchestration core needs, and the multipass
//! implementation that shells out to the `multipass` CLI.

use std::fmt;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use mkc_core::error::{Error, Result};
use mkc_core::node::Node;

use crate::shell::{self, run_host};

/// Observed lifecycle state of one machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmState {
    Running,
    Stopped,
    Suspended,
    Deleted,
    Unknown,
}

impl VmState {
    /// Map a backend-reported state label. Anything unrecognized is
    /// `Unknown` - the backend vocabulary is wider than ours.
    pub fn parse(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "stopped" => Self::Stopped,
            "suspended" => Self::Suspended,
            "deleted" => Self::Deleted,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Suspended => "suspended",
            Self::Deleted => "deleted",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One machine as reported by the backend. A fresh snapshot on every query -
/// never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmRecord {
    pub name: String,
    pub state: VmState,
    pub ipv4: Vec<String>,
    pub image: String,
}

/// Power transitions the orchestrator can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOp {
    Start,
    Suspend,
    Stop,
}

impl PowerOp {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Suspend => "suspend",
            Self::Stop => "stop",
        }
    }
}

/// Per-name outcome of a batch power request.
#[derive(Debug, Clone)]
pub struct NameOutcome {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

/// Outcome of launching one machine.
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub ok: bool,
    pub message: String,
}

/// Outcome of running a command inside a machine.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub ok: bool,
    pub stdout: String,
    pub stderr: String,
}

/// The gateway the orchestration core depends on. Calls may be slow and may
/// partially fail; group-level atomicity is the orchestrator's job, not the
/// gateway's.
pub trait VmBackend {
    /// Create and boot a machine from an effective node configuration.
    fn launch(&self, node: &Node) -> Result<LaunchOutcome>;

    /// Apply one power transition to a batch of machines.
    fn set_power_state(&self, names: &[String], op: PowerOp) -> Result<Vec<NameOutcome>>;

    /// Fetch current state. With an empty `names`, reports every machine;
    /// otherwise only the named ones, in backend-reported order. Machines
    /// the backend does not know are simply absent - not an error.
    fn query(&self, names: &[String]) -> Result<Vec<VmRecord>>;

    /// Run a shell command inside a machine.
    fn exec(&self, name: &str, command: &str) -> Result<ExecOutcome>;

    /// Copy a host file into a machine.
    fn transfer(&self, local: &Path, name: &str, remote: &str) -> Result<()>;
}

/// Build the `multipass launch` argument vector for one node.
pub fn launch_args(node: &Node) -> Vec<String> {
    let mut args = vec![
        "launch".to_string(),
        "--name".to_string(),
        node.name.clone(),
        "--cpus".to_string(),
        node.cpus.to_string(),
        "--memory".to_string(),
        node.memory.to_string(),
        "--disk".to_string(),
        node.disk.to_string(),
    ];
    if node.network.bridged {
        args.push("--bridged".to_string());
    }
    for interface in &node.network.extra_interfaces {
        args.push("--network".to_string());
        args.push(interface.clone());
    }
    for mount in &node.mounts {
        let mut spec = format!("{}:{}", mount.source, mount.target);
        if mount.readonly {
            spec.push_str(":ro");
        }
        args.push("--mount".to_string());
        args.push(spec);
    }
    if let Some(cloud_init) = &node.cloud_init {
        args.push("--cloud-init".to_string());
        args.push(cloud_init.display().to_string());
    }
    args.push(node.image.clone());
    args
}

/// Gateway implementation backed by the `multipass` CLI.
#[derive(Debug, Clone)]
pub struct MultipassBackend {
    program: String,
}

impl Default for MultipassBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipassBackend {
    pub fn new() -> Self {
        Self {
            program: "multipass".to_string(),
        }
    }

    fn run(&self, operation: &str, args: &[String]) -> Result<std::process::Output> {
        debug!(operation, args = %args.join(" "), "invoking backend");
        run_host(&self.program, args).map_err(|e| Error::Gateway {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }

    /// Delete a machine and purge its disk. Not part of the core gateway
    /// contract - used by the `delete` command only.
    pub fn remove(&self, name: &str) -> Result<()> {
        let args = vec![
            "delete".to_string(),
            "--purge".to_string(),
            name.to_string(),
        ];
        let output = self.run("delete", &args)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Gateway {
                operation: "delete".to_string(),
                message: format!("'{}': {}", name, failure_text(&output)),
            })
        }
    }
}

/// Wire shape of `multipass list --format json`.
#[derive(Deserialize)]
struct ListDocument {
    #[serde(default)]
    list: Vec<ListEntry>,
}

#[derive(Deserialize)]
struct ListEntry {
    name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    ipv4: Vec<String>,
    #[serde(default)]
    release: String,
}

fn failure_text(output: &std::process::Output) -> String {
    let stderr = shell::stderr_text(output);
    if stderr.is_empty() {
        shell::stdout_text(output)
    } else {
        stderr
    }
}

impl VmBackend for MultipassBackend {
    fn launch(&self, node: &Node) -> Result<LaunchOutcome> {
        let output = self.run("launch", &launch_args(node))?;
        if output.status.success() {
            Ok(LaunchOutcome {
                ok: true,
                message: shell::stdout_text(&output),
            })
        } else {
            Ok(LaunchOutcome {
                ok: false,
                message: failure_text(&output),
            })
        }
    }

    fn set_power_state(&self, names: &[String], op: PowerOp) -> Result<Vec<NameOutcome>> {
        let mut args = vec![op.verb().to_string()];
        args.extend(names.iter().cloned());
        let output = self.run(op.verb(), &args)?;

        // multipass reports batch failures with one exit code; attribute the
        // message to every name in the batch.
        let ok = output.status.success();
        let detail = if ok { String::new() } else { failure_text(&output) };
        Ok(names
            .iter()
            .map(|name| NameOutcome {
                name: name.clone(),
                ok,
                detail: detail.clone(),
            })
            .collect())
    }

    fn query(&self, names: &[String]) -> Result<Vec<VmRecord>> {
        let args = vec![
            "list".to_string(),
            "--format".to_string(),
            "json".to_string(),
        ];
        let output = self.run("list", &args)?;
        if !output.status.success() {
            return Err(Error::Gateway {
                operation: "list".to_string(),
                message: failure_text(&output),
            });
        }

        let document: ListDocument =
            serde_json::from_str(&shell::stdout_text(&output)).map_err(|e| Error::Gateway {
                operation: "list".to_string(),
                message: format!("unparsable response: {e}"),
            })?;

        Ok(document
            .list
            .into_iter()
            .filter(|entry| names.is_empty() || names.iter().any(|n| n == &entry.name))
            .map(|entry| VmRecord {
                name: entry.name,
                state: VmState::parse(&entry.state),
                ipv4: entry.ipv4,
                image: entry.release,
            })
            .collect())
    }

    fn exec(&self, name: &str, command: &str) -> Result<ExecOutcome> {
        let args = vec![
            "exec".to_string(),
            name.to_string(),
            "--".to_string(),
            "bash".to_string(),
            "-c".to_string(),
            command.to_string(),
        ];
        let output = self.run("exec", &args)?;
        Ok(ExecOutcome {
            ok: output.status.success(),
            stdout: shell::stdout_text(&output),
            stderr: shell::stderr_text(&output),
        })
    }

    fn transfer(&self, local: &Path, name: &str, remote: &str) -> Result<()> {
        let args = vec![
            "transfer".to_string(),
            local.display().to_string(),
            format!("{name}:{remote}"),
        ];
        let output = self.run("transfer", &args)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Gateway {
                operation: "transfer".to_string(),
                message: format!("'{}': {}", name, failure_text(&output)),
            })
        }
    }
}

/// Poll until a machine reaches `target`, with a fixed timeout and poll
/// interval. Returns whether the state was reached - the bounded wait is
/// never an error by itself.
pub fn wait_for_state(
    backend: &dyn VmBackend,
    name: &str,
    target: VmState,
    timeout: Duration,
    interval: Duration,
) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    let names = vec![name.to_string()];
    loop {
        let observed = backend
            .query(&names)?
            .into_iter()
            .find(|r| r.name == name)
            .map(|r| r.state)
            .unwrap_or(VmState::Unknown);
        if observed == target {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            warn!(name, %target, %observed, "timed out waiting for state");
            return Ok(false);
        }
        thread::sleep(interval);
    }
}

//! Cluster lifecycle orchestration: drive one power operation across role
//! groups in a fixed order, with a confirmation gate between groups.
//!
//! Controllers must be reachable before workers start; workers are quiesced
//! before the control plane is suspended or stopped. A group is sent to the
//! backend as one batch; a failed batch ends the whole run. Declining a gate
//! stops the run without treating already-applied groups as an error.

use std::fmt;

use tracing::info;

use mkc_core::cluster::Cluster;
use mkc_core::node::Role;

use crate::backend::{PowerOp, VmBackend};

/// The cluster-wide operations an operator can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOp {
    Start,
    Suspend,
    Stop,
}

impl LifecycleOp {
    pub fn power_op(self) -> PowerOp {
        match self {
            Self::Start => PowerOp::Start,
            Self::Suspend => PowerOp::Suspend,
            Self::Stop => PowerOp::Stop,
        }
    }

    /// Role ordering for this operation. Fixed policy: start brings
    /// controllers up first; suspend and stop quiesce workers first.
    pub fn group_order(self) -> [Role; 2] {
        match self {
            Self::Start => [Role::Controller, Role::Worker],
            Self::Suspend | Self::Stop => [Role::Worker, Role::Controller],
        }
    }

    /// "started" / "suspended" / "stopped".
    pub fn past_tense(self) -> &'static str {
        match self {
            Self::Start => "started",
            Self::Suspend => "suspended",
            Self::Stop => "stopped",
        }
    }

    /// "starting" / "suspending" / "stopping".
    pub fn progressive(self) -> &'static str {
        match self {
            Self::Start => "starting",
            Self::Suspend => "suspending",
            Self::Stop => "stopping",
        }
    }
}

impl fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Suspend => "suspend",
            Self::Stop => "stop",
        };
        f.write_str(s)
    }
}

/// Where a run ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    GroupInFlight(Role),
    AwaitingConfirmation,
    /// Every group applied.
    Done,
    /// Operator declined a confirmation gate. Groups already applied stay
    /// applied; this is not an error.
    Aborted,
    /// A group's batch failed; no later group was contacted.
    Failed,
}

/// What happened to one role group during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseStatus {
    /// Batch sent and every name succeeded.
    Applied,
    /// Group was empty - automatic success, no backend call, no gate.
    SkippedEmpty,
    /// Batch failed; the message names the nodes that failed.
    Failed(String),
    /// Run ended (abort or earlier failure) before this group was reached.
    NotReached,
}

#[derive(Debug, Clone)]
pub struct PhaseReport {
    pub role: Role,
    pub names: Vec<String>,
    pub status: PhaseStatus,
}

/// Full account of one lifecycle run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub operation: LifecycleOp,
    pub state: RunState,
    pub phases: Vec<PhaseReport>,
}

impl RunReport {
    pub fn completed(&self) -> bool {
        self.state == RunState::Done
    }

    pub fn aborted(&self) -> bool {
        self.state == RunState::Aborted
    }
}

/// Confirmation capability for the gates between groups. Abstracted so the
/// state machine is testable without a terminal.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Confirms everything; used for `--yes` runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl Confirm for AlwaysConfirm {
    fn confirm(&mut self, _prompt: &str) -> bool {
        true
    }
}

/// Drives lifecycle operations against a backend.
pub struct Orchestrator<'a> {
    backend: &'a dyn VmBackend,
    confirmer: &'a mut dyn Confirm,
}

impl<'a> Orchestrator<'a> {
    pub fn new(backend: &'a dyn VmBackend, confirmer: &'a mut dyn Confirm) -> Self {
        Self { backend, confirmer }
    }

    /// Run one operation across the cluster's role groups.
    pub fn run(&mut self, cluster: &Cluster, operation: LifecycleOp) -> RunReport {
        let groups: Vec<(Role, Vec<String>)> = operation
            .group_order()
            .into_iter()
            .map(|role| (role, cluster.names_by_role(role)))
            .collect();

        let mut report = RunReport {
            operation,
            state: RunState::Idle,
            phases: groups
                .iter()
                .map(|(role, names)| PhaseReport {
                    role: *role,
                    names: names.clone(),
                    status: PhaseStatus::NotReached,
                })
                .collect(),
        };

        for index in 0..groups.len() {
            let (role, names) = &groups[index];
            if names.is_empty() {
                report.phases[index].status = PhaseStatus::SkippedEmpty;
                continue;
            }

            report.state = RunState::GroupInFlight(*role);
            info!(operation = %operation, role = %role, nodes = %names.join(", "), "dispatching group");

            match self.backend.set_power_state(names, operation.power_op()) {
                Err(e) => {
                    report.phases[index].status = PhaseStatus::Failed(e.to_string());
                    report.state = RunState::Failed;
                    return report;
                }
                Ok(outcomes) => {
                    let failures: Vec<String> = outcomes
                        .iter()
                        .filter(|o| !o.ok)
                        .map(|o| format!("{}: {}", o.name, o.detail))
                        .collect();
                    if !failures.is_empty() {
                        report.phases[index].status = PhaseStatus::Failed(failures.join("; "));
                        report.state = RunState::Failed;
                        return report;
                    }
                    report.phases[index].status = PhaseStatus::Applied;
                }
            }

            // Gate before the next group that actually has nodes.
            let remaining: Vec<&Role> = groups[index + 1..]
                .iter()
                .filter(|(_, names)| !names.is_empty())
                .map(|(role, _)| role)
                .collect();
            if let Some(next_role) = remaining.first() {
                report.state = RunState::AwaitingConfirmation;
                let prompt = format!(
                    "{role} nodes are {}. Continue {} {next_role} nodes?",
                    operation.past_tense(),
                    operation.progressive(),
                );
                if !self.confirmer.confirm(&prompt) {
                    info!(operation = %operation, "operator declined, leaving remaining groups untouched");
                    report.state = RunState::Aborted;
                    return report;
                }
            }
        }

        report.state = RunState::Done;
        report
    }
}

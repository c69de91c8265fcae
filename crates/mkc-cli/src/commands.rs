use std::path::Path;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{CommandFactory, Parser, Subcommand};

use mkc_core::cluster::Cluster;
use mkc_core::config::{ClusterConfig, ResolvedCluster, YamlSource, resolve_cluster};
use mkc_core::error::Error;
use mkc_core::node::Role;
use mkc_runtime::backend::{MultipassBackend, PowerOp, VmBackend, VmState, wait_for_state};
use mkc_runtime::orchestrator::{
    AlwaysConfirm, Confirm, LifecycleOp, Orchestrator, PhaseStatus, RunState,
};
use mkc_runtime::provision::{self, NodeOutcome};

use crate::display::{NodeRow, VmStatusRow};
use crate::logging;
use crate::output::{self, OutputFormat};
use crate::ui;

#[derive(Parser)]
#[command(
    name = "mkc",
    version,
    about = "Multipass-backed Kubernetes cluster manager"
)]
struct Cli {
    /// Output format: table, json, yaml
    #[arg(long, short = 'o', global = true, default_value = "table")]
    output: String,

    /// Path to the cluster config file
    #[arg(long, short = 'c', global = true, default_value = "config/cluster.yaml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the cluster (controller nodes first, then worker nodes)
    Start {
        /// Skip the confirmation gates between role groups
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Suspend the cluster (worker nodes first, then controller nodes)
    Suspend {
        /// Skip the confirmation gates between role groups
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Stop the cluster (worker nodes first, then controller nodes)
    Stop {
        /// Skip the confirmation gates between role groups
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Show virtual machine status as reported by the backend
    Status {
        /// Show every machine (default)
        #[arg(long, short = 'a')]
        all: bool,
        /// Only machines whose name contains "controller"
        #[arg(long, conflicts_with_all = ["all", "worker"])]
        controller: bool,
        /// Only machines whose name contains "worker"
        #[arg(long, short = 'w', conflicts_with = "all")]
        worker: bool,
    },
    /// Resolve the cluster config and create the virtual machines
    Init {
        /// Print the backend commands without executing them
        #[arg(long, short = 'd')]
        dry_run: bool,
        /// Write resolved per-node config files instead of creating VMs
        #[arg(long, short = 'g')]
        generate: bool,
        /// Directory for generated config files
        #[arg(long, default_value = ".generated")]
        output_dir: String,
        /// Create without per-node confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Show the resolved cluster: nodes, roles, aggregate resources
    Info,
    /// Stop and delete one virtual machine, purging its disk
    Delete {
        /// Machine name
        name: String,
        /// Skip confirmation
        #[arg(long)]
        force: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ============================================================================
// Command dispatch
// ============================================================================

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init();

    let out_fmt = OutputFormat::from_str_arg(&cli.output);

    match cli.command {
        Commands::Start { yes } => cmd_lifecycle(&cli.config, LifecycleOp::Start, yes),
        Commands::Suspend { yes } => cmd_lifecycle(&cli.config, LifecycleOp::Suspend, yes),
        Commands::Stop { yes } => cmd_lifecycle(&cli.config, LifecycleOp::Stop, yes),
        Commands::Status {
            controller, worker, ..
        } => {
            let filter = if controller {
                Some(Role::Controller)
            } else if worker {
                Some(Role::Worker)
            } else {
                None
            };
            cmd_status(filter, out_fmt)
        }
        Commands::Init {
            dry_run,
            generate,
            output_dir,
            yes,
        } => cmd_init(&cli.config, dry_run, generate, &output_dir, yes),
        Commands::Info => cmd_info(&cli.config, out_fmt),
        Commands::Delete { name, force } => cmd_delete(&name, force),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

/// Confirmation gates backed by an interactive prompt, defaulting to yes
/// like the rest of the lifecycle flow.
struct PromptConfirm;

impl Confirm for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        ui::confirm(prompt, true)
    }
}

fn require_backend() -> Result<MultipassBackend> {
    which::which("multipass").map_err(|_| {
        anyhow::anyhow!(
            "'multipass' not found. Install Multipass first: https://canonical.com/multipass"
        )
    })?;
    Ok(MultipassBackend::new())
}

/// Load the cluster file and resolve every inventory node. Per-node
/// failures are printed and counted but do not stop the command.
fn load_resolved(config_path: &str) -> Result<(ClusterConfig, Cluster, usize)> {
    let config = ClusterConfig::load(&YamlSource, Path::new(config_path))?;
    let ResolvedCluster { cluster, failures } = resolve_cluster(&config, &YamlSource);
    for failure in &failures {
        ui::error(&failure.to_string());
    }
    Ok((config, cluster, failures.len()))
}

fn finish(resolution_failures: usize) -> Result<()> {
    if resolution_failures > 0 {
        bail!("{resolution_failures} node(s) failed to resolve");
    }
    Ok(())
}

// ============================================================================
// Command handlers
// ============================================================================

fn cmd_lifecycle(config_path: &str, operation: LifecycleOp, yes: bool) -> Result<()> {
    let (_, cluster, resolution_failures) = load_resolved(config_path)?;
    if cluster.is_empty() {
        ui::info("No nodes in the cluster inventory.");
        return finish(resolution_failures);
    }

    let backend = require_backend()?;
    let report = if yes {
        let mut confirmer = AlwaysConfirm;
        Orchestrator::new(&backend, &mut confirmer).run(&cluster, operation)
    } else {
        let mut confirmer = PromptConfirm;
        Orchestrator::new(&backend, &mut confirmer).run(&cluster, operation)
    };

    for phase in &report.phases {
        match &phase.status {
            PhaseStatus::Applied => ui::success(&format!(
                "Successfully {} {} nodes: {}",
                operation.past_tense(),
                phase.role,
                phase.names.join(", ")
            )),
            PhaseStatus::SkippedEmpty => ui::info(&format!("No {} nodes found", phase.role)),
            PhaseStatus::Failed(message) => ui::error(&format!(
                "Failed to {} {} nodes: {}",
                operation, phase.role, message
            )),
            PhaseStatus::NotReached => {}
        }
    }

    match report.state {
        RunState::Done => {
            ui::success(&format!("{operation} operation completed"));
            finish(resolution_failures)
        }
        RunState::Aborted => {
            ui::info("Cancelled. Nodes already operated on keep their new state.");
            finish(resolution_failures)
        }
        RunState::Failed => bail!("{operation} operation failed"),
        _ => unreachable!("orchestrator returned a non-terminal state"),
    }
}

fn cmd_status(filter: Option<Role>, out_fmt: OutputFormat) -> Result<()> {
    let backend = require_backend()?;

    let spinner = ui::spinner("Querying virtual machines...");
    let queried = backend.query(&[]);
    spinner.finish_and_clear();
    let records = queried?;

    if records.is_empty() {
        ui::info("No virtual machines found");
        return Ok(());
    }

    let filtered = filter_records(records, filter);
    if filtered.is_empty() {
        ui::info("No matching virtual machines found");
        return Ok(());
    }

    let rows: Vec<VmStatusRow> = filtered.iter().map(VmStatusRow::from_record).collect();
    output::render_list(&rows, out_fmt);
    if out_fmt == OutputFormat::Table {
        ui::info(&format!("Total: {} virtual machine(s)", rows.len()));
    }
    Ok(())
}

fn cmd_init(
    config_path: &str,
    dry_run: bool,
    generate: bool,
    output_dir: &str,
    yes: bool,
) -> Result<()> {
    let (config, cluster, resolution_failures) = load_resolved(config_path)?;

    ui::info(&format!("Cluster: {}", config.name));
    if let Some(description) = &config.description {
        ui::info(&format!("  {description}"));
    }
    let totals = cluster.aggregate_resources();
    ui::info(&format!(
        "Nodes: {} total ({} controller, {} worker)",
        cluster.len(),
        cluster.nodes_by_role(Role::Controller).len(),
        cluster.nodes_by_role(Role::Worker).len(),
    ));
    ui::info(&format!(
        "Declared resources: {} cpus, {} memory, {} disk",
        totals.cpus,
        totals.memory(),
        totals.disk(),
    ));
    if resolution_failures > 0 {
        ui::warn(&format!(
            "{resolution_failures} node(s) failed to resolve; continuing with the rest"
        ));
    }
    if cluster.is_empty() {
        ui::info("Nothing to do.");
        return finish(resolution_failures);
    }

    if generate {
        let written = provision::write_effective_configs(&cluster, Path::new(output_dir))?;
        for path in &written {
            ui::success(&format!("Generated {}", path.display()));
        }
        return finish(resolution_failures);
    }

    if dry_run {
        ui::info("Dry run - commands will not be executed");
        for (program, args) in provision::planned_commands(&cluster) {
            println!("{} {}", program, args.join(" "));
        }
        return finish(resolution_failures);
    }

    let backend = require_backend()?;
    let mut confirmer = PromptConfirm;
    let report = provision::create_nodes(&backend, &cluster, &mut confirmer, yes);

    for node in &report.nodes {
        match node.outcome {
            NodeOutcome::Created if node.detail.is_empty() => {
                ui::success(&format!("Created node '{}'", node.name));
            }
            NodeOutcome::Created => {
                ui::success(&format!("Created node '{}'", node.name));
                ui::warn(&format!("  script problems: {}", node.detail));
            }
            NodeOutcome::Declined => ui::info(&format!("Skipped node '{}'", node.name)),
            NodeOutcome::Failed => {
                ui::error(&format!("Failed to create node '{}': {}", node.name, node.detail));
            }
        }
    }
    ui::info(&format!(
        "Creation finished ({}/{} successful)",
        report.created(),
        report.nodes.len()
    ));

    let failed = report.failed();
    if !failed.is_empty() {
        bail!("{} node(s) failed to create", failed.len());
    }
    finish(resolution_failures)
}

fn cmd_info(config_path: &str, out_fmt: OutputFormat) -> Result<()> {
    let (config, cluster, resolution_failures) = load_resolved(config_path)?;

    if out_fmt == OutputFormat::Table {
        match &config.description {
            Some(description) => ui::info(&format!("Cluster: {} - {}", config.name, description)),
            None => ui::info(&format!("Cluster: {}", config.name)),
        }
    }

    let rows: Vec<NodeRow> = cluster.nodes().iter().map(NodeRow::from_node).collect();
    output::render_list(&rows, out_fmt);

    if out_fmt == OutputFormat::Table {
        let totals = cluster.aggregate_resources();
        ui::info(&format!(
            "Declared resources: {} cpus, {} memory, {} disk",
            totals.cpus,
            totals.memory(),
            totals.disk(),
        ));
    }
    finish(resolution_failures)
}

fn cmd_delete(name: &str, force: bool) -> Result<()> {
    let backend = require_backend()?;

    if !force
        && !ui::confirm(
            &format!("Delete virtual machine '{name}' and purge its disk?"),
            false,
        )
    {
        ui::info("Cancelled.");
        return Ok(());
    }

    let names = vec![name.to_string()];
    let records = backend.query(&names)?;
    let Some(record) = records.into_iter().find(|r| r.name == name) else {
        return Err(Error::UnknownNode(name.to_string()).into());
    };

    if record.state == VmState::Running {
        ui::info(&format!("Stopping '{name}'..."));
        let outcomes = backend.set_power_state(&names, PowerOp::Stop)?;
        if let Some(bad) = outcomes.iter().find(|o| !o.ok) {
            bail!("failed to stop '{}': {}", bad.name, bad.detail);
        }
        wait_for_state(
            &backend,
            name,
            VmState::Stopped,
            Duration::from_secs(60),
            Duration::from_secs(2),
        )?;
    }

    backend.remove(name)?;
    ui::success(&format!("Deleted '{name}'."));
    Ok(())
}

fn cmd_completions(shell: clap_complete::Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mkc", &mut std::io::stdout());
    Ok(())
}

/// Keep the machines whose name contains the role keyword, case-insensitively,
/// preserving backend-reported order. No filter keeps everything.
fn filter_records(
    records: Vec<mkc_runtime::backend::VmRecord>,
    filter: Option<Role>,
) -> Vec<mkc_runtime::backend::VmRecord> {
    match filter {
        None => records,
        Some(role) => records
            .into_iter()
            .filter(|r| r.name.to_lowercase().contains(role.as_str()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mkc_runtime::backend::{VmRecord, VmState};

    fn record(name: &str) -> VmRecord {
        VmRecord {
            name: name.to_string(),
            state: VmState::Running,
            ipv4: Vec::new(),
            image: "Ubuntu 22.04 LTS".to_string(),
        }
    }

    fn names(records: &[VmRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_filter_matches_substring_case_insensitively() {
        let records = vec![
            record("Worker-01"),
            record("controller-1"),
            record("my-worker-2"),
            record("standalone"),
        ];
        let filtered = filter_records(records, Some(Role::Worker));
        assert_eq!(names(&filtered), vec!["Worker-01", "my-worker-2"]);
    }

    #[test]
    fn test_filter_preserves_backend_order() {
        let records = vec![record("worker-2"), record("worker-1")];
        let filtered = filter_records(records, Some(Role::Worker));
        assert_eq!(names(&filtered), vec!["worker-2", "worker-1"]);
    }

    #[test]
    fn test_no_filter_keeps_everything() {
        let records = vec![record("controller-1"), record("worker-1")];
        assert_eq!(filter_records(records, None).len(), 2);
    }
}

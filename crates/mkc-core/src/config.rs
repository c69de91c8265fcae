//! Layered cluster configuration: the top-level cluster file, the loader
//! capability, and whole-cluster resolution with per-node error isolation.
//!
//! File shape (YAML):
//!
//! ```yaml
//! cluster:
//!   name: k3s-cluster
//!   description: Local three-node cluster
//! defaults:              # cluster-wide node defaults
//!   image: "22.04"
//!   resources: { cpus: 2, memory: 2G, disk: 10G }
//! roles:                 # node-type defaults, merged over `defaults`
//!   controller:
//!     resources: { cpus: 4 }
//! inventory:             # declaration order fixes operation sequencing
//!   controller:
//!     - controller-1: nodes/controller-1.yaml
//!   worker:
//!     - worker-1: nodes/worker-1.yaml
//!     - worker-2               # no override file
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cluster::Cluster;
use crate::error::{Error, Result};
use crate::node::Role;
use crate::resolve;
use crate::tree::{ConfigTree, ConfigValue};

/// Loader capability for config trees. Passed explicitly to everything that
/// reads configuration - there is no process-wide config state.
pub trait ConfigSource {
    fn load_tree(&self, path: &Path) -> Result<ConfigTree>;
}

/// Filesystem-backed YAML loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlSource;

impl ConfigSource for YamlSource {
    fn load_tree(&self, path: &Path) -> Result<ConfigTree> {
        let text = fs::read_to_string(path).map_err(|e| Error::ConfigLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_yaml::from_str(&text).map_err(|e| Error::ConfigLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// One inventory line: a node name, the role section it appeared under, and
/// an optional per-node override file.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryEntry {
    pub name: String,
    pub role: Role,
    pub overrides: Option<PathBuf>,
}

/// Parsed top-level cluster file.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub name: String,
    pub description: Option<String>,
    pub defaults: ConfigTree,
    controller_defaults: ConfigTree,
    worker_defaults: ConfigTree,
    pub inventory: Vec<InventoryEntry>,
    base_dir: PathBuf,
}

impl ClusterConfig {
    /// Load and structurally validate the cluster file. Structural problems
    /// here are fatal `ConfigLoad` errors; per-node problems surface later,
    /// during resolution.
    pub fn load(source: &dyn ConfigSource, path: &Path) -> Result<Self> {
        let tree = source.load_tree(path)?;
        let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        Self::from_tree(&tree, path, base_dir)
    }

    fn from_tree(tree: &ConfigTree, path: &Path, base_dir: PathBuf) -> Result<Self> {
        let fail = |reason: String| Error::ConfigLoad {
            path: path.to_path_buf(),
            reason,
        };

        let header = tree
            .get("cluster")
            .ok_or_else(|| fail("missing 'cluster' section".to_string()))?
            .as_map()
            .ok_or_else(|| fail("'cluster' must be a map".to_string()))?;
        let name = header
            .get("name")
            .and_then(ConfigValue::as_str)
            .ok_or_else(|| fail("missing 'cluster.name'".to_string()))?
            .to_string();
        let description = header
            .get("description")
            .and_then(ConfigValue::as_str)
            .map(str::to_string);

        let defaults = section_tree(tree, "defaults", &fail)?;

        let roles = section_tree(tree, "roles", &fail)?;
        for key in roles.iter().map(|(k, _)| k) {
            if Role::parse(key).is_none() {
                return Err(fail(format!("unknown role '{key}' in 'roles'")));
            }
        }
        let controller_defaults = role_tree(&roles, Role::Controller, &fail)?;
        let worker_defaults = role_tree(&roles, Role::Worker, &fail)?;

        let inventory = parse_inventory(tree, &fail)?;

        Ok(Self {
            name,
            description,
            defaults,
            controller_defaults,
            worker_defaults,
            inventory,
            base_dir,
        })
    }

    /// The node-type default tree for one role.
    pub fn role_defaults(&self, role: Role) -> &ConfigTree {
        match role {
            Role::Controller => &self.controller_defaults,
            Role::Worker => &self.worker_defaults,
        }
    }

    /// Directory that per-node override paths are resolved against (the
    /// cluster file's parent).
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

fn section_tree(
    tree: &ConfigTree,
    key: &str,
    fail: &impl Fn(String) -> Error,
) -> Result<ConfigTree> {
    match tree.get(key) {
        None => Ok(ConfigTree::new()),
        Some(value) => value
            .as_map()
            .cloned()
            .ok_or_else(|| fail(format!("'{key}' must be a map, got {}", value.kind()))),
    }
}

fn role_tree(roles: &ConfigTree, role: Role, fail: &impl Fn(String) -> Error) -> Result<ConfigTree> {
    match roles.get(role.as_str()) {
        None => Ok(ConfigTree::new()),
        Some(value) => value
            .as_map()
            .cloned()
            .ok_or_else(|| fail(format!("'roles.{role}' must be a map, got {}", value.kind()))),
    }
}

fn parse_inventory(tree: &ConfigTree, fail: &impl Fn(String) -> Error) -> Result<Vec<InventoryEntry>> {
    let Some(value) = tree.get("inventory") else {
        return Ok(Vec::new());
    };
    let sections = value
        .as_map()
        .ok_or_else(|| fail(format!("'inventory' must be a map, got {}", value.kind())))?;

    let mut entries = Vec::new();
    // Controllers first so their declaration order leads the node list.
    for role in Role::all() {
        let Some(listed) = sections.get(role.as_str()) else {
            continue;
        };
        let items = listed.as_sequence().ok_or_else(|| {
            fail(format!("'inventory.{role}' must be a sequence, got {}", listed.kind()))
        })?;
        for item in items {
            entries.push(inventory_entry(item, role, fail)?);
        }
    }
    for key in sections.iter().map(|(k, _)| k) {
        if Role::parse(key).is_none() {
            return Err(fail(format!("unknown role '{key}' in 'inventory'")));
        }
    }
    Ok(entries)
}

fn inventory_entry(
    item: &ConfigValue,
    role: Role,
    fail: &impl Fn(String) -> Error,
) -> Result<InventoryEntry> {
    match item {
        // "- worker-1" - no override file
        ConfigValue::String(name) => Ok(InventoryEntry {
            name: name.clone(),
            role,
            overrides: None,
        }),
        // "- worker-1: nodes/worker-1.yaml"
        ConfigValue::Map(pair) => {
            let mut fields = pair.iter();
            match (fields.next(), fields.next()) {
                (Some((name, path)), None) => {
                    let path = path.as_str().ok_or_else(|| {
                        fail(format!(
                            "inventory entry '{name}' must map to a config path, got {}",
                            path.kind()
                        ))
                    })?;
                    Ok(InventoryEntry {
                        name: name.clone(),
                        role,
                        overrides: Some(PathBuf::from(path)),
                    })
                }
                _ => Err(fail(format!(
                    "'inventory.{role}' entries must be a name or a single name-to-path pair"
                ))),
            }
        }
        other => Err(fail(format!(
            "'inventory.{role}' entries must be a name or a single name-to-path pair, got {}",
            other.kind()
        ))),
    }
}

/// Outcome of resolving a whole inventory: the cluster with every node that
/// resolved, plus the per-node failures for those that did not.
#[derive(Debug)]
pub struct ResolvedCluster {
    pub cluster: Cluster,
    pub failures: Vec<Error>,
}

/// Resolve every inventory entry. One bad node never blocks the rest: its
/// error is collected and resolution continues.
pub fn resolve_cluster(config: &ClusterConfig, source: &dyn ConfigSource) -> ResolvedCluster {
    let mut cluster = Cluster::new(&config.name, config.description.clone());
    let mut failures = Vec::new();

    for entry in &config.inventory {
        let overrides = match &entry.overrides {
            None => Ok(ConfigTree::new()),
            Some(rel) => source.load_tree(&config.base_dir().join(rel)).map_err(|e| {
                Error::Resolution {
                    node: entry.name.clone(),
                    reason: e.to_string(),
                }
            }),
        };

        let resolved = overrides.and_then(|tree| {
            resolve::resolve(
                &entry.name,
                entry.role,
                &config.defaults,
                config.role_defaults(entry.role),
                &tree,
            )
        });

        match resolved {
            Ok(node) => {
                debug!(node = %node.name, role = %node.role, "resolved node");
                if let Err(e) = cluster.add_node(node) {
                    failures.push(e);
                }
            }
            Err(e) => failures.push(e),
        }
    }

    ResolvedCluster { cluster, failures }
}

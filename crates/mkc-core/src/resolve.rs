//! Three-layer node resolution: cluster defaults → role defaults → per-node
//! override, applied as two sequential two-way merges, then validated and
//! projected into a typed [`Node`].

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::node::{Mount, NetworkSpec, Node, Role};
use crate::quantity::ResourceQuantity;
use crate::tree::{self, ConfigTree, ConfigValue};

/// Resolve one node's effective configuration.
///
/// Precedence: per-node override beats role defaults, which beat cluster
/// defaults. Validation failures carry the node name and reason - a missing
/// or unparsable field is never replaced by a default.
pub fn resolve(
    name: &str,
    role: Role,
    cluster_defaults: &ConfigTree,
    role_defaults: &ConfigTree,
    node_override: &ConfigTree,
) -> Result<Node> {
    let baseline = tree::merge(cluster_defaults, role_defaults);
    let effective = tree::merge(&baseline, node_override);
    project(name, role, effective)
}

/// Validate the merged tree and project it into a `Node`.
fn project(name: &str, role: Role, effective: ConfigTree) -> Result<Node> {
    let fail = |reason: String| Error::Resolution {
        node: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(fail("node name is empty".to_string()));
    }

    // A `name` key in the config must agree with the inventory name.
    if let Some(value) = effective.get("name") {
        match value.as_str() {
            Some(n) if n == name => {}
            Some(other) => {
                return Err(fail(format!(
                    "config names it '{other}' but the inventory names it '{name}'"
                )));
            }
            None => return Err(fail(format!("'name' must be a string, got {}", value.kind()))),
        }
    }

    // Same for an explicit `role` key vs. the inventory section.
    if let Some(value) = effective.get("role") {
        let text = value
            .as_str()
            .ok_or_else(|| fail(format!("'role' must be a string, got {}", value.kind())))?;
        match Role::parse(text) {
            Some(r) if r == role => {}
            Some(other) => {
                return Err(fail(format!(
                    "inventory lists it as a {role} but config says '{other}'"
                )));
            }
            None => return Err(fail(format!("unknown role '{text}'"))),
        }
    }

    let image = require_str(&effective, "image").map_err(&fail)?.to_string();

    let resources = effective
        .get("resources")
        .ok_or_else(|| fail("missing 'resources'".to_string()))?
        .as_map()
        .ok_or_else(|| fail("'resources' must be a map".to_string()))?;

    let cpus = require_positive_count(resources, "resources.cpus", "cpus").map_err(&fail)?;
    let memory = require_quantity(resources, "resources.memory", "memory").map_err(&fail)?;
    let disk = require_quantity(resources, "resources.disk", "disk").map_err(&fail)?;

    let network = match effective.get("network") {
        None => NetworkSpec::default(),
        Some(value) => {
            let net = value
                .as_map()
                .ok_or_else(|| fail(format!("'network' must be a map, got {}", value.kind())))?;
            parse_network(net).map_err(&fail)?
        }
    };

    let mounts = match effective.get("mounts") {
        None => Vec::new(),
        Some(value) => {
            let items = value
                .as_sequence()
                .ok_or_else(|| fail(format!("'mounts' must be a sequence, got {}", value.kind())))?;
            parse_mounts(items).map_err(&fail)?
        }
    };

    let cloud_init = match effective.get("cloud_init") {
        None => None,
        Some(value) => Some(PathBuf::from(value.as_str().ok_or_else(|| {
            fail(format!("'cloud_init' must be a string, got {}", value.kind()))
        })?)),
    };

    let post_creation_scripts = parse_post_creation_scripts(&effective).map_err(&fail)?;

    Ok(Node {
        name: name.to_string(),
        role,
        image,
        cpus,
        memory,
        disk,
        network,
        mounts,
        cloud_init,
        post_creation_scripts,
        effective,
    })
}

fn require_str<'a>(tree: &'a ConfigTree, key: &str) -> std::result::Result<&'a str, String> {
    match tree.get(key) {
        None => Err(format!("missing '{key}'")),
        Some(value) => value
            .as_str()
            .ok_or_else(|| format!("'{key}' must be a string, got {}", value.kind())),
    }
}

fn require_positive_count(
    tree: &ConfigTree,
    label: &str,
    key: &str,
) -> std::result::Result<u32, String> {
    let value = tree.get(key).ok_or_else(|| format!("missing '{label}'"))?;
    let n = value
        .as_i64()
        .ok_or_else(|| format!("'{label}' must be an integer, got {}", value.kind()))?;
    if n <= 0 {
        return Err(format!("'{label}' must be positive, got {n}"));
    }
    u32::try_from(n).map_err(|_| format!("'{label}' out of range: {n}"))
}

fn require_quantity(
    tree: &ConfigTree,
    label: &str,
    key: &str,
) -> std::result::Result<ResourceQuantity, String> {
    let value = tree.get(key).ok_or_else(|| format!("missing '{label}'"))?;
    let text = value
        .as_str()
        .ok_or_else(|| format!("'{label}' must be a quantity string, got {}", value.kind()))?;
    ResourceQuantity::parse(text).map_err(|e| format!("'{label}': {e}"))
}

fn parse_network(net: &ConfigTree) -> std::result::Result<NetworkSpec, String> {
    let bridged = match net.get("bridged") {
        None => false,
        Some(value) => value
            .as_bool()
            .ok_or_else(|| format!("'network.bridged' must be a bool, got {}", value.kind()))?,
    };
    let extra_interfaces = match net.get("extra_interfaces") {
        None => Vec::new(),
        Some(value) => {
            let items = value.as_sequence().ok_or_else(|| {
                format!("'network.extra_interfaces' must be a sequence, got {}", value.kind())
            })?;
            items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        format!("'network.extra_interfaces' entries must be strings, got {}", item.kind())
                    })
                })
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };
    Ok(NetworkSpec {
        bridged,
        extra_interfaces,
    })
}

fn parse_mounts(items: &[ConfigValue]) -> std::result::Result<Vec<Mount>, String> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let entry = item
                .as_map()
                .ok_or_else(|| format!("'mounts[{i}]' must be a map, got {}", item.kind()))?;
            let source = require_str(entry, "source").map_err(|e| format!("'mounts[{i}]': {e}"))?;
            let target = require_str(entry, "target").map_err(|e| format!("'mounts[{i}]': {e}"))?;
            let readonly = match entry.get("readonly") {
                None => false,
                Some(value) => value.as_bool().ok_or_else(|| {
                    format!("'mounts[{i}].readonly' must be a bool, got {}", value.kind())
                })?,
            };
            Ok(Mount {
                source: source.to_string(),
                target: target.to_string(),
                readonly,
            })
        })
        .collect()
}

fn parse_post_creation_scripts(
    effective: &ConfigTree,
) -> std::result::Result<Vec<PathBuf>, String> {
    let Some(system) = effective.get("system") else {
        return Ok(Vec::new());
    };
    let system = system
        .as_map()
        .ok_or_else(|| format!("'system' must be a map, got {}", system.kind()))?;
    let Some(scripts) = system.get("post_creation_scripts") else {
        return Ok(Vec::new());
    };
    let items = scripts.as_sequence().ok_or_else(|| {
        format!("'system.post_creation_scripts' must be a sequence, got {}", scripts.kind())
    })?;
    items
        .iter()
        .map(|item| {
            item.as_str().map(PathBuf::from).ok_or_else(|| {
                format!("'system.post_creation_scripts' entries must be strings, got {}", item.kind())
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(yaml: &str) -> ConfigTree {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn defaults() -> ConfigTree {
        tree(
            "image: \"22.04\"\n\
             resources:\n  cpus: 2\n  memory: 2G\n  disk: 10G",
        )
    }

    #[test]
    fn test_resolves_from_cluster_defaults_alone() {
        let node = resolve(
            "worker-1",
            Role::Worker,
            &defaults(),
            &ConfigTree::new(),
            &ConfigTree::new(),
        )
        .unwrap();
        assert_eq!(node.name, "worker-1");
        assert_eq!(node.role, Role::Worker);
        assert_eq!(node.cpus, 2);
        assert_eq!(node.memory.as_mib(), 2048.0);
        assert_eq!(node.image, "22.04");
    }

    #[test]
    fn test_override_beats_role_defaults_beats_cluster_defaults() {
        let role_defaults = tree("resources:\n  cpus: 4\n  memory: 4G");
        let node_override = tree("resources:\n  memory: 8G");
        let node = resolve(
            "controller-1",
            Role::Controller,
            &defaults(),
            &role_defaults,
            &node_override,
        )
        .unwrap();
        // override wins
        assert_eq!(node.memory.as_mib(), 8192.0);
        // role default wins over cluster default where override is silent
        assert_eq!(node.cpus, 4);
        // cluster default survives where nothing overrides
        assert_eq!(node.disk.as_mib(), 10240.0);
    }

    #[test]
    fn test_role_default_beats_cluster_default_without_override() {
        let role_defaults = tree("image: \"24.04\"");
        let node = resolve(
            "worker-1",
            Role::Worker,
            &defaults(),
            &role_defaults,
            &ConfigTree::new(),
        )
        .unwrap();
        assert_eq!(node.image, "24.04");
    }

    #[test]
    fn test_unparsable_memory_fails_with_node_name() {
        let node_override = tree("resources:\n  memory: 4X");
        let err = resolve(
            "worker-1",
            Role::Worker,
            &defaults(),
            &ConfigTree::new(),
            &node_override,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("worker-1"), "error should name the node: {msg}");
        assert!(msg.contains("4X"), "error should quote the bad text: {msg}");
    }

    #[test]
    fn test_missing_image_is_an_error_not_a_default() {
        let err = resolve(
            "worker-1",
            Role::Worker,
            &tree("resources:\n  cpus: 2\n  memory: 2G\n  disk: 10G"),
            &ConfigTree::new(),
            &ConfigTree::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("image"));
    }

    #[test]
    fn test_zero_cpus_rejected() {
        let node_override = tree("resources:\n  cpus: 0");
        assert!(
            resolve(
                "worker-1",
                Role::Worker,
                &defaults(),
                &ConfigTree::new(),
                &node_override
            )
            .is_err()
        );
    }

    #[test]
    fn test_role_mismatch_rejected() {
        let node_override = tree("role: worker");
        let err = resolve(
            "controller-1",
            Role::Controller,
            &defaults(),
            &ConfigTree::new(),
            &node_override,
        )
        .unwrap_err();
        assert!(err.to_string().contains("controller"));
    }

    #[test]
    fn test_name_mismatch_rejected() {
        let node_override = tree("name: other");
        assert!(
            resolve(
                "worker-1",
                Role::Worker,
                &defaults(),
                &ConfigTree::new(),
                &node_override
            )
            .is_err()
        );
    }

    #[test]
    fn test_full_shape_projects() {
        let node_override = tree(
            "network:\n  bridged: true\n  extra_interfaces:\n    - name=en0\n\
             mounts:\n  - source: /data\n    target: /mnt/data\n    readonly: true\n\
             cloud_init: cloud-init/worker.yaml\n\
             system:\n  post_creation_scripts:\n    - scripts/join.sh",
        );
        let node = resolve(
            "worker-1",
            Role::Worker,
            &defaults(),
            &ConfigTree::new(),
            &node_override,
        )
        .unwrap();
        assert!(node.network.bridged);
        assert_eq!(node.network.extra_interfaces, vec!["name=en0"]);
        assert_eq!(node.mounts.len(), 1);
        assert!(node.mounts[0].readonly);
        assert_eq!(
            node.cloud_init.as_deref(),
            Some(std::path::Path::new("cloud-init/worker.yaml"))
        );
        assert_eq!(node.post_creation_scripts.len(), 1);
    }

    #[test]
    fn test_effective_tree_retains_merged_view() {
        let node_override = tree("resources:\n  memory: 8G");
        let node = resolve(
            "worker-1",
            Role::Worker,
            &defaults(),
            &ConfigTree::new(),
            &node_override,
        )
        .unwrap();
        let resources = node.effective().get("resources").unwrap().as_map().unwrap();
        assert_eq!(
            resources.get("memory").and_then(ConfigValue::as_str),
            Some("8G")
        );
        // untouched default still visible in the snapshot
        assert_eq!(
            resources.get("disk").and_then(ConfigValue::as_str),
            Some("10G")
        );
    }
}

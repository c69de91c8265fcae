//! Typed node model: the immutable effective snapshot produced by the
//! resolver and owned by the cluster.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::quantity::ResourceQuantity;
use crate::tree::ConfigTree;

/// A node's cluster function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Controller,
    Worker,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "controller" => Some(Self::Controller),
            "worker" => Some(Self::Worker),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Worker => "worker",
        }
    }

    pub fn all() -> [Role; 2] {
        [Self::Controller, Self::Worker]
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network attachment for one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Attach to the host's bridged network.
    #[serde(default)]
    pub bridged: bool,
    /// Additional interface specs passed through to the backend, in order.
    #[serde(default)]
    pub extra_interfaces: Vec<String>,
}

/// A host directory mounted into the guest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mount {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub readonly: bool,
}

/// One resolved node. Constructed only by the resolver; never mutated in
/// place - a config change produces a new snapshot.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub role: Role,
    pub image: String,
    pub cpus: u32,
    pub memory: ResourceQuantity,
    pub disk: ResourceQuantity,
    pub network: NetworkSpec,
    pub mounts: Vec<Mount>,
    pub cloud_init: Option<PathBuf>,
    pub post_creation_scripts: Vec<PathBuf>,
    pub(crate) effective: ConfigTree,
}

impl Node {
    /// The fully merged configuration tree this node was projected from,
    /// kept for audit output and generated config files.
    pub fn effective(&self) -> &ConfigTree {
        &self.effective
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("controller"), Some(Role::Controller));
        assert_eq!(Role::parse("worker"), Some(Role::Worker));
        assert_eq!(Role::parse("main"), None);
        assert_eq!(Role::parse("Controller"), None);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Controller.to_string(), "controller");
        assert_eq!(Role::Worker.to_string(), "worker");
    }

    #[test]
    fn test_network_spec_defaults() {
        let net: NetworkSpec = serde_yaml::from_str("{}").unwrap();
        assert!(!net.bridged);
        assert!(net.extra_interfaces.is_empty());
    }

    #[test]
    fn test_mount_readonly_defaults_false() {
        let mount: Mount = serde_yaml::from_str("source: /src\ntarget: /dst").unwrap();
        assert!(!mount.readonly);
    }
}

use serde::Serialize;
use tabled::Tabled;

use mkc_core::node::Node;
use mkc_runtime::backend::VmRecord;

/// Display row for `status`.
#[derive(Debug, Serialize, Tabled)]
pub struct VmStatusRow {
    #[tabled(rename = "NAME")]
    pub name: String,
    #[tabled(rename = "STATE")]
    pub state: String,
    #[tabled(rename = "IPV4")]
    pub ipv4: String,
    #[tabled(rename = "IMAGE")]
    pub image: String,
}

impl VmStatusRow {
    pub fn from_record(record: &VmRecord) -> Self {
        let ipv4 = match record.ipv4.as_slice() {
            [] => "No IP address".to_string(),
            [first] => first.clone(),
            [first, rest @ ..] => format!("{} (+{} more)", first, rest.len()),
        };
        Self {
            name: record.name.clone(),
            state: record.state.to_string(),
            ipv4,
            image: record.image.clone(),
        }
    }
}

/// Display row for `info`.
#[derive(Debug, Serialize, Tabled)]
pub struct NodeRow {
    #[tabled(rename = "NAME")]
    pub name: String,
    #[tabled(rename = "ROLE")]
    pub role: String,
    #[tabled(rename = "IMAGE")]
    pub image: String,
    #[tabled(rename = "CPUS")]
    pub cpus: u32,
    #[tabled(rename = "MEMORY")]
    pub memory: String,
    #[tabled(rename = "DISK")]
    pub disk: String,
}

impl NodeRow {
    pub fn from_node(node: &Node) -> Self {
        Self {
            name: node.name.clone(),
            role: node.role.to_string(),
            image: node.image.clone(),
            cpus: node.cpus,
            memory: node.memory.to_string(),
            disk: node.disk.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mkc_runtime::backend::VmState;

    fn record(ipv4: &[&str]) -> VmRecord {
        VmRecord {
            name: "worker-1".to_string(),
            state: VmState::Running,
            ipv4: ipv4.iter().map(|s| s.to_string()).collect(),
            image: "Ubuntu 22.04 LTS".to_string(),
        }
    }

    #[test]
    fn test_status_row_no_ip() {
        assert_eq!(VmStatusRow::from_record(&record(&[])).ipv4, "No IP address");
    }

    #[test]
    fn test_status_row_single_ip() {
        assert_eq!(
            VmStatusRow::from_record(&record(&["192.168.64.2"])).ipv4,
            "192.168.64.2"
        );
    }

    #[test]
    fn test_status_row_extra_ips_summarized() {
        assert_eq!(
            VmStatusRow::from_record(&record(&["192.168.64.2", "10.0.0.2", "10.0.0.3"])).ipv4,
            "192.168.64.2 (+2 more)"
        );
    }
}

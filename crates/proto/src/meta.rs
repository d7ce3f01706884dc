//! Database provisioning requests and permission grants.

use serde::{Deserialize, Serialize};

use dsql_common::Address;

/// Resource requirements submitted once with a create-database transaction.
/// Not persisted client-side after submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMeta {
    /// Designated miners; empty means the chain picks freely.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_miners: Vec<Address>,
    /// Reserved node count.
    #[serde(default)]
    pub node: u16,
    /// Reserved storage space in bytes.
    #[serde(default)]
    pub space: u64,
    /// Reserved memory in bytes.
    #[serde(default)]
    pub memory: u64,
    /// Max loadAvg15 per CPU on reserved miners.
    #[serde(default)]
    pub load_avg_per_cpu: f64,
    /// Client-side encryption key for the database instance.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub encryption_key: String,
    /// Use eventual consistency replication if enabled.
    #[serde(default)]
    pub use_eventual_consistency: bool,
    /// Customized strong consistency level.
    #[serde(default)]
    pub consistency_level: f64,
    /// Customized isolation level, mirroring standard SQL levels.
    #[serde(default)]
    pub isolation_level: i32,
}

/// Role granted to a user on one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionRole {
    Admin,
    Write,
    Read,
    /// No access; used to revoke a previous grant.
    Void,
}

/// Per-user access permission carried by an update-permission transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub role: PermissionRole,
    /// Optional SQL pattern allow-list; empty means unrestricted for the role.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
}

impl Permission {
    pub fn new(role: PermissionRole) -> Self {
        Permission { role, patterns: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_meta_omits_empty_fields() {
        let meta = ResourceMeta { node: 3, ..Default::default() };
        let json = serde_json::to_string(&meta).expect("serialize");
        assert!(!json.contains("target_miners"));
        assert!(!json.contains("encryption_key"));

        let back: ResourceMeta = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(meta, back);
    }

    #[test]
    fn permission_role_wire_names() {
        let p = Permission::new(PermissionRole::Write);
        let json = serde_json::to_string(&p).expect("serialize");
        assert!(json.contains("\"write\""));
    }
}

//! Entity types mirroring the relational store's tables.
//!
//! These are plain data structs; all invariants (appname derivation,
//! `used ⇔ owner` on Core/Port, terminal-status rules on Task) are enforced
//! by the `store` module that mutates them, not by the types themselves.

use serde::{Deserialize, Serialize};

pub type HostId = i64;
pub type AppId = i64;
pub type VersionId = i64;
pub type NetworkId = i64;
pub type CoreId = i64;
pub type PortId = i64;
pub type IpId = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub id: AppId,
    pub name: String,
    pub repo_url: String,
    pub owner_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub app_id: AppId,
    /// 40-char content hash
    pub sha: String,
}

impl Version {
    /// First 7 characters of the content hash, used in user-visible image tags.
    pub fn short_sha(&self) -> &str {
        &self.sha[..7.min(self.sha.len())]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub app_id: AppId,
    pub version_id: VersionId,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub address: String,
    pub name: String,
    pub uid: i64,
    pub core_count: i64,
    pub memory: i64,
    pub pod: String,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoreShare {
    Full,
    Part,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Core {
    pub id: CoreId,
    pub host_id: HostId,
    /// "0".."N-1"
    pub label: String,
    pub used: bool,
    pub container_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub host_id: HostId,
    pub port: i32,
    pub used: bool,
    pub container_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub id: NetworkId,
    pub cidr: String,
    pub vlan_seq_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ip {
    pub id: IpId,
    pub network_id: NetworkId,
    pub address: String,
    pub vlan_seq_id: i64,
    pub container_id: Option<i64>,
    pub vethname: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub id: i64,
    /// 64-char Docker container id
    pub container_id: String,
    pub host_id: HostId,
    pub version_id: VersionId,
    pub app_id: AppId,
    pub name: String,
    pub entrypoint: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub is_alive: bool,
}

impl Container {
    /// Appname is the container name split at the first underscore.
    pub fn appname(&self) -> &str {
        self.name.split('_').next().unwrap_or(&self.name)
    }
}

/// Minimal view of a container handed to the agent's add-container RPC and
/// written into the agent-tracking hashtable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerMeta {
    pub container_id: String,
    pub host: String,
    pub name: String,
    pub entrypoint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Build,
    CreateWithMacvlan,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub host_id: HostId,
    pub version_id: VersionId,
    pub app_id: AppId,
    pub kind: TaskKind,
    /// Freeform JSON props interpreted by the matching engine handler.
    pub props: serde_json::Value,
    pub status: TaskStatus,
    pub reason: String,
    pub container_ids: Vec<String>,
}

/// Pre-reserved cores handed to a create task by an earlier planning step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreReservation {
    pub full: Vec<Core>,
    pub part: Vec<Core>,
}

/// Result of one attach attempt, as reported by either Agent Bridge transport.
#[derive(Debug, Clone)]
pub struct AttachResult {
    pub succ: bool,
    pub container_id: String,
    pub vethname: String,
    pub vlan_address: String,
}

//! Agent Bridge: two interchangeable transports behind one capability
//! interface for requesting MACVLAN attachment and receiving per-IP
//! results, plus a retry decorator wrapping either.

pub mod broadcast;
pub mod retry;
pub mod sync;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{AttachResult, ContainerMeta, Host};

#[async_trait]
pub trait AgentBridge: Send + Sync {
    /// Requests MACVLAN attachment for `requests` (nid, vlan_address pairs)
    /// on `container_id`, returning one result per request in the order
    /// requested.
    async fn attach_vlans(
        &self,
        host: &Host,
        task_id: &str,
        container_id: &str,
        requests: &[(String, String)],
    ) -> Result<Vec<AttachResult>>;

    /// Notifies the agent a container now exists (add-container RPC).
    async fn add_container(&self, host: &Host, container: &ContainerMeta) -> Result<()>;
}

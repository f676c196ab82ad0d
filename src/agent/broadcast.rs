use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::broker::{keys, Broker};
use crate::error::{EngineError, Result};
use crate::model::{AttachResult, ContainerMeta, Host};

use super::AgentBridge;

/// Publishes the pipe-delimited attach request to `eru:agent:<host>:vlan`,
/// then blocks on `eru:agent:<task_id>:feedback` once per requested
/// address with a 15-second timeout. Stops at the first timeout or
/// `succ=0` and always deletes the feedback key on exit, so a stale key
/// can never leak into a later task that happens to reuse a queue name.
pub struct BroadcastBridge {
    broker: Arc<Broker>,
    feedback_timeout_secs: u64,
}

impl BroadcastBridge {
    pub fn new(broker: Arc<Broker>, feedback_timeout_secs: u64) -> Self {
        Self {
            broker,
            feedback_timeout_secs,
        }
    }
}

#[async_trait]
impl AgentBridge for BroadcastBridge {
    async fn attach_vlans(
        &self,
        host: &Host,
        task_id: &str,
        container_id: &str,
        requests: &[(String, String)],
    ) -> Result<Vec<AttachResult>> {
        let mut wire = format!("{task_id}|{container_id}");
        for (nid, addr) in requests {
            wire.push('|');
            wire.push_str(nid);
            wire.push(':');
            wire.push_str(addr);
        }

        self.broker
            .publish(&keys::agent_vlan_channel(&host.address), &wire)
            .await?;

        let feedback_key = keys::agent_feedback_queue(task_id);
        let mut results = Vec::with_capacity(requests.len());

        for _ in requests {
            let popped = self
                .broker
                .blpop(&feedback_key, self.feedback_timeout_secs)
                .await?;

            let Some((_, value)) = popped else {
                warn!(task_id, container_id, "attach feedback timed out");
                break;
            };

            let parts: Vec<&str> = value.splitn(4, '|').collect();
            if parts.len() != 4 {
                warn!(task_id, value, "malformed feedback wire value, treating as failure");
                break;
            }
            let succ = parts[0] == "1";
            let result = AttachResult {
                succ,
                container_id: parts[1].to_string(),
                vethname: parts[2].to_string(),
                vlan_address: parts[3].to_string(),
            };
            let failed = !result.succ;
            results.push(result);
            if failed {
                break;
            }
        }

        self.broker.delete(&feedback_key).await?;
        Ok(results)
    }

    async fn add_container(&self, host: &Host, container: &ContainerMeta) -> Result<()> {
        let payload = serde_json::to_string(container)
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        self.broker
            .publish(&keys::agent_vlan_channel(&host.address), &format!("meta|{payload}"))
            .await
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::model::{AttachResult, ContainerMeta, Host};

use super::AgentBridge;

#[derive(Serialize)]
struct IpRequest {
    nid: String,
    address: String,
}

#[derive(Serialize)]
struct AttachRequestBody {
    task_id: String,
    ips: Vec<IpRequest>,
}

#[derive(Deserialize)]
struct AttachResultBody {
    succ: u8,
    veth: String,
}

#[derive(Serialize)]
struct AddContainerBody<'a> {
    container_id: &'a str,
    name: &'a str,
    entrypoint: &'a str,
}

/// POSTs JSON to the per-host agent endpoint. A non-200 response aborts the
/// whole attach attempt (treated the same as a timeout by the retry
/// decorator).
pub struct SyncBridge {
    client: reqwest::Client,
    endpoint_template: String,
}

impl SyncBridge {
    pub fn new(endpoint_template: String, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client builds with a fixed timeout");
        Self {
            client,
            endpoint_template,
        }
    }

    fn endpoint_for(&self, host: &Host) -> String {
        self.endpoint_template.replace("{host}", &host.address)
    }
}

#[async_trait]
impl AgentBridge for SyncBridge {
    async fn attach_vlans(
        &self,
        host: &Host,
        task_id: &str,
        _container_id: &str,
        requests: &[(String, String)],
    ) -> Result<Vec<AttachResult>> {
        let body = AttachRequestBody {
            task_id: task_id.to_string(),
            ips: requests
                .iter()
                .map(|(nid, address)| IpRequest {
                    nid: nid.clone(),
                    address: address.clone(),
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.endpoint_for(host))
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::AgentRejected(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::AgentRejected(format!(
                "agent returned status {}",
                response.status()
            )));
        }

        let parsed: Vec<AttachResultBody> = response
            .json()
            .await
            .map_err(|e| EngineError::AgentRejected(e.to_string()))?;

        Ok(parsed
            .into_iter()
            .zip(requests.iter())
            .map(|(result, (_, address))| AttachResult {
                succ: result.succ == 1,
                container_id: _container_id.to_string(),
                vethname: result.veth,
                vlan_address: address.clone(),
            })
            .collect())
    }

    async fn add_container(&self, host: &Host, container: &ContainerMeta) -> Result<()> {
        let body = AddContainerBody {
            container_id: &container.container_id,
            name: &container.name,
            entrypoint: &container.entrypoint,
        };
        let response = self
            .client
            .post(format!("{}/containers", self.endpoint_for(host)))
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::AgentRejected(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EngineError::AgentRejected(format!(
                "agent returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

use std::collections::HashMap;
use std::time::Duration;

use bollard::container::{Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions};
use bollard::errors::Error as BollardError;
use bollard::image::{BuildImageOptions, CreateImageOptions, PushImageOptions, RemoveImageOptions};
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use dashmap::DashMap;
use futures_util::stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::model::{Core, Port};

/// Per-host Docker façade. Each Host in the data model may be a distinct
/// daemon reachable over TCP, so connections are dialed lazily and cached
/// per host address — the same `DashMap`-of-clients shape the teacher uses
/// for its per-server state.
pub struct DockerDriver {
    clients: DashMap<String, Docker>,
    dial_timeout: Duration,
}

impl DockerDriver {
    pub fn new(dial_timeout: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            dial_timeout,
        }
    }

    fn client_for(&self, host_address: &str) -> Result<Docker> {
        if let Some(client) = self.clients.get(host_address) {
            return Ok(client.clone());
        }
        let client = Docker::connect_with_http(
            host_address,
            self.dial_timeout.as_secs(),
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(EngineError::Docker)?;
        self.clients.insert(host_address.to_string(), client.clone());
        Ok(client)
    }

    pub fn pull_image(
        &self,
        host_address: &str,
        repo: &str,
        tag: &str,
    ) -> Result<impl Stream<Item = Result<String>>> {
        let client = self.client_for(host_address)?;
        let options = CreateImageOptions {
            from_image: repo.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        };
        let stream = client
            .create_image(Some(options), None, None)
            .map(|item| match item {
                Ok(info) => Ok(info
                    .status
                    .or(info.progress)
                    .unwrap_or_default()),
                Err(e) => Err(EngineError::Docker(e)),
            });
        Ok(stream)
    }

    pub fn build_image(
        &self,
        host_address: &str,
        image_tag: &str,
        tar_context: Vec<u8>,
    ) -> Result<impl Stream<Item = Result<String>>> {
        let client = self.client_for(host_address)?;
        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: image_tag.to_string(),
            rm: true,
            ..Default::default()
        };
        let stream = client
            .build_image(options, None, Some(tar_context.into()))
            .map(|item| match item {
                Ok(info) => Ok(info.stream.unwrap_or_default()),
                Err(e) => Err(EngineError::Docker(e)),
            });
        Ok(stream)
    }

    pub fn push_image(
        &self,
        host_address: &str,
        image_name: &str,
        tag: &str,
    ) -> Result<impl Stream<Item = Result<String>>> {
        let client = self.client_for(host_address)?;
        let options = PushImageOptions { tag: tag.to_string() };
        let stream = client
            .push_image(image_name, Some(options), None)
            .map(|item| match item {
                Ok(info) => Ok(info.status.unwrap_or_default()),
                Err(e) => Err(EngineError::Docker(e)),
            });
        Ok(stream)
    }

    /// Best-effort local image removal; failures are logged by the caller,
    /// not escalated.
    pub async fn remove_image(&self, host_address: &str, image: &str) -> Result<()> {
        let client = self.client_for(host_address)?;
        client
            .remove_image(image, Some(RemoveImageOptions { force: true, ..Default::default() }), None)
            .await
            .map_err(EngineError::Docker)?;
        Ok(())
    }

    /// Creates one container bound to `cores` (cpuset) with the given
    /// `cpu_shares`, publishing `ports`, and skipping Docker-native
    /// networking when `need_network` is true (MACVLAN is attached
    /// out-of-band afterward by the Agent Bridge).
    #[allow(clippy::too_many_arguments)]
    pub async fn create_one_container(
        &self,
        host_address: &str,
        name: &str,
        image: &str,
        entrypoint: &[String],
        env: &[String],
        cores: &[Core],
        ports: &[Port],
        args: &[String],
        cpu_shares: i64,
        need_network: bool,
    ) -> Result<(String, String)> {
        let client = self.client_for(host_address)?;

        let cpuset_cpus = cores
            .iter()
            .map(|c| c.label.clone())
            .collect::<Vec<_>>()
            .join(",");

        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        for port in ports {
            let key = format!("{}/tcp", port.port);
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some(port.port.to_string()),
                }]),
            );
        }

        let host_config = HostConfig {
            cpu_shares: Some(cpu_shares),
            cpuset_cpus: if cpuset_cpus.is_empty() {
                None
            } else {
                Some(cpuset_cpus)
            },
            port_bindings: Some(port_bindings),
            network_mode: if need_network {
                Some("none".to_string())
            } else {
                None
            },
            ..Default::default()
        };

        let mut cmd = entrypoint.to_vec();
        cmd.extend_from_slice(args);

        let config = Config {
            image: Some(image.to_string()),
            cmd: if cmd.is_empty() { None } else { Some(cmd) },
            env: if env.is_empty() { None } else { Some(env.to_vec()) },
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = client
            .create_container(
                Some(CreateContainerOptions {
                    name: name.to_string(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(EngineError::Docker)?;

        for warning in &response.warnings {
            warn!(container = %response.id, %warning, "docker create warning");
        }

        client
            .start_container::<String>(&response.id, None)
            .await
            .map_err(EngineError::Docker)?;

        info!(container = %response.id, host = host_address, "container created and started");
        Ok((response.id, name.to_string()))
    }

    /// Batched remove of every container on a host; individual failures are
    /// logged and do not abort the remaining removals.
    pub async fn remove_host_containers(&self, host_address: &str, cids: &[String]) {
        for cid in cids {
            if let Err(e) = self.remove_container_by_cid(host_address, cid).await {
                warn!(container = %cid, error = %e, "failed to remove container");
            }
        }
    }

    pub async fn remove_container_by_cid(&self, host_address: &str, cid: &str) -> Result<()> {
        let client = self.client_for(host_address)?;
        match client
            .remove_container(
                cid,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(EngineError::Docker(e)),
        }
    }

    pub async fn list_containers(&self, host_address: &str) -> Result<Vec<String>> {
        let client = self.client_for(host_address)?;
        let containers = client
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
            .map_err(EngineError::Docker)?;
        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }
}

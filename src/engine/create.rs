use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::model::{AttachResult, Container, ContainerMeta, Core, Host, Ip, Port, Task, TaskStatus};
use crate::notifier::TaskNotifier;

use super::EngineContext;

#[derive(Deserialize)]
struct CreateProps {
    ncontainer: u32,
    #[serde(default)]
    nshare: u32,
    #[serde(default)]
    full_core_ids: Vec<i64>,
    #[serde(default)]
    part_core_ids: Vec<i64>,
    network_ids: Vec<i64>,
    #[serde(default)]
    spec_ips: Option<Vec<String>>,
    name_prefix: String,
    entrypoint: String,
    #[serde(default)]
    env: Vec<String>,
    /// one Port-id list per container slot, parallel to `ncontainer`
    #[serde(default)]
    port_ids: Vec<Vec<i64>>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    route: String,
    image: String,
    #[serde(default = "default_core_share")]
    core_share: f64,
    #[serde(default)]
    health_check: Option<String>,
}

fn default_core_share() -> f64 {
    1.0
}

/// `cpu_shares = 1024` when `nshare == 0`, else `round(nshare / core_share * 1024)`.
fn cpu_shares(nshare: u32, core_share: f64) -> i64 {
    if nshare == 0 {
        1024
    } else {
        (nshare as f64 / core_share * 1024.0).round() as i64
    }
}

fn chunk_ceil<T: Clone>(items: &[T], n: usize) -> Vec<Vec<T>> {
    if n == 0 {
        return Vec::new();
    }
    if items.is_empty() {
        return vec![Vec::new(); n];
    }
    let chunk_size = items.len().div_ceil(n);
    let mut chunks: Vec<Vec<T>> = items.chunks(chunk_size).map(|c| c.to_vec()).collect();
    while chunks.len() < n {
        chunks.push(Vec::new());
    }
    chunks
}

/// Partitions `full` and `part` into `ncontainer` chunks each, at most
/// `ceil(len/ncontainer)` per chunk; once a side is exhausted, later slots
/// receive `[]` for that side. Both empty yields `ncontainer` `([], [])`
/// pairs.
fn iter_cores(full: &[Core], part: &[Core], ncontainer: usize) -> Vec<(Vec<Core>, Vec<Core>)> {
    let full_chunks = chunk_ceil(full, ncontainer);
    let part_chunks = chunk_ceil(part, ncontainer);
    (0..ncontainer)
        .map(|i| {
            (
                full_chunks.get(i).cloned().unwrap_or_default(),
                part_chunks.get(i).cloned().unwrap_or_default(),
            )
        })
        .collect()
}

/// Pairs each attach result with the `Ip` it belongs to, matched by
/// `vlan_address` rather than position: the broadcast feedback queue
/// delivers per-IP results in arrival order, not request order, so two IPs
/// attaching out of order would otherwise bind the wrong vethname to the
/// wrong IP row. Results with no matching address (shouldn't happen once
/// the retry bridge has confirmed full success) are silently dropped.
fn match_feedback_by_vlan_address<'a>(
    acquired: &'a [Ip],
    results: &'a [AttachResult],
) -> Vec<(&'a Ip, &'a str)> {
    let by_vlan_address: std::collections::HashMap<&str, &Ip> = acquired
        .iter()
        .map(|ip| (ip.address.as_str(), ip))
        .collect();
    results
        .iter()
        .filter_map(|result| {
            by_vlan_address
                .get(result.vlan_address.as_str())
                .map(|ip| (*ip, result.vethname.as_str()))
        })
        .collect()
}

pub async fn run_create_task(ctx: &EngineContext, task: Task) -> Result<()> {
    let notifier = TaskNotifier::new(ctx.broker.clone(), task.id.clone());

    match run_create_steps(ctx, &task).await {
        Ok(()) => Ok(()),
        Err(e) => {
            ctx.store
                .finish(&task.id, TaskStatus::Failed, &e.to_string())
                .await?;
            notifier.pub_fail(&e.to_string()).await?;
            Ok(())
        }
    }
}

async fn run_create_steps(ctx: &EngineContext, task: &Task) -> Result<()> {
    let props: CreateProps = serde_json::from_value(task.props.clone())
        .map_err(|e| EngineError::Internal(format!("invalid create props: {e}")))?;

    let host = ctx.store.get_host(task.host_id).await?;
    let version = ctx.store.get_version(task.version_id).await?;
    let app = ctx.store.get_app(task.app_id).await?;

    let full_cores = ctx.store.cores_by_ids(&props.full_core_ids).await?;
    let part_cores = ctx.store.cores_by_ids(&props.part_core_ids).await?;
    let shares = cpu_shares(props.nshare, props.core_share);
    let slots = iter_cores(&full_cores, &part_cores, props.ncontainer as usize);

    let mut registered_appnames = Vec::new();
    let mut any_backend_registered = false;
    let mut backends = Vec::new();

    for (index, (fcores, pcores)) in slots.into_iter().enumerate() {
        let mut cores: Vec<Core> = fcores;
        cores.extend(pcores);

        let port_ids = props.port_ids.get(index).cloned().unwrap_or_default();
        let ports = ctx.store.ports_by_ids(&port_ids).await?;

        let name = format!("{}_{}_{}", props.name_prefix, version.short_sha(), index);

        let create_result = ctx
            .docker
            .create_one_container(
                &host.address,
                &name,
                &props.image,
                &[props.entrypoint.clone()],
                &props.env,
                &cores,
                &ports,
                &props.args,
                shares,
                true,
            )
            .await;

        let (container_id, _container_name) = match create_result {
            Ok(created) => created,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, slot = index, "docker create failed, releasing slot");
                ctx.store.release_cores(&cores, props.nshare).await?;
                ctx.store.release_ports(&ports).await?;
                continue;
            }
        };

        match attach_slot(
            ctx,
            task,
            &host,
            &app,
            &props,
            &container_id,
            &props.network_ids,
            index,
            &cores,
            &ports,
        )
        .await
        {
            Ok(Some((container, appname, slot_backends))) => {
                registered_appnames.push(appname);
                backends.extend(slot_backends);
                any_backend_registered = any_backend_registered || !backends.is_empty();
                ctx.store.append_container_id(&task.id, &container.container_id).await?;
            }
            Ok(None) => {
                // attach failed; unwind this slot
                ctx.docker
                    .remove_container_by_cid(&host.address, &container_id)
                    .await
                    .unwrap_or_else(|e| warn!(error = %e, "failed to remove container during rollback"));
                ctx.store.release_cores(&cores, props.nshare).await?;
                ctx.store.release_ports(&ports).await?;
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "attach step errored, rolling back slot");
                ctx.docker
                    .remove_container_by_cid(&host.address, &container_id)
                    .await
                    .unwrap_or_else(|e| warn!(error = %e, "failed to remove container during rollback"));
                ctx.store.release_cores(&cores, props.nshare).await?;
                ctx.store.release_ports(&ports).await?;
            }
        }
    }

    if let Some(health_check) = &props.health_check {
        if any_backend_registered {
            let urls: Vec<String> = backends
                .iter()
                .map(|backend| format!("http://{backend}{health_check}"))
                .collect();
            let ok = crate::health::probe_all(&urls, Duration::from_secs(5)).await;
            if !ok {
                return Err(EngineError::Internal(
                    "post-deploy health check failed".to_string(),
                ));
            }
        }
    }

    ctx.discovery.publish_for_appnames(&registered_appnames).await?;
    ctx.store.finish(&task.id, TaskStatus::Success, "ok").await?;
    ctx.monitoring
        .register_expression(version.id, &format!("{}.{}", app.name, props.entrypoint))
        .await?;
    ctx.monitoring.register_graphs_and_alarms(version.id).await;

    let notifier = TaskNotifier::new(ctx.broker.clone(), task.id.clone());
    notifier.pub_success().await?;
    Ok(())
}

/// Acquires IPs, drives the Agent Bridge attach, and on full success
/// persists the Container row and registers service discovery. Returns
/// `None` (not `Err`) when the attach did not fully succeed — that is a
/// recoverable per-slot outcome, not a task-level error.
#[allow(clippy::too_many_arguments)]
async fn attach_slot(
    ctx: &EngineContext,
    task: &Task,
    host: &Host,
    app: &crate::model::App,
    props: &CreateProps,
    container_id: &str,
    network_ids: &[i64],
    slot_index: usize,
    cores: &[Core],
    ports: &[Port],
) -> Result<Option<(Container, String, Vec<String>)>> {
    let mut acquired: Vec<Ip> = Vec::new();
    if let Some(spec_ips) = &props.spec_ips {
        for (network_id, address) in network_ids.iter().zip(spec_ips.iter()) {
            if let Some(ip) = ctx.store.acquire_specific_ip(*network_id, address).await? {
                acquired.push(ip);
            }
        }
    } else {
        for network_id in network_ids {
            if let Some(ip) = ctx.store.acquire_ip(*network_id).await? {
                acquired.push(ip);
            }
        }
    }

    if acquired.is_empty() {
        return Ok(None);
    }

    let requests: Vec<(String, String)> = acquired
        .iter()
        .map(|ip| (ip.network_id.to_string(), ip.address.clone()))
        .collect();

    let results = ctx
        .agent
        .attach_vlans(host, &task.id, container_id, &requests)
        .await?;

    if results.len() != acquired.len() || !results.iter().all(|r| r.succ) {
        for ip in &acquired {
            ctx.store.release(ip).await?;
        }
        return Ok(None);
    }

    let name = format!("{}_{}_{}", props.name_prefix, slot_index, app.name);
    let container = ctx
        .store
        .create_container(
            container_id,
            host.id,
            task.version_id,
            task.app_id,
            &name,
            &props.entrypoint,
            cores,
            ports,
        )
        .await?;

    for (ip, vethname) in match_feedback_by_vlan_address(&acquired, &results) {
        ctx.store
            .assigned_to_container(ip, container.id, vethname)
            .await?;
    }

    let meta = ContainerMeta {
        container_id: container_id.to_string(),
        host: host.address.clone(),
        name: container.name.clone(),
        entrypoint: props.entrypoint.clone(),
    };
    ctx.agent.add_container(host, &meta).await?;

    ctx.broker
        .hset(
            &crate::broker::keys::agent_containers_meta(&host.address),
            container_id,
            &serde_json::to_string(&meta).unwrap_or_default(),
        )
        .await?;

    if !props.route.is_empty() {
        ctx.broker
            .publish(
                &crate::broker::keys::agent_route_channel(&host.address),
                &format!("{container_id}|{}", props.route),
            )
            .await?;
    }

    let appname = container.appname().to_string();
    let mut backends = Vec::new();
    for port_id in props.port_ids.get(slot_index).cloned().unwrap_or_default() {
        if let Some(port) = ctx.store.ports_by_ids(&[port_id]).await?.into_iter().next() {
            let backend = format!("{}:{}", host.address, port.port);
            ctx.discovery
                .register(&appname, &props.entrypoint, &backend)
                .await?;
            backends.push(backend);
        }
    }

    info!(task_id = %task.id, container_id, "container created and attached");
    Ok(Some((container, appname, backends)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CoreId, HostId};

    fn core(id: CoreId, label: &str) -> Core {
        Core {
            id,
            host_id: 1 as HostId,
            label: label.to_string(),
            used: false,
            container_id: None,
        }
    }

    #[test]
    fn test_cpu_shares_formula() {
        assert_eq!(cpu_shares(0, 1.0), 1024);
        assert_eq!(cpu_shares(5, 2.0), 2560);
    }

    #[test]
    fn test_iter_cores_empty_yields_n_empty_pairs() {
        let pairs = iter_cores(&[], &[], 3);
        assert_eq!(pairs.len(), 3);
        for (full, part) in pairs {
            assert!(full.is_empty());
            assert!(part.is_empty());
        }
    }

    #[test]
    fn test_iter_cores_partitions_evenly() {
        let full = vec![core(1, "0"), core(2, "1"), core(3, "2"), core(4, "3")];
        let pairs = iter_cores(&full, &[], 2);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0.len(), 2);
        assert_eq!(pairs[1].0.len(), 2);
    }

    #[test]
    fn test_iter_cores_more_containers_than_cores() {
        let full = vec![core(1, "0")];
        let pairs = iter_cores(&full, &[], 3);
        assert_eq!(pairs.len(), 3);
        let total: usize = pairs.iter().map(|(f, _)| f.len()).sum();
        assert_eq!(total, 1);
    }

    fn ip(id: crate::model::IpId, address: &str) -> Ip {
        Ip {
            id,
            network_id: 1,
            address: address.to_string(),
            vlan_seq_id: 7,
            container_id: None,
            vethname: None,
        }
    }

    fn attach_result(succ: bool, vethname: &str, vlan_address: &str) -> AttachResult {
        AttachResult {
            succ,
            container_id: "cid".to_string(),
            vethname: vethname.to_string(),
            vlan_address: vlan_address.to_string(),
        }
    }

    #[test]
    fn test_match_feedback_by_vlan_address_handles_out_of_order_results() {
        let acquired = vec![ip(1, "10.0.0.1"), ip(2, "10.0.0.2")];
        // feedback for the second requested address arrives first
        let results = vec![
            attach_result(true, "veth1", "10.0.0.2"),
            attach_result(true, "veth0", "10.0.0.1"),
        ];
        let matched = match_feedback_by_vlan_address(&acquired, &results);
        let by_address: std::collections::HashMap<&str, &str> = matched
            .iter()
            .map(|(ip, vethname)| (ip.address.as_str(), *vethname))
            .collect();
        assert_eq!(by_address["10.0.0.1"], "veth0");
        assert_eq!(by_address["10.0.0.2"], "veth1");
    }

    #[test]
    fn test_match_feedback_by_vlan_address_drops_unmatched_results() {
        let acquired = vec![ip(1, "10.0.0.1")];
        let results = vec![attach_result(true, "veth9", "10.0.0.9")];
        let matched = match_feedback_by_vlan_address(&acquired, &results);
        assert!(matched.is_empty());
    }
}

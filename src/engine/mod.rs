//! Task Engine: the orchestrator. One `run` entrypoint dispatches a
//! dequeued Task to its matching handler — the "worker dequeues it,
//! resolves the Task ... then drives Docker Driver and Agent Bridge" step
//! from the system overview's data-flow paragraph.

mod build;
mod create;
mod remove;

use std::sync::Arc;

use crate::agent::AgentBridge;
use crate::broker::Broker;
use crate::discovery::ServiceDiscoveryPublisher;
use crate::docker::DockerDriver;
use crate::error::Result;
use crate::model::{Task, TaskKind};
use crate::monitoring::MonitoringClient;
use crate::store::Store;

/// Everything a task handler needs, assembled once at startup and passed
/// explicitly — no ambient singletons.
pub struct EngineContext {
    pub store: Arc<Store>,
    pub broker: Arc<Broker>,
    pub docker: Arc<DockerDriver>,
    pub agent: Arc<dyn AgentBridge>,
    pub discovery: Arc<ServiceDiscoveryPublisher>,
    pub monitoring: Arc<dyn MonitoringClient>,
    pub registry_url: String,
}

pub async fn run(ctx: &EngineContext, task: Task) -> Result<()> {
    match task.kind {
        TaskKind::Build => build::run_build_task(ctx, task).await,
        TaskKind::CreateWithMacvlan => create::run_create_task(ctx, task).await,
        TaskKind::Remove => remove::run_remove_task(ctx, task).await,
    }
}

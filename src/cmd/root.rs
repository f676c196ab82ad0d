use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::broadcast::BroadcastBridge;
use crate::agent::retry::RetryBridge;
use crate::agent::sync::SyncBridge;
use crate::agent::AgentBridge;
use crate::broker::Broker;
use crate::config::{AgentTransport, Configuration};
use crate::discovery::ServiceDiscoveryPublisher;
use crate::docker::DockerDriver;
use crate::engine::EngineContext;
use crate::monitoring::{BrokerMonitoringClient, MonitoringClient};
use crate::store::Store;
use crate::worker::WorkerPool;

pub async fn run(config_path: &str) -> Result<()> {
    let config = Configuration::load(config_path)?;

    let store = Arc::new(Store::open(&config.store.path).with_context(|| "failed to open store")?);
    store.init_tables().await?;

    let broker = Arc::new(Broker::new(&config.broker.url));
    if !broker.is_connected().await {
        anyhow::bail!("failed to connect to broker at {}", config.broker.url);
    }

    let docker = Arc::new(DockerDriver::new(Duration::from_secs(config.docker.timeout_secs)));

    let transport: Arc<dyn AgentBridge> = match config.agent.transport {
        AgentTransport::Broadcast => Arc::new(BroadcastBridge::new(
            broker.clone(),
            config.agent.feedback_timeout_secs,
        )),
        AgentTransport::Synchronous => Arc::new(SyncBridge::new(
            config.agent.endpoint_template.clone(),
            config.agent.feedback_timeout_secs,
        )),
    };
    let agent: Arc<dyn AgentBridge> = Arc::new(RetryBridge::new(
        transport,
        config.agent.max_attach_attempts,
    ));

    let discovery = Arc::new(ServiceDiscoveryPublisher::new(broker.clone()));
    let monitoring: Arc<dyn MonitoringClient> = Arc::new(BrokerMonitoringClient::new(broker.clone()));

    let ctx = Arc::new(EngineContext {
        store,
        broker,
        docker,
        agent,
        discovery,
        monitoring,
        registry_url: config.registry.url.clone(),
    });

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::new(
        ctx,
        config.worker.concurrency(),
        config.worker.dequeue_timeout_secs,
    );

    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("ctrl-c received, signaling shutdown");
        shutdown_for_signal.cancel();
    });

    pool.run(shutdown).await;
    Ok(())
}

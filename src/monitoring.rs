//! Monitoring registration: the one piece of the real monitoring-system
//! integration that is actually specified (the falcon expression-id set);
//! graph/alarm registration are logged no-ops since the monitoring system
//! itself is an out-of-scope external collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::broker::{keys, Broker};
use crate::error::Result;

#[async_trait]
pub trait MonitoringClient: Send + Sync {
    async fn register_expression(&self, version_id: i64, expression_id: &str) -> Result<()>;
    async fn register_graphs_and_alarms(&self, version_id: i64);
    async fn deregister_alarms(&self, version_id: i64);
}

pub struct BrokerMonitoringClient {
    broker: Arc<Broker>,
}

impl BrokerMonitoringClient {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl MonitoringClient for BrokerMonitoringClient {
    async fn register_expression(&self, version_id: i64, expression_id: &str) -> Result<()> {
        self.broker
            .sadd(&keys::falcon_version_expression(version_id), expression_id)
            .await
    }

    async fn register_graphs_and_alarms(&self, version_id: i64) {
        info!(version_id, "monitoring graph/alarm registration (no-op, external system)");
    }

    async fn deregister_alarms(&self, version_id: i64) {
        info!(version_id, "monitoring alarm deregistration (no-op, external system)");
    }
}

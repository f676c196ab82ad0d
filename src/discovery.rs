//! Service Discovery Publisher: maintains the per-app, per-entrypoint
//! backend set and signals consumers once batch changes have settled.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::broker::{keys, Broker};
use crate::error::Result;

pub struct ServiceDiscoveryPublisher {
    broker: Arc<Broker>,
}

impl ServiceDiscoveryPublisher {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }

    /// Writes the idempotent `app_key` mapping then adds `backend` to the
    /// entrypoint's set.
    pub async fn register(&self, appname: &str, entrypoint: &str, backend: &str) -> Result<()> {
        let app_key = keys::app_backends(appname);
        let entrypoint_key = keys::entrypoint_backends(appname, entrypoint);
        self.broker.hset(&app_key, entrypoint, &entrypoint_key).await?;
        self.broker.sadd(&entrypoint_key, backend).await
    }

    /// Removes only the backend; the `app_key` mapping survives so
    /// discovery consumers can still observe an (empty) entrypoint set.
    pub async fn deregister(&self, appname: &str, entrypoint: &str, backend: &str) -> Result<()> {
        let entrypoint_key = keys::entrypoint_backends(appname, entrypoint);
        self.broker.srem(&entrypoint_key, backend).await
    }

    /// Fans out one `eru:discovery:published` publish per distinct appname.
    pub async fn publish_for_appnames(&self, appnames: &[String]) -> Result<()> {
        let distinct: BTreeSet<&String> = appnames.iter().collect();
        for appname in distinct {
            self.broker.publish(keys::discovery_published(), appname).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_appnames_dedup() {
        let appnames = vec!["a".to_string(), "a".to_string(), "b".to_string()];
        let distinct: BTreeSet<&String> = appnames.iter().collect();
        assert_eq!(distinct.len(), 2);
    }
}

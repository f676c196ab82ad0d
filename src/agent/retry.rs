use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::model::{AttachResult, ContainerMeta, Host};

use super::AgentBridge;

/// Decorator, not baked into either transport: wraps an inner `AgentBridge`
/// and retries `attach_vlans` up to `max_attempts` times whenever the
/// attachment did not fully succeed (any failure, timeout, or non-200).
pub struct RetryBridge {
    inner: Arc<dyn AgentBridge>,
    max_attempts: u32,
}

impl RetryBridge {
    pub fn new(inner: Arc<dyn AgentBridge>, max_attempts: u32) -> Self {
        Self { inner, max_attempts }
    }
}

#[async_trait]
impl AgentBridge for RetryBridge {
    async fn attach_vlans(
        &self,
        host: &Host,
        task_id: &str,
        container_id: &str,
        requests: &[(String, String)],
    ) -> Result<Vec<AttachResult>> {
        let backoff_policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_max_interval(Duration::from_secs(5))
            .with_max_elapsed_time(None)
            .build();

        let mut attempt = 0u32;
        let max_attempts = self.max_attempts;

        let outcome = retry(backoff_policy, || {
            attempt += 1;
            let inner = Arc::clone(&self.inner);
            async move {
                let result = inner.attach_vlans(host, task_id, container_id, requests).await;
                match result {
                    Ok(results) if results.len() == requests.len() && results.iter().all(|r| r.succ) => {
                        Ok(results)
                    }
                    Ok(partial) => {
                        if attempt >= max_attempts {
                            Ok(partial)
                        } else {
                            warn!(task_id, attempt, "attach incomplete, retrying");
                            Err(backoff::Error::transient(EngineError::AgentTimeout))
                        }
                    }
                    Err(e) => {
                        if attempt >= max_attempts {
                            Err(backoff::Error::permanent(e))
                        } else {
                            warn!(task_id, attempt, error = %e, "attach failed, retrying");
                            Err(backoff::Error::transient(e))
                        }
                    }
                }
            }
        })
        .await;

        outcome
    }

    async fn add_container(&self, host: &Host, container: &ContainerMeta) -> Result<()> {
        self.inner.add_container(host, container).await
    }
}

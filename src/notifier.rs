//! Notifier: per-task log append, build-stream broadcast, and terminal
//! status publish. Bound to one task id at construction.

use std::sync::Arc;

use futures::Stream;
use futures_util::StreamExt;

use crate::broker::{keys, Broker};
use crate::error::Result;

pub const BUILD_FINISH_MARKER: &str = "build-finish";

pub struct TaskNotifier {
    broker: Arc<Broker>,
    task_id: String,
}

impl TaskNotifier {
    pub fn new(broker: Arc<Broker>, task_id: impl Into<String>) -> Self {
        Self {
            broker,
            task_id: task_id.into(),
        }
    }

    pub fn result_key(&self) -> String {
        keys::task_result(&self.task_id)
    }

    pub fn log_key(&self) -> String {
        keys::task_log(&self.task_id)
    }

    pub fn publish_key(&self) -> String {
        keys::task_pub(&self.task_id)
    }

    pub async fn pub_success(&self) -> Result<()> {
        self.broker.publish(&self.result_key(), "SUCCESS").await
    }

    pub async fn pub_fail(&self, reason: &str) -> Result<()> {
        self.broker
            .publish(&self.result_key(), &format!("FAILED|{reason}"))
            .await
    }

    pub async fn pub_build_finish(&self) -> Result<()> {
        self.broker.publish(&self.publish_key(), BUILD_FINISH_MARKER).await
    }

    /// Drains a lazy log-line stream, right-pushing and publishing each
    /// line as it arrives, returning the last line seen (empty string if
    /// the stream produced nothing). This is the single place a Docker log
    /// stream is consumed — one line stored and forwarded before the next
    /// is read, so back-pressure is whatever the producer allows.
    pub async fn store_and_broadcast(
        &self,
        mut lines: impl Stream<Item = Result<String>> + Unpin,
    ) -> Result<String> {
        let mut last = String::new();
        while let Some(line) = lines.next().await {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            self.broker.rpush(&self.log_key(), &line).await?;
            self.broker.publish(&self.publish_key(), &line).await?;
            last = line;
        }
        Ok(last)
    }
}

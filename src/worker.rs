//! Worker pool: a bounded-concurrency dequeue loop driving `engine::run`.
//!
//! Tasks targeting different hosts run in parallel; tasks targeting the
//! same host may also run in parallel — mutual exclusion lives entirely in
//! the Ledger/IP Pool transactions, not here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::broker::keys;
use crate::engine::{self, EngineContext};
use crate::error::Result;

pub struct WorkerPool {
    ctx: Arc<EngineContext>,
    concurrency: usize,
    dequeue_timeout_secs: u64,
}

impl WorkerPool {
    pub fn new(ctx: Arc<EngineContext>, concurrency: usize, dequeue_timeout_secs: u64) -> Self {
        Self {
            ctx,
            concurrency,
            dequeue_timeout_secs,
        }
    }

    /// Runs the dequeue loop until `shutdown` is cancelled. In-flight tasks
    /// are allowed to finish (tasks are non-cancellable once started);
    /// only new dequeues stop.
    pub async fn run(&self, shutdown: CancellationToken) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        info!(concurrency = self.concurrency, "worker pool starting");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("worker pool shutting down, waiting for in-flight tasks");
                    let _ = semaphore.acquire_many(self.concurrency as u32).await;
                    break;
                }
                popped = self.ctx.broker.blpop(keys::task_queue(), self.dequeue_timeout_secs) => {
                    match popped {
                        Ok(Some((_, task_id))) => {
                            self.dispatch(Arc::clone(&semaphore), task_id).await;
                        }
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(error = %e, "dequeue failed, backing off");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(&self, semaphore: Arc<Semaphore>, task_id: String) {
        let permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let ctx = Arc::clone(&self.ctx);

        tokio::spawn(async move {
            let _permit = permit;
            match run_one(&ctx, &task_id).await {
                Ok(()) => info!(task_id, "task completed"),
                Err(e) => error!(task_id, error = %e, "task failed with an unrecoverable error"),
            }
        });
    }
}

async fn run_one(ctx: &EngineContext, task_id: &str) -> Result<()> {
    let Some(task) = ctx.store.get_task(task_id).await? else {
        warn!(task_id, "dequeued task id not found in store");
        return Ok(());
    };
    engine::run(ctx, task).await
}

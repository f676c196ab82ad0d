use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::model::{Task, TaskStatus};
use crate::notifier::TaskNotifier;

use super::EngineContext;

#[derive(Deserialize)]
struct RemoveProps {
    cids: Vec<String>,
    #[serde(default)]
    rmi: bool,
}

pub async fn run_remove_task(ctx: &EngineContext, task: Task) -> Result<()> {
    let notifier = TaskNotifier::new(ctx.broker.clone(), task.id.clone());

    match run_remove_steps(ctx, &task).await {
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

async fn run_remove_steps(ctx: &EngineContext, task: &Task) -> Result<()> {
    let props: RemoveProps = serde_json::from_value(task.props.clone())
        .map_err(|e| EngineError::Internal(format!("invalid remove props: {e}")))?;

    let host = ctx.store.get_host(task.host_id).await?;

    // 1. do-not-report flags
    for cid in &props.cids {
        ctx.broker
            .hset(&crate::broker::keys::agent_container_flag(cid), "flag", "1")
            .await?;
    }

    // 2. deregister backends, collecting appnames
    let mut appnames = BTreeSet::new();
    for cid in &props.cids {
        if let Some(container) = ctx.store.get_container(cid).await? {
            let appname = container.appname().to_string();
            for port in ctx.store.ports_for_container(container.id).await? {
                let backend = format!("{}:{}", host.address, port.port);
                ctx.discovery
                    .deregister(&appname, &container.entrypoint, &backend)
                    .await?;
            }
            appnames.insert(appname);
        }
    }

    // 3. publish discovery for every collected appname
    let appnames: Vec<String> = appnames.into_iter().collect();
    ctx.discovery.publish_for_appnames(&appnames).await?;

    // 4. let the agent observe the flags and stop reporting
    tokio::time::sleep(Duration::from_secs(3)).await;

    // 5. batched remove, logging and continuing on failure
    ctx.docker.remove_host_containers(&host.address, &props.cids).await;

    // 6. best-effort image removal
    if props.rmi {
        let version = ctx.store.get_version(task.version_id).await?;
        let app = ctx.store.get_app(task.app_id).await?;
        let image_tag = format!("{}:{}", app.name, version.short_sha());
        if let Err(e) = ctx.docker.remove_image(&host.address, &image_tag).await {
            warn!(task_id = %task.id, error = %e, "best-effort image removal failed");
        }
    }

    // 8. delete Container rows (releases cores/ports), clear meta + flags
    for cid in &props.cids {
        ctx.store.delete_container(cid).await?;
        ctx.broker
            .hdel(&crate::broker::keys::agent_containers_meta(&host.address), cid)
            .await?;
        ctx.broker.delete(&crate::broker::keys::agent_container_flag(cid)).await?;
    }

    ctx.store.finish(&task.id, TaskStatus::Success, "ok").await?;
    let notifier = TaskNotifier::new(ctx.broker.clone(), task.id.clone());
    notifier.pub_success().await?;

    // 9. deregister monitoring alarms if the version has zero containers left
    let remaining = ctx.store.count_containers_for_version(task.version_id).await?;
    if remaining == 0 {
        ctx.monitoring.deregister_alarms(task.version_id).await;
    }

    Ok(())
}

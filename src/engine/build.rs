use serde::Deserialize;
use tracing::warn;

use crate::error::Result;
use crate::model::{Task, TaskStatus};
use crate::notifier::TaskNotifier;

use super::EngineContext;

#[derive(Deserialize)]
struct BuildProps {
    base: String,
}

const SUCCESS_SUBSTRING: &str = "Digest: sha256";
const FAIL_REASON: &str = "failed to push image to image hub";

pub async fn run_build_task(ctx: &EngineContext, task: Task) -> Result<()> {
    let notifier = TaskNotifier::new(ctx.broker.clone(), task.id.clone());

    // Rust has no try/finally; the build-finish marker must still publish
    // on every exit path, so the body's outcome is captured and the marker
    // is sent unconditionally afterward rather than interleaved with early
    // returns.
    let outcome = run_build_steps(ctx, &task, &notifier).await;

    if let Err(e) = &outcome {
        ctx.store
            .finish(&task.id, TaskStatus::Failed, &e.to_string())
            .await?;
        notifier.pub_fail(&e.to_string()).await?;
    }

    notifier.pub_build_finish().await?;
    outcome
}

async fn run_build_steps(
    ctx: &EngineContext,
    task: &Task,
    notifier: &TaskNotifier,
) -> Result<()> {
    let props: BuildProps = serde_json::from_value(task.props.clone())
        .map_err(|e| crate::error::EngineError::Internal(format!("invalid build props: {e}")))?;

    let host = ctx.store.get_host(task.host_id).await?;
    let version = ctx.store.get_version(task.version_id).await?;
    let app = ctx.store.get_app(task.app_id).await?;

    let (repo, tag) = props
        .base
        .split_once(':')
        .unwrap_or((props.base.as_str(), "latest"));
    let pull_stream = ctx.docker.pull_image(&host.address, repo, tag)?;
    notifier.store_and_broadcast(pull_stream).await?;

    let image_tag = format!("{}:{}", app.name, version.short_sha());
    let build_stream = ctx.docker.build_image(&host.address, &image_tag, Vec::new())?;
    notifier.store_and_broadcast(build_stream).await?;

    let image_url = format!("{}/{}:{}", ctx.registry_url, app.name, version.short_sha());
    let push_stream = ctx.docker.push_image(&host.address, &image_tag, version.short_sha())?;
    let last_line = notifier.store_and_broadcast(push_stream).await?;

    if let Err(e) = ctx.docker.remove_image(&host.address, &image_tag).await {
        warn!(task_id = %task.id, error = %e, "best-effort local image removal failed");
    }

    if last_line.contains(SUCCESS_SUBSTRING) {
        ctx.store
            .create_image(app.id, version.id, &image_url)
            .await?;
        ctx.store.finish(&task.id, TaskStatus::Success, "ok").await?;
        notifier.pub_success().await?;
        Ok(())
    } else {
        ctx.store
            .finish(&task.id, TaskStatus::Failed, FAIL_REASON)
            .await?;
        notifier.pub_fail(FAIL_REASON).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_success_substring_detection() {
        let line = "abc Digest: sha256:deadbeef";
        assert!(line.contains(super::SUCCESS_SUBSTRING));
        let bad = "error pushing";
        assert!(!bad.contains(super::SUCCESS_SUBSTRING));
    }
}

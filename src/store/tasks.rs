//! Task Record Store: a single terminal transition PENDING → SUCCESS|FAILED.

use rusqlite::{params, OptionalExtension};
use tracing::warn;

use crate::error::Result;
use crate::model::{Task, TaskKind, TaskStatus};

use super::Store;

fn status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "PENDING",
        TaskStatus::Success => "SUCCESS",
        TaskStatus::Failed => "FAILED",
    }
}

fn parse_status(s: &str) -> TaskStatus {
    match s {
        "SUCCESS" => TaskStatus::Success,
        "FAILED" => TaskStatus::Failed,
        _ => TaskStatus::Pending,
    }
}

fn kind_str(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Build => "build",
        TaskKind::CreateWithMacvlan => "create_with_macvlan",
        TaskKind::Remove => "remove",
    }
}

fn parse_kind(s: &str) -> TaskKind {
    match s {
        "build" => TaskKind::Build,
        "remove" => TaskKind::Remove,
        _ => TaskKind::CreateWithMacvlan,
    }
}

/// Generates a fresh task id. Task creation itself is driven by the
/// out-of-scope API layer, but it shares this crate's store and needs a
/// collision-resistant id scheme — UUIDv4 is generated here so every
/// caller gets the same guarantee the feedback-queue-leak Open Question
/// relies on (task ids unique enough that two tasks never share a
/// feedback key).
pub fn new_task_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Store {
    pub async fn create_task(
        &self,
        id: &str,
        host_id: i64,
        version_id: i64,
        app_id: i64,
        kind: TaskKind,
        props: serde_json::Value,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO task (id, host_id, version_id, app_id, kind, props, status, reason, container_ids)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'PENDING', '', '[]')",
            params![
                id,
                host_id,
                version_id,
                app_id,
                kind_str(kind),
                props.to_string()
            ],
        )?;
        Ok(())
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, host_id, version_id, app_id, kind, props, status, container_ids, reason
             FROM task WHERE id = ?1",
            params![id],
            |row| {
                let props_raw: String = row.get(5)?;
                let container_ids_raw: String = row.get(7)?;
                Ok(Task {
                    id: row.get(0)?,
                    host_id: row.get(1)?,
                    version_id: row.get(2)?,
                    app_id: row.get(3)?,
                    kind: parse_kind(&row.get::<_, String>(4)?),
                    props: serde_json::from_str(&props_raw).unwrap_or(serde_json::Value::Null),
                    status: parse_status(&row.get::<_, String>(6)?),
                    container_ids: serde_json::from_str(&container_ids_raw).unwrap_or_default(),
                    reason: row.get(8)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    /// Idempotent: a repeat call with the same terminal status is a no-op.
    /// A conflicting status is logged, not thrown — matching the Task
    /// Record Store's documented policy.
    pub async fn finish(&self, id: &str, status: TaskStatus, reason: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM task WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match current.as_deref().map(parse_status) {
            Some(existing) if existing == status => return Ok(()),
            Some(existing) if existing.is_terminal() => {
                warn!(
                    task_id = id,
                    ?existing,
                    attempted = ?status,
                    "task.finish called with conflicting terminal status"
                );
                return Ok(());
            }
            _ => {}
        }

        conn.execute(
            "UPDATE task SET status = ?1, reason = ?2 WHERE id = ?3",
            params![status_str(status), reason, id],
        )?;
        Ok(())
    }

    /// Appends a container id to the task's list; only valid while PENDING.
    pub async fn append_container_id(&self, id: &str, container_id: &str) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let (status, existing): (String, String) = tx.query_row(
            "SELECT status, container_ids FROM task WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if status != "PENDING" {
            warn!(task_id = id, "append_container_id on non-PENDING task ignored");
            return Ok(());
        }
        let mut ids: Vec<String> = serde_json::from_str(&existing).unwrap_or_default();
        ids.push(container_id.to_string());
        tx.execute(
            "UPDATE task SET container_ids = ?1 WHERE id = ?2",
            params![serde_json::to_string(&ids).unwrap(), id],
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.init_tables().await.unwrap();
        store
            .create_task("t1", 1, 1, 1, TaskKind::Build, serde_json::json!({}))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_finish_idempotent_same_status() {
        let store = seeded_store().await;
        store.finish("t1", TaskStatus::Success, "ok").await.unwrap();
        store.finish("t1", TaskStatus::Success, "ok").await.unwrap();
        let task = store.get_task("t1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Success);
        assert_eq!(task.reason, "ok");
    }

    #[tokio::test]
    async fn test_finish_conflicting_status_is_logged_not_thrown() {
        let store = seeded_store().await;
        store.finish("t1", TaskStatus::Success, "ok").await.unwrap();
        // should not error, and the original terminal status sticks
        store
            .finish("t1", TaskStatus::Failed, "too late")
            .await
            .unwrap();
        let task = store.get_task("t1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn test_append_container_id_only_while_pending() {
        let store = seeded_store().await;
        store.append_container_id("t1", "cid-1").await.unwrap();
        store.finish("t1", TaskStatus::Success, "ok").await.unwrap();
        store.append_container_id("t1", "cid-2").await.unwrap();
        let task = store.get_task("t1").await.unwrap().unwrap();
        assert_eq!(task.container_ids, vec!["cid-1".to_string()]);
    }
}

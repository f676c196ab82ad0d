//! Container CRUD. Creation and deletion maintain `host.count` and release
//! the container's owned Core/Port rows, mirroring
//! `Container.create`/`Container.delete` from the original model layer.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::error::{EngineError, Result};
use crate::model::{Container, Core, Port};

use super::Store;

fn row_to_container(row: &rusqlite::Row) -> rusqlite::Result<Container> {
    let created_at_raw: String = row.get(7)?;
    Ok(Container {
        id: row.get(0)?,
        container_id: row.get(1)?,
        host_id: row.get(2)?,
        version_id: row.get(3)?,
        app_id: row.get(4)?,
        name: row.get(5)?,
        entrypoint: row.get(6)?,
        created_at: created_at_raw
            .parse()
            .unwrap_or_else(|_| Utc::now()),
        is_alive: row.get::<_, i64>(8)? != 0,
    })
}

const CONTAINER_COLUMNS: &str =
    "id, container_id, host_id, version_id, app_id, name, entrypoint, created_at, is_alive";

impl Store {
    /// Persists a newly created, already-attached container and takes
    /// ownership of its reserved cores and ports. Increments `host.count`.
    pub async fn create_container(
        &self,
        container_id: &str,
        host_id: i64,
        version_id: i64,
        app_id: i64,
        name: &str,
        entrypoint: &str,
        cores: &[Core],
        ports: &[Port],
    ) -> Result<Container> {
        let row_id = {
            let mut conn = self.conn.lock().await;
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO container (container_id, host_id, version_id, app_id, name, entrypoint, created_at, is_alive)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
                params![
                    container_id,
                    host_id,
                    version_id,
                    app_id,
                    name,
                    entrypoint,
                    Utc::now().to_rfc3339()
                ],
            )?;
            let row_id = tx.last_insert_rowid();
            for core in cores {
                tx.execute(
                    "UPDATE core SET used = 1, container_id = ?1 WHERE id = ?2",
                    params![row_id, core.id],
                )?;
            }
            for port in ports {
                tx.execute(
                    "UPDATE port SET used = 1, container_id = ?1 WHERE id = ?2",
                    params![row_id, port.id],
                )?;
            }
            tx.commit()?;
            row_id
        };
        self.increment_host_count(host_id, 1).await?;
        self.get_container_by_row_id(row_id).await
    }

    pub async fn get_container(&self, container_id: &str) -> Result<Option<Container>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("SELECT {CONTAINER_COLUMNS} FROM container WHERE container_id = ?1"),
            params![container_id],
            row_to_container,
        )
        .optional()
        .map_err(Into::into)
    }

    async fn get_container_by_row_id(&self, row_id: i64) -> Result<Container> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("SELECT {CONTAINER_COLUMNS} FROM container WHERE id = ?1"),
            params![row_id],
            row_to_container,
        )
        .optional()?
        .ok_or_else(|| EngineError::NotFound(format!("container row {row_id}")))
    }

    /// Deletes the Container row, releasing all resources it owned and
    /// decrementing `host.count`. Returns `None` if the container was
    /// already gone (idempotent, for retried remove tasks).
    pub async fn delete_container(&self, container_id: &str) -> Result<Option<Container>> {
        let Some(container) = self.get_container(container_id).await? else {
            return Ok(None);
        };
        {
            let mut conn = self.conn.lock().await;
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE core SET used = 0, container_id = NULL WHERE container_id = ?1",
                params![container.id],
            )?;
            tx.execute(
                "UPDATE port SET used = 0, container_id = NULL WHERE container_id = ?1",
                params![container.id],
            )?;
            tx.execute(
                "DELETE FROM container WHERE id = ?1",
                params![container.id],
            )?;
            tx.commit()?;
        }
        self.increment_host_count(container.host_id, -1).await?;
        Ok(Some(container))
    }

    /// Count of live containers still referencing a version, used to decide
    /// whether to deregister monitoring alarms after a remove task.
    pub async fn count_containers_for_version(&self, version_id: i64) -> Result<i64> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT COUNT(*) FROM container WHERE version_id = ?1",
            params![version_id],
            |row| row.get(0),
        )
        .map_err(Into::into)
    }
}

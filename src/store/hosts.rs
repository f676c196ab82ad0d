//! Host CRUD — admin-managed, with `core_count`/`count` maintained by the
//! engine as containers and cores come and go.

use rusqlite::{params, OptionalExtension};

use crate::error::{EngineError, Result};
use crate::model::Host;

use super::Store;

fn row_to_host(row: &rusqlite::Row) -> rusqlite::Result<Host> {
    Ok(Host {
        id: row.get(0)?,
        address: row.get(1)?,
        name: row.get(2)?,
        uid: row.get(3)?,
        core_count: row.get(4)?,
        memory: row.get(5)?,
        pod: row.get(6)?,
        count: row.get(7)?,
    })
}

const HOST_COLUMNS: &str = "id, address, name, uid, core_count, memory, pod, count";

impl Store {
    pub async fn get_host(&self, id: i64) -> Result<Host> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("SELECT {HOST_COLUMNS} FROM host WHERE id = ?1"),
            params![id],
            row_to_host,
        )
        .optional()?
        .ok_or_else(|| EngineError::NotFound(format!("host {id}")))
    }

    /// Creates a host together with `core_count` Core rows labelled "0".."N-1".
    pub async fn create_host(
        &self,
        address: &str,
        name: &str,
        uid: i64,
        core_count: i64,
        memory: i64,
        pod: &str,
    ) -> Result<i64> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO host (address, name, uid, core_count, memory, pod, count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![address, name, uid, core_count, memory, pod],
        )?;
        let host_id = tx.last_insert_rowid();
        for i in 0..core_count {
            tx.execute(
                "INSERT INTO core (host_id, label, used) VALUES (?1, ?2, 0)",
                params![host_id, i.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(host_id)
    }

    pub(crate) async fn increment_host_count(&self, host_id: i64, delta: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE host SET count = count + ?1 WHERE id = ?2",
            params![delta, host_id],
        )?;
        Ok(())
    }
}

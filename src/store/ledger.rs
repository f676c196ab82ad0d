//! Resource Ledger: per-host CPU-core and port pools with reserve/release.
//!
//! `release_cores`/`release_ports` are idempotent — releasing an
//! already-free resource is a no-op, never an error, so the engine's
//! partial-failure unwinding can call them unconditionally.

use rusqlite::{params, OptionalExtension};

use crate::error::Result;
use crate::model::{Core, Port};

use super::Store;

impl Store {
    pub async fn occupy_cores(&self, cores: &[Core], container_id: i64) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        for core in cores {
            tx.execute(
                "UPDATE core SET used = 1, container_id = ?1 WHERE id = ?2",
                params![container_id, core.id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Releases cores back to the pool. `nshare` carries the partial-share
    /// count being relinquished; it does not change the stored row (a core
    /// is binary used/free at the ledger level) but is accepted so callers
    /// releasing a part-core reservation don't need a separate method.
    pub async fn release_cores(&self, cores: &[Core], _nshare: u32) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        for core in cores {
            tx.execute(
                "UPDATE core SET used = 0, container_id = NULL WHERE id = ?1",
                params![core.id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub async fn occupy_ports(&self, ports: &[Port], container_id: i64) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        for port in ports {
            tx.execute(
                "UPDATE port SET used = 1, container_id = ?1 WHERE id = ?2",
                params![container_id, port.id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub async fn release_ports(&self, ports: &[Port]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        for port in ports {
            tx.execute(
                "UPDATE port SET used = 0, container_id = NULL WHERE id = ?1",
                params![port.id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub async fn free_cores(&self, host_id: i64) -> Result<Vec<Core>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, host_id, label, used, container_id FROM core WHERE host_id = ?1 AND used = 0",
        )?;
        let rows = stmt
            .query_map(params![host_id], |row| {
                Ok(Core {
                    id: row.get(0)?,
                    host_id: row.get(1)?,
                    label: row.get(2)?,
                    used: row.get::<_, i64>(3)? != 0,
                    container_id: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn free_ports(&self, host_id: i64, limit: u32) -> Result<Vec<Port>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, host_id, port, used, container_id FROM port WHERE host_id = ?1 AND used = 0 LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![host_id, limit], |row| {
                Ok(Port {
                    id: row.get(0)?,
                    host_id: row.get(1)?,
                    port: row.get(2)?,
                    used: row.get::<_, i64>(3)? != 0,
                    container_id: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn cores_by_ids(&self, ids: &[i64]) -> Result<Vec<Core>> {
        let conn = self.conn.lock().await;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let core = conn.query_row(
                "SELECT id, host_id, label, used, container_id FROM core WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Core {
                        id: row.get(0)?,
                        host_id: row.get(1)?,
                        label: row.get(2)?,
                        used: row.get::<_, i64>(3)? != 0,
                        container_id: row.get(4)?,
                    })
                },
            )?;
            out.push(core);
        }
        Ok(out)
    }

    pub async fn ports_by_ids(&self, ids: &[i64]) -> Result<Vec<Port>> {
        let conn = self.conn.lock().await;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let port = conn.query_row(
                "SELECT id, host_id, port, used, container_id FROM port WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Port {
                        id: row.get(0)?,
                        host_id: row.get(1)?,
                        port: row.get(2)?,
                        used: row.get::<_, i64>(3)? != 0,
                        container_id: row.get(4)?,
                    })
                },
            )?;
            out.push(port);
        }
        Ok(out)
    }

    /// Ports currently owned by the given container row, used to recover the
    /// `host:port` backends a container registered with service discovery
    /// (the Container row itself carries no backend list).
    pub async fn ports_for_container(&self, container_row_id: i64) -> Result<Vec<Port>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, host_id, port, used, container_id FROM port WHERE container_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![container_row_id], |row| {
                Ok(Port {
                    id: row.get(0)?,
                    host_id: row.get(1)?,
                    port: row.get(2)?,
                    used: row.get::<_, i64>(3)? != 0,
                    container_id: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    #[allow(dead_code)]
    async fn core_by_id(&self, id: i64) -> Result<Option<Core>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, host_id, label, used, container_id FROM core WHERE id = ?1",
            params![id],
            |row| {
                Ok(Core {
                    id: row.get(0)?,
                    host_id: row.get(1)?,
                    label: row.get(2)?,
                    used: row.get::<_, i64>(3)? != 0,
                    container_id: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.init_tables().await.unwrap();
        let conn = store.conn.lock().await;
        conn.execute(
            "INSERT INTO host (id, address, name, uid, core_count, memory, pod, count) VALUES (1, 'h:1', 'h', 0, 4, 1024, 'p', 0)",
            [],
        )
        .unwrap();
        for i in 0..4 {
            conn.execute(
                "INSERT INTO core (host_id, label, used) VALUES (1, ?1, 0)",
                params![i.to_string()],
            )
            .unwrap();
        }
        drop(conn);
        store
    }

    #[tokio::test]
    async fn test_occupy_and_release_cores_idempotent() {
        let store = seeded_store().await;
        let free = store.free_cores(1).await.unwrap();
        assert_eq!(free.len(), 4);

        store.occupy_cores(&free[0..2], 99).await.unwrap();
        let free = store.free_cores(1).await.unwrap();
        assert_eq!(free.len(), 2);

        // releasing already-free cores is a no-op, not an error
        store.release_cores(&free, 0).await.unwrap();
        store.release_cores(&free, 0).await.unwrap();
        let free_again = store.free_cores(1).await.unwrap();
        assert_eq!(free_again.len(), 2);
    }
}

//! IP Pool Manager: per-network IP allocator, serialized per network via
//! `BEGIN IMMEDIATE` so two concurrent create-tasks can never double-assign
//! the same address.

use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::error::Result;
use crate::model::Ip;

use super::Store;

fn row_to_ip(row: &rusqlite::Row) -> rusqlite::Result<Ip> {
    Ok(Ip {
        id: row.get(0)?,
        network_id: row.get(1)?,
        address: row.get(2)?,
        vlan_seq_id: row.get(3)?,
        container_id: row.get(4)?,
        vethname: row.get(5)?,
    })
}

const IP_COLUMNS: &str =
    "id, network_id, address, vlan_seq_id, container_id, vethname";

impl Store {
    /// Returns any unassigned IP on the network, or `None` if the pool is
    /// exhausted.
    pub async fn acquire_ip(&self, network_id: i64) -> Result<Option<Ip>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let candidate: Option<i64> = tx
            .query_row(
                "SELECT id FROM ip WHERE network_id = ?1 AND container_id IS NULL LIMIT 1",
                params![network_id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = candidate else {
            tx.commit()?;
            return Ok(None);
        };

        // mark as provisionally claimed; final ownership is set by
        // `assigned_to_container` once the agent confirms attach
        tx.execute(
            "UPDATE ip SET container_id = -1 WHERE id = ?1",
            params![id],
        )?;
        let ip = tx.query_row(
            &format!("SELECT {IP_COLUMNS} FROM ip WHERE id = ?1"),
            params![id],
            row_to_ip,
        )?;
        tx.commit()?;
        Ok(Some(ip))
    }

    /// Idempotent acquisition of a named address: `None` if it is already
    /// taken by someone else (not an error).
    pub async fn acquire_specific_ip(
        &self,
        network_id: i64,
        address: &str,
    ) -> Result<Option<Ip>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let row: Option<(i64, Option<i64>)> = tx
            .query_row(
                "SELECT id, container_id FROM ip WHERE network_id = ?1 AND address = ?2",
                params![network_id, address],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((id, owner)) = row else {
            tx.commit()?;
            return Ok(None);
        };
        if owner.is_some() {
            tx.commit()?;
            return Ok(None);
        }

        tx.execute(
            "UPDATE ip SET container_id = -1 WHERE id = ?1",
            params![id],
        )?;
        let ip = tx.query_row(
            &format!("SELECT {IP_COLUMNS} FROM ip WHERE id = ?1"),
            params![id],
            row_to_ip,
        )?;
        tx.commit()?;
        Ok(Some(ip))
    }

    /// Clears assignment and vethname, returning the IP to the pool.
    pub async fn release(&self, ip: &Ip) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE ip SET container_id = NULL, vethname = NULL WHERE id = ?1",
            params![ip.id],
        )?;
        Ok(())
    }

    /// Finalizes ownership after a successful attach.
    pub async fn assigned_to_container(
        &self,
        ip: &Ip,
        container_id: i64,
        vethname: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE ip SET container_id = ?1, vethname = ?2 WHERE id = ?3",
            params![container_id, vethname, ip.id],
        )?;
        Ok(())
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
            "INSERT INTO network (id, cidr, vlan_seq_id) VALUES (1, '10.0.0.0/24', 7)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO ip (network_id, address, vlan_seq_id) VALUES (1, '10.0.0.5', 7)",
            [],
        )
        .unwrap();
        drop(conn);
        store
    }

    #[tokio::test]
    async fn test_acquire_specific_ip_collision() {
        let store = seeded_store().await;
        let first = store.acquire_specific_ip(1, "10.0.0.5").await.unwrap();
        assert!(first.is_some());
        let second = store.acquire_specific_ip(1, "10.0.0.5").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_acquire_then_release_round_trip() {
        let store = seeded_store().await;
        let ip = store.acquire_specific_ip(1, "10.0.0.5").await.unwrap().unwrap();
        store.assigned_to_container(&ip, 42, "veth0").await.unwrap();
        store.release(&ip).await.unwrap();
        // now acquirable again
        let reacquired = store.acquire_specific_ip(1, "10.0.0.5").await.unwrap();
        assert!(reacquired.is_some());
    }
}

//! Relational store: one SQLite connection behind a mutex, WAL mode, with
//! one sub-module per entity family. Every mutation goes through this single
//! connection wrapped in `BEGIN IMMEDIATE` transactions where more than one
//! row is touched, standing in for the `SELECT … FOR UPDATE` row-level locks
//! a multi-writer relational store would use.

pub mod apps;
pub mod containers;
pub mod hosts;
pub mod ip_pool;
pub mod ledger;
pub mod tasks;

use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::error::Result;

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates every table this crate mutates and switches on WAL mode.
    /// Safe to call repeatedly (`IF NOT EXISTS`).
    pub async fn init_tables(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS app (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                repo_url TEXT NOT NULL,
                owner_id INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS version (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_id INTEGER NOT NULL REFERENCES app(id),
                sha TEXT NOT NULL,
                UNIQUE(app_id, sha)
            );

            CREATE TABLE IF NOT EXISTS image (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_id INTEGER NOT NULL REFERENCES app(id),
                version_id INTEGER NOT NULL REFERENCES version(id),
                url TEXT NOT NULL,
                UNIQUE(app_id, version_id)
            );

            CREATE TABLE IF NOT EXISTS host (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                address TEXT NOT NULL,
                name TEXT NOT NULL,
                uid INTEGER NOT NULL,
                core_count INTEGER NOT NULL,
                memory INTEGER NOT NULL,
                pod TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS core (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                host_id INTEGER NOT NULL REFERENCES host(id),
                label TEXT NOT NULL,
                used INTEGER NOT NULL DEFAULT 0,
                container_id INTEGER,
                UNIQUE(host_id, label)
            );

            CREATE TABLE IF NOT EXISTS port (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                host_id INTEGER NOT NULL REFERENCES host(id),
                port INTEGER NOT NULL,
                used INTEGER NOT NULL DEFAULT 0,
                container_id INTEGER,
                UNIQUE(host_id, port)
            );

            CREATE TABLE IF NOT EXISTS network (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cidr TEXT NOT NULL,
                vlan_seq_id INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ip (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network_id INTEGER NOT NULL REFERENCES network(id),
                address TEXT NOT NULL,
                vlan_seq_id INTEGER NOT NULL,
                container_id INTEGER,
                vethname TEXT,
                UNIQUE(network_id, address)
            );

            CREATE TABLE IF NOT EXISTS container (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                container_id TEXT NOT NULL UNIQUE,
                host_id INTEGER NOT NULL REFERENCES host(id),
                version_id INTEGER NOT NULL REFERENCES version(id),
                app_id INTEGER NOT NULL REFERENCES app(id),
                name TEXT NOT NULL,
                entrypoint TEXT NOT NULL,
                created_at TEXT NOT NULL,
                is_alive INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS task (
                id TEXT PRIMARY KEY,
                host_id INTEGER NOT NULL,
                version_id INTEGER NOT NULL,
                app_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                props TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                reason TEXT NOT NULL DEFAULT '',
                container_ids TEXT NOT NULL DEFAULT '[]'
            );
            "#,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        store.init_tables().await.unwrap();
    }
}

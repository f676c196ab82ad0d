//! App/Version/Image registration — created on first registration / on
//! successful push, per spec §3's lifecycle column.

use rusqlite::{params, OptionalExtension};

use crate::error::{EngineError, Result};
use crate::model::{App, Image, Version};

use super::Store;

impl Store {
    pub async fn get_or_create_app(&self, name: &str, repo_url: &str, owner_id: i64) -> Result<App> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let existing: Option<(i64, String, i64)> = tx
            .query_row(
                "SELECT id, repo_url, owner_id FROM app WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let app = if let Some((id, repo_url, owner_id)) = existing {
            App {
                id,
                name: name.to_string(),
                repo_url,
                owner_id,
            }
        } else {
            tx.execute(
                "INSERT INTO app (name, repo_url, owner_id) VALUES (?1, ?2, ?3)",
                params![name, repo_url, owner_id],
            )?;
            App {
                id: tx.last_insert_rowid(),
                name: name.to_string(),
                repo_url: repo_url.to_string(),
                owner_id,
            }
        };
        tx.commit()?;
        Ok(app)
    }

    pub async fn get_or_create_version(&self, app_id: i64, sha: &str) -> Result<Version> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM version WHERE app_id = ?1 AND sha = ?2",
                params![app_id, sha],
                |row| row.get(0),
            )
            .optional()?;
        let id = if let Some(id) = existing {
            id
        } else {
            tx.execute(
                "INSERT INTO version (app_id, sha) VALUES (?1, ?2)",
                params![app_id, sha],
            )?;
            tx.last_insert_rowid()
        };
        tx.commit()?;
        Ok(Version {
            id,
            app_id,
            sha: sha.to_string(),
        })
    }

    pub async fn get_version(&self, id: i64) -> Result<Version> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, app_id, sha FROM version WHERE id = ?1",
            params![id],
            |row| {
                Ok(Version {
                    id: row.get(0)?,
                    app_id: row.get(1)?,
                    sha: row.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| EngineError::NotFound(format!("version {id}")))
    }

    pub async fn get_app(&self, id: i64) -> Result<App> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, name, repo_url, owner_id FROM app WHERE id = ?1",
            params![id],
            |row| {
                Ok(App {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    repo_url: row.get(2)?,
                    owner_id: row.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| EngineError::NotFound(format!("app {id}")))
    }

    /// Created by the build task on success; one row per (app, version).
    pub async fn create_image(&self, app_id: i64, version_id: i64, url: &str) -> Result<Image> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO image (app_id, version_id, url) VALUES (?1, ?2, ?3)",
            params![app_id, version_id, url],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Image {
            id,
            app_id,
            version_id,
            url: url.to_string(),
        })
    }
}

// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Device-local durable state, backed by a single SQLite file.
//!
//! Everything that must survive process suspension lives here: staged
//! receipt drafts, the per-user payment snapshot cache, the
//! acknowledgement marker and the claim audit log. All writes are single
//! statements (or one transaction), so two competing writers to the same
//! key resolve to last-completed-write-wins.

mod ack;
mod claim_audit;
mod drafts;
mod error;
mod payment_cache;

pub use claim_audit::ClaimAudit;
pub use error::DraftError;

use std::path::Path;

use anyhow::Context as _;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS receipt_drafts (
    draft_key TEXT PRIMARY KEY,
    file_name TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    bytes     BLOB NOT NULL,
    staged_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS payment_cache (
    owner      TEXT PRIMARY KEY,
    payment    TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS acknowledged_payments (
    owner      TEXT PRIMARY KEY,
    payment_id TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS claim_audit (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    owner       TEXT NOT NULL,
    amount      INTEGER NOT NULL,
    attempts    INTEGER NOT NULL,
    recorded_at TEXT NOT NULL
);
"#;

/// Handle over the local SQLite store. Cheap to clone, shares the pool.
#[derive(Clone, Debug)]
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    /// Opens (creating if necessary) the store at `path` and ensures the
    /// schema exists. WAL mode keeps staged drafts readable across an
    /// abrupt process suspension.
    pub async fn connect(path: &Path) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open local store at {}", path.display()))?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to initialize local store schema")?;

        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

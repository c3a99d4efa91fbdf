// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Audit rows for reward claims whose remote sync exhausted its retries.
//! The optimistic boost stays applied in that case; the audit row is what
//! a later reconciliation job works from.

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use rewards_model::{Amount, UserId};
use sqlx::Row as _;

use crate::LocalStore;

#[derive(Clone, Debug, PartialEq)]
pub struct ClaimAudit {
    pub owner: UserId,
    pub amount: Amount,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

impl LocalStore {
    pub async fn record_failed_claim(
        &self,
        owner: &UserId,
        amount: Amount,
        attempts: u32,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO claim_audit (owner, amount, attempts, recorded_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(owner.as_str())
        .bind(amount)
        .bind(attempts)
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .context("Failed to record claim audit entry")?;
        Ok(())
    }

    pub async fn failed_claims(&self, owner: &UserId) -> anyhow::Result<Vec<ClaimAudit>> {
        let rows = sqlx::query(
            "SELECT owner, amount, attempts, recorded_at FROM claim_audit
             WHERE owner = $1 ORDER BY id",
        )
        .bind(owner.as_str())
        .fetch_all(self.pool())
        .await
        .context("Failed to read claim audit entries")?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let owner: String = row.get("owner");
                ClaimAudit {
                    owner: UserId::new(owner),
                    amount: row.get("amount"),
                    attempts: row.get::<i64, _>("attempts") as u32,
                    recorded_at: row.get("recorded_at"),
                }
            })
            .collect())
    }
}

// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! One cached payment snapshot per user, stored as a JSON blob.
//!
//! The cache is what makes hydration instant after a cold start. Entries
//! are only ever superseded by a newer write for the same owner, never
//! evicted on a timer: a pending payment must stay visible until the
//! remote store says otherwise.

use anyhow::Context as _;
use chrono::Utc;
use rewards_model::{Payment, UserId};
use sqlx::Row as _;

use crate::LocalStore;

impl LocalStore {
    /// Writes the snapshot for `owner`, overwriting any previous entry.
    /// A payment belonging to a different owner is ignored: the cache is
    /// only valid for the session's user.
    pub async fn cache_payment(&self, owner: &UserId, payment: &Payment) -> anyhow::Result<()> {
        if payment.owner != *owner {
            tracing::warn!(
                owner = %owner,
                payment_owner = %payment.owner,
                payment_id = %payment.id,
                "Refusing to cache a payment for a different owner"
            );
            return Ok(());
        }

        let body = serde_json::to_string(payment).context("Failed to encode payment snapshot")?;
        sqlx::query(
            "INSERT OR REPLACE INTO payment_cache (owner, payment, updated_at) VALUES ($1, $2, $3)",
        )
        .bind(owner.as_str())
        .bind(body)
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .context("Failed to write payment cache")?;
        Ok(())
    }

    /// Reads the cached snapshot for `owner`. Storage or decode failures
    /// degrade to a cache miss.
    pub async fn cached_payment(&self, owner: &UserId) -> Option<Payment> {
        let row = match sqlx::query("SELECT payment FROM payment_cache WHERE owner = $1")
            .bind(owner.as_str())
            .fetch_optional(self.pool())
            .await
        {
            Ok(row) => row?,
            Err(err) => {
                tracing::warn!(error = %err, owner = %owner, "Failed to read payment cache");
                return None;
            }
        };

        let body: String = row.get("payment");
        match serde_json::from_str(&body) {
            Ok(payment) => Some(payment),
            Err(err) => {
                tracing::warn!(error = %err, owner = %owner, "Discarding undecodable payment cache entry");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rewards_model::{PaymentStatus, ReceiptStatus};
    use rewards_test_assets::{payment, TEST_USER};

    use super::*;

    #[test_log::test(tokio::test)]
    async fn cache_roundtrips_and_supersedes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::connect(&dir.path().join("store.db")).await.unwrap();
        let owner = UserId::new(TEST_USER);

        let first = payment("pay-1", PaymentStatus::Pending, ReceiptStatus::Uploading);
        store.cache_payment(&owner, &first).await.unwrap();
        assert_eq!(store.cached_payment(&owner).await.unwrap().id, first.id);

        let second = payment("pay-2", PaymentStatus::Pending, ReceiptStatus::Uploaded);
        store.cache_payment(&owner, &second).await.unwrap();
        assert_eq!(store.cached_payment(&owner).await.unwrap().id, second.id);
    }

    #[test_log::test(tokio::test)]
    async fn wrong_owner_write_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::connect(&dir.path().join("store.db")).await.unwrap();
        let someone_else = UserId::new("someone-else");

        let snapshot = payment("pay-1", PaymentStatus::Pending, ReceiptStatus::Uploading);
        store.cache_payment(&someone_else, &snapshot).await.unwrap();

        assert!(store.cached_payment(&someone_else).await.is_none());
    }

    #[test_log::test(tokio::test)]
    async fn cache_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let owner = UserId::new(TEST_USER);
        let snapshot = payment("pay-1", PaymentStatus::Rejected, ReceiptStatus::Uploaded);

        {
            let store = LocalStore::connect(&path).await.unwrap();
            store.cache_payment(&owner, &snapshot).await.unwrap();
        }

        let reopened = LocalStore::connect(&path).await.unwrap();
        let cached = reopened.cached_payment(&owner).await.unwrap();
        assert_eq!(cached.status, PaymentStatus::Rejected);
    }
}

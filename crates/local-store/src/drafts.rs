// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Staging area for receipt files that are not confirmed remotely yet.
//!
//! A draft is written the moment the user picks a file, keyed by the
//! owner until the remote payment record exists and re-keyed to the
//! payment id afterwards. `INSERT OR REPLACE` makes the last writer for a
//! key win atomically.

use chrono::{DateTime, Utc};
use rewards_model::{DraftKey, ReceiptDraft};
use sqlx::Row as _;

use crate::{DraftError, LocalStore};

impl LocalStore {
    /// Stages a draft under `key`, replacing any previous entry. This is
    /// the one local-store operation whose failure must abort the calling
    /// flow: if the bytes cannot be staged there is nothing to upload.
    pub async fn stage_draft(&self, key: &DraftKey, draft: &ReceiptDraft) -> Result<(), DraftError> {
        sqlx::query(
            "INSERT OR REPLACE INTO receipt_drafts (draft_key, file_name, mime_type, bytes, staged_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(key.storage_key())
        .bind(&draft.file_name)
        .bind(&draft.mime_type)
        .bind(&draft.bytes)
        .bind(draft.staged_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Reads a staged draft back. Read failures are logged and reported
    /// as absent: the caller's recovery is the same either way.
    pub async fn load_draft(&self, key: &DraftKey) -> Option<ReceiptDraft> {
        let row = match sqlx::query(
            "SELECT file_name, mime_type, bytes, staged_at FROM receipt_drafts WHERE draft_key = $1",
        )
        .bind(key.storage_key())
        .fetch_optional(self.pool())
        .await
        {
            Ok(row) => row?,
            Err(err) => {
                tracing::warn!(error = %err, key = %key, "Failed to load receipt draft");
                return None;
            }
        };

        let staged_at: DateTime<Utc> = row.get("staged_at");
        Some(ReceiptDraft {
            file_name: row.get("file_name"),
            mime_type: row.get("mime_type"),
            bytes: row.get("bytes"),
            staged_at,
        })
    }

    /// Drops a staged draft. Best effort: a failed delete only costs disk
    /// space, so it is logged and swallowed.
    pub async fn delete_draft(&self, key: &DraftKey) {
        if let Err(err) = sqlx::query("DELETE FROM receipt_drafts WHERE draft_key = $1")
            .bind(key.storage_key())
            .execute(self.pool())
            .await
        {
            tracing::warn!(error = %err, key = %key, "Failed to delete receipt draft");
        }
    }

    /// Moves a draft from its pre-payment key to the payment key in one
    /// transaction, so a retry after the remote record exists can find it.
    pub async fn rekey_draft(&self, from: &DraftKey, to: &DraftKey) -> Result<(), DraftError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM receipt_drafts WHERE draft_key = $1")
            .bind(to.storage_key())
            .execute(&mut *tx)
            .await?;

        let updated = sqlx::query("UPDATE receipt_drafts SET draft_key = $1 WHERE draft_key = $2")
            .bind(to.storage_key())
            .bind(from.storage_key())
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(DraftError::Missing(from.storage_key()));
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rewards_model::{PaymentId, UserId};
    use rewards_test_assets::{draft_bytes, TEST_USER};

    use super::*;

    async fn store(dir: &tempfile::TempDir) -> LocalStore {
        LocalStore::connect(&dir.path().join("store.db")).await.unwrap()
    }

    fn user_key() -> DraftKey {
        DraftKey::User(UserId::new(TEST_USER))
    }

    #[test_log::test(tokio::test)]
    async fn stage_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let draft = ReceiptDraft::new("receipt.png", "image/png", draft_bytes());

        store.stage_draft(&user_key(), &draft).await.unwrap();
        let loaded = store.load_draft(&user_key()).await.unwrap();

        assert_eq!(loaded.file_name, "receipt.png");
        assert_eq!(loaded.mime_type, "image/png");
        assert_eq!(loaded.bytes, draft.bytes);
    }

    #[test_log::test(tokio::test)]
    async fn last_writer_wins_for_a_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let first = ReceiptDraft::new("first.png", "image/png", vec![1, 2, 3]);
        let second = ReceiptDraft::new("second.jpg", "image/jpeg", vec![4, 5, 6]);
        store.stage_draft(&user_key(), &first).await.unwrap();
        store.stage_draft(&user_key(), &second).await.unwrap();

        let loaded = store.load_draft(&user_key()).await.unwrap();
        assert_eq!(loaded.file_name, "second.jpg");
        assert_eq!(loaded.bytes, vec![4, 5, 6]);
    }

    #[test_log::test(tokio::test)]
    async fn draft_survives_process_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let draft = ReceiptDraft::new("receipt.png", "image/png", draft_bytes());

        {
            let store = LocalStore::connect(&path).await.unwrap();
            store.stage_draft(&user_key(), &draft).await.unwrap();
            // pool dropped here: simulated suspension
        }

        let reopened = LocalStore::connect(&path).await.unwrap();
        let loaded = reopened.load_draft(&user_key()).await.unwrap();
        assert_eq!(loaded.bytes, draft.bytes);
    }

    #[test_log::test(tokio::test)]
    async fn delete_makes_draft_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let draft = ReceiptDraft::new("receipt.png", "image/png", vec![7]);

        store.stage_draft(&user_key(), &draft).await.unwrap();
        store.delete_draft(&user_key()).await;

        assert!(store.load_draft(&user_key()).await.is_none());
    }

    #[test_log::test(tokio::test)]
    async fn rekey_moves_draft_to_payment_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let draft = ReceiptDraft::new("receipt.png", "image/png", vec![9]);
        let payment_key = DraftKey::Payment(PaymentId::new("pay-1"));

        store.stage_draft(&user_key(), &draft).await.unwrap();
        store.rekey_draft(&user_key(), &payment_key).await.unwrap();

        assert!(store.load_draft(&user_key()).await.is_none());
        let moved = store.load_draft(&payment_key).await.unwrap();
        assert_eq!(moved.bytes, vec![9]);
    }

    #[test_log::test(tokio::test)]
    async fn rekey_without_source_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let payment_key = DraftKey::Payment(PaymentId::new("pay-1"));

        let err = store.rekey_draft(&user_key(), &payment_key).await.unwrap_err();
        assert!(matches!(err, DraftError::Missing(_)));
    }
}

// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Acknowledgement marker: the id of the last payment whose terminal
//! status the user has seen. A terminal payment whose id differs from the
//! marker is unacknowledged and must be surfaced, restarts included.

use anyhow::Context as _;
use rewards_model::{PaymentId, UserId};
use sqlx::Row as _;

use crate::LocalStore;

impl LocalStore {
    pub async fn acknowledged_payment(&self, owner: &UserId) -> Option<PaymentId> {
        let row = match sqlx::query("SELECT payment_id FROM acknowledged_payments WHERE owner = $1")
            .bind(owner.as_str())
            .fetch_optional(self.pool())
            .await
        {
            Ok(row) => row?,
            Err(err) => {
                tracing::warn!(error = %err, owner = %owner, "Failed to read acknowledgement marker");
                return None;
            }
        };

        let id: String = row.get("payment_id");
        Some(PaymentId::new(id))
    }

    /// Records that the terminal status of `payment` was shown. Replaying
    /// the same acknowledgement is a no-op by construction.
    pub async fn set_acknowledged(&self, owner: &UserId, payment: &PaymentId) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO acknowledged_payments (owner, payment_id) VALUES ($1, $2)",
        )
        .bind(owner.as_str())
        .bind(payment.as_str())
        .execute(self.pool())
        .await
        .context("Failed to persist acknowledgement marker")?;
        Ok(())
    }
}

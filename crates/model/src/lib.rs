// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Shared domain types for the payment reconciliation engine.
//!
//! Everything here is a plain record: the components that act on these
//! types (local store, uploader, synchronizer, ledger) live in their own
//! crates and only exchange values of these shapes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monetary value in minor units (cents). Signed so debit math stays
/// representable; balances themselves never go negative.
pub type Amount = i64;

/// Stable identifier of a signed-in user, issued by the identity provider.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque payment identifier, assigned by the remote store on creation.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Business outcome of a payment. Only the remote approval collaborator
/// writes the terminal variants; the client never mutates this field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
}

impl PaymentStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// Local-to-remote progress marker for the receipt transfer. Owned by the
/// client, orthogonal to [`PaymentStatus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Uploading,
    Uploaded,
    Failed,
}

/// One purchase request as stored in the remote relational store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub owner: UserId,
    pub amount: Amount,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Durable storage path of the uploaded receipt, never a signed URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_path: Option<String>,
    pub receipt_status: ReceiptStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A staged, not-yet-confirmed receipt file awaiting upload.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceiptDraft {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub staged_at: DateTime<Utc>,
}

impl ReceiptDraft {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
            staged_at: Utc::now(),
        }
    }
}

/// Addressing for staged drafts. A draft is keyed by its owner before the
/// remote payment record exists and re-keyed to the payment id afterwards
/// so retries can find it.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum DraftKey {
    User(UserId),
    Payment(PaymentId),
}

impl DraftKey {
    /// Stable string form used as the primary key in the local store.
    pub fn storage_key(&self) -> String {
        match self {
            Self::User(user) => format!("user:{user}:receipt"),
            Self::Payment(payment) => format!("payment:{payment}:receipt"),
        }
    }
}

impl fmt::Display for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

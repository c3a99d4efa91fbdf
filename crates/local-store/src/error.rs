// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Failures of the draft staging contract. Staging errors abort the
/// user-initiated flow; reads and deletes degrade to "absent" instead and
/// never surface this type.
#[derive(Debug, Error)]
pub enum DraftError {
    #[error("draft storage unavailable")]
    Unavailable(#[from] sqlx::Error),
    #[error("no draft staged under {0}")]
    Missing(String),
}

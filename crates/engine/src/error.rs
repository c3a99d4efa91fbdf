// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use rewards_ledger::ClaimError;
use rewards_local_store::DraftError;
use rewards_remote::RemoteError;
use thiserror::Error;

/// Typed failures of the session surface. Nothing here is thrown: every
/// operation hands one of these back to the caller.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No signed-in user. Fatal to any operation; dependent state has
    /// already been cleared when this surfaces.
    #[error("not authenticated")]
    NotAuthenticated,
    /// Local staging failed. The current attempt is dead; the user must
    /// re-pick the file.
    #[error("could not stage the receipt draft")]
    DraftUnavailable(#[source] DraftError),
    /// The staged draft is gone (expired, deleted, or never staged).
    #[error("no receipt draft is staged, pick the file again")]
    DraftGone,
    #[error("no payment to operate on")]
    NoPayment,
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Claim(#[from] ClaimError),
    #[error("local store failure")]
    Store(#[source] anyhow::Error),
}

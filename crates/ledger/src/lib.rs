// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Optimistic balance ledger.
//!
//! A reward claim must feel instantaneous while the authoritative
//! balance lives on the remote store. The ledger applies the claim as an
//! in-memory boost, pushes it to the server in the background with
//! bounded retries, and reconciles the boost away once the server is
//! seen to have caught up. The displayed value is floored by a
//! high-water mark: it never drops below what the user was already
//! shown, short of an explicit user-confirmed debit.

mod ledger;
mod metrics;
mod retry;

pub use ledger::{BalanceLedger, ClaimError, LedgerConfig};
pub use retry::RetrySchedule;

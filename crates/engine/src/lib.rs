// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Session facade over the reconciliation engine.
//!
//! [`RewardsClient`] is the surface UI-equivalent callers talk to: it
//! gates every operation on an authenticated session and returns typed
//! failures instead of panicking. [`Session`] wires the durable store,
//! the remote clients, the synchronizer, the ledger and the upload slot
//! together for one signed-in user, and tears them down on sign-out.

pub mod cli;
mod client;
mod error;
mod session;

pub use client::RewardsClient;
pub use error::SessionError;
pub use session::Session;

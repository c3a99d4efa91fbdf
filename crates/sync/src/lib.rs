// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Payment state synchronization.
//!
//! The synchronizer answers "what is my latest payment and its status"
//! instantly, from the local cache, and then keeps the answer fresh from
//! two remote sources: poll reads and the push change feed. All writes
//! funnel through one apply-reducer with a logical-recency guard, so
//! racing sources cannot regress the held snapshot. The acknowledgement
//! gate rides on the same state: a terminal payment is surfaced exactly
//! once per transition, across restarts, until explicitly acknowledged.

mod reducer;
mod snapshot;
mod synchronizer;

pub use reducer::{should_apply, SnapshotSource};
pub use snapshot::PaymentSnapshot;
pub use synchronizer::{PaymentSynchronizer, StatusChange};

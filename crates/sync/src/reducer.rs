// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use rewards_model::Payment;

use crate::PaymentSnapshot;

/// Where a snapshot came from. Precedence is decided here, not by the
/// arrival order of the async calls that produced the values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotSource {
    /// Local cache read at attach time.
    Cache,
    /// Poll read against the relational store.
    Poll,
    /// Change-feed event.
    Push,
}

/// Recency guard for the apply-reducer.
///
/// Push events are always trusted: the feed delivers them in receipt
/// order per payment and they reflect the remote row at the moment it
/// changed. Poll results can resolve after a push that overtook them, so
/// they only apply when they are not older than the held snapshot, and
/// never demote a terminal status. Cache reads only seed an empty
/// session.
pub fn should_apply(held: &PaymentSnapshot, incoming: &Payment, source: SnapshotSource) -> bool {
    let PaymentSnapshot::Present(current) = held else {
        return true;
    };

    if current.id != incoming.id {
        // A different payment id from a live source means a newer payment
        // record; the cache never overrides a live snapshot.
        return !matches!(source, SnapshotSource::Cache);
    }

    match source {
        SnapshotSource::Push => true,
        SnapshotSource::Poll | SnapshotSource::Cache => {
            if current.status.is_terminal() && !incoming.status.is_terminal() {
                return false;
            }
            incoming.updated_at >= current.updated_at
        }
    }
}

// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use rewards_model::Payment;

/// What the UI renders for "my current payment".
///
/// `Loading` only ever appears before the first remote read of a session
/// with a cold cache; background refreshes never flip a populated
/// snapshot back to it, because a stale view beats a flashing spinner.
#[derive(Clone, Debug, PartialEq)]
pub enum PaymentSnapshot {
    Loading,
    /// The user has never created a payment.
    Absent,
    Present(Payment),
}

impl PaymentSnapshot {
    pub fn payment(&self) -> Option<&Payment> {
        match self {
            Self::Present(payment) => Some(payment),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

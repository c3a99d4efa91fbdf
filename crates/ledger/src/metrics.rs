// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::sync::LazyLock;

use prometheus::{register_int_counter, IntCounter};

pub static CLAIMS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("rewards_claims_total", "Accepted reward claims")
        .expect("Failed to register claims counter")
});

pub static CLAIM_SYNC_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "rewards_claim_sync_failures_total",
        "Failed attempts to push a claim to the remote balance"
    )
    .expect("Failed to register claim sync failures counter")
});

pub static CLAIM_SYNC_EXHAUSTED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "rewards_claim_sync_exhausted_total",
        "Claims whose remote sync ran out of retries and was audited locally"
    )
    .expect("Failed to register claim sync exhausted counter")
});

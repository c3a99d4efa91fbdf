// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::sync::LazyLock;

use prometheus::{
    register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec,
};

pub static UPLOAD_ATTEMPTS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "rewards_upload_attempts_total",
        "Number of receipt upload attempts"
    )
    .expect("Failed to register upload attempts counter")
});

pub static UPLOAD_SUCCESSES: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "rewards_upload_successes_total",
        "Number of receipt uploads that reached the object store"
    )
    .expect("Failed to register upload successes counter")
});

pub static UPLOAD_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "rewards_upload_failures_total",
        "Failed receipt upload attempts, by reason",
        &["reason"]
    )
    .expect("Failed to register upload failures counter")
});

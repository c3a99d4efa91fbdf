// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for the rewards crates' tests.

use chrono::{DateTime, TimeZone as _, Utc};
use rewards_model::{Payment, PaymentId, PaymentStatus, ReceiptStatus, UserId};

/// Owner used by fixtures across the workspace.
pub const TEST_USER: &str = "user-test-1";

/// Assert something is true while sleeping and retrying
///
/// This macro creates a loop that keeps retrying the expression
/// by default every 50 milliseconds.
/// In case, the assertion is not true after the timeout period
/// (default to 1 second), this macro panics
#[macro_export]
macro_rules! assert_while_retry {
    ($assertion:expr) => {
        assert_while_retry!(
            $assertion,
            "Assertion was not true while retrying every 50 milliseconds up to 1 second.",
            std::time::Duration::from_secs(1),
            std::time::Duration::from_millis(50)
        );
    };
    ($assertion:expr, $msg:expr, $timeout:expr, $sleep:expr) => {
        if tokio::time::timeout($timeout, async {
            loop {
                if $assertion {
                    tokio::time::sleep($sleep).await;
                } else {
                    break;
                }
            }
        })
        .await
        .is_err()
        {
            panic!($msg);
        }
    };
}

/// A fixed instant so fixtures compare deterministically.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// A payment owned by [`TEST_USER`], created and updated at [`epoch`].
pub fn payment(id: &str, status: PaymentStatus, receipt_status: ReceiptStatus) -> Payment {
    Payment {
        id: PaymentId::new(id),
        owner: UserId::new(TEST_USER),
        amount: 25_000,
        status,
        rejection_reason: None,
        receipt_path: None,
        receipt_status,
        created_at: epoch(),
        updated_at: epoch(),
    }
}

/// Same as [`payment`], but with an explicit `updated_at` offset in
/// seconds, for recency-guard tests.
pub fn payment_updated_at(
    id: &str,
    status: PaymentStatus,
    receipt_status: ReceiptStatus,
    offset_secs: i64,
) -> Payment {
    let mut p = payment(id, status, receipt_status);
    p.updated_at = epoch() + chrono::Duration::seconds(offset_secs);
    p
}

/// A small fake receipt image payload.
pub fn draft_bytes() -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend(std::iter::repeat(0xAB).take(2048));
    bytes
}

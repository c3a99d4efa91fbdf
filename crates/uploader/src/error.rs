// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use rewards_remote::RemoteError;
use thiserror::Error;

/// Failure modes of one upload attempt. All of them are recoverable by a
/// retry; the caller records the durable `failed` marker and keeps the
/// draft staged.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("could not obtain a signed upload target")]
    TargetUnavailable(#[source] RemoteError),
    #[error("transfer made no progress within the stall window")]
    Stalled,
    #[error("upload did not finish within its deadline")]
    TimedOut,
    #[error("transfer failed")]
    Transfer(#[from] reqwest::Error),
    #[error("object store rejected the upload with status {0}")]
    Rejected(reqwest::StatusCode),
}

impl UploadError {
    /// Stable label used for the failure counter.
    pub(crate) fn reason(&self) -> &'static str {
        match self {
            Self::TargetUnavailable(_) => "target_unavailable",
            Self::Stalled => "stalled",
            Self::TimedOut => "timed_out",
            Self::Transfer(_) => "transfer",
            Self::Rejected(_) => "rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case(UploadError::Stalled, "stalled")]
    #[case(UploadError::TimedOut, "timed_out")]
    #[case(UploadError::Rejected(reqwest::StatusCode::INTERNAL_SERVER_ERROR), "rejected")]
    fn reason_labels_are_stable(#[case] err: UploadError, #[case] label: &str) {
        assert_eq!(err.reason(), label);
    }
}

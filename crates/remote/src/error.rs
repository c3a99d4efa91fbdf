// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("failed to decode remote payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("request timed out")]
    Timeout,
    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
}

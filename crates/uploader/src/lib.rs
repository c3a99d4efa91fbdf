// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Receipt upload pipeline.
//!
//! One attempt = one fresh pre-signed target plus one streamed PUT,
//! watched by two independent timers: a stall window that trips when
//! progress events stop (backgrounded mobile network stacks can hang
//! without erroring) and a hard deadline for the whole operation. Each
//! attempt is independently addressed, so retries can never produce two
//! remote objects for the same logical upload.

mod error;
mod metrics;
mod pipeline;
mod slot;

pub use error::UploadError;
pub use pipeline::{upload, UploadOptions};
pub use slot::UploadSlot;

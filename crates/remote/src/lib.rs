// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Clients for the remote collaborators: the relational payments API,
//! the balance API, the upload-target signing service and the push
//! change feed. The remote side is treated as opaque and eventually
//! consistent; everything here is plain JSON over HTTP.

mod backoff;
mod client;
mod error;
mod feed;

pub use backoff::ReconnectBackoff;
pub use client::{ApiClient, SignedUploadTarget};
pub use error::RemoteError;
pub use feed::subscribe;

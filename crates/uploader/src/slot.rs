// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::{collections::HashMap, sync::Mutex};

use rewards_model::DraftKey;
use tokio::task::JoinHandle;

/// Registry of in-flight upload tasks, at most one per draft key.
///
/// Uploads are deliberately detached from UI lifetime: navigating away
/// must not abort a receipt mid-transfer. The slot exists solely so that
/// a new attempt for the same key can cancel its predecessor, keeping two
/// PUTs from racing for the same destination.
#[derive(Debug, Default)]
pub struct UploadSlot {
    inflight: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl UploadSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the task driving an upload for `key`. Any attempt still
    /// in flight for the same key is aborted first.
    pub fn begin(&self, key: &DraftKey, handle: JoinHandle<()>) {
        let mut inflight = self.inflight.lock().expect("upload slot lock poisoned");
        if let Some(previous) = inflight.insert(key.storage_key(), handle) {
            if !previous.is_finished() {
                tracing::debug!(key = %key, "Cancelling superseded upload attempt");
                previous.abort();
            }
        }
    }

    /// Whether an attempt for `key` is still running.
    pub fn is_inflight(&self, key: &DraftKey) -> bool {
        let inflight = self.inflight.lock().expect("upload slot lock poisoned");
        inflight
            .get(&key.storage_key())
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Aborts every registered attempt. Used on session teardown.
    pub fn abort_all(&self) {
        let mut inflight = self.inflight.lock().expect("upload slot lock poisoned");
        for (_, handle) in inflight.drain() {
            handle.abort();
        }
    }
}

// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use chrono::Utc;
use rewards_local_store::LocalStore;
use rewards_model::{Payment, PaymentId, PaymentStatus, ReceiptStatus, UserId};
use rewards_remote::ApiClient;
use tokio::sync::{watch, Mutex};

use crate::{reducer::should_apply, PaymentSnapshot, SnapshotSource};

/// One-shot notification that a payment reached a terminal status the
/// user has not seen yet. Cleared only by an explicit acknowledgement.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusChange {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub rejection_reason: Option<String>,
}

/// Keeps the local view of the user's latest payment in sync with the
/// remote store.
///
/// Session lifecycle: `attach` hydrates from the cache (Live immediately
/// on a hit, Loading otherwise) and kicks a background refresh; push
/// events and poll results then flow through [`PaymentSynchronizer::apply`].
/// The write lock makes snapshot, cache and marker single-writer per
/// session, which is what keeps concurrent acknowledgements idempotent.
pub struct PaymentSynchronizer {
    user: UserId,
    store: LocalStore,
    api: ApiClient,
    snapshot: watch::Sender<PaymentSnapshot>,
    signal: watch::Sender<Option<StatusChange>>,
    write_lock: Mutex<()>,
}

impl PaymentSynchronizer {
    pub async fn attach(user: UserId, store: LocalStore, api: ApiClient) -> Arc<Self> {
        let initial = match store.cached_payment(&user).await {
            Some(payment) => PaymentSnapshot::Present(payment),
            None => PaymentSnapshot::Loading,
        };

        let (snapshot, _) = watch::channel(initial.clone());
        let (signal, _) = watch::channel(None);
        let sync = Arc::new(Self {
            user,
            store,
            api,
            snapshot,
            signal,
            write_lock: Mutex::new(()),
        });

        // An unacknowledged terminal status must resurface across
        // restarts, before any network round trip.
        if let PaymentSnapshot::Present(payment) = &initial {
            sync.raise_if_unacknowledged(payment).await;
        }

        let background = sync.clone();
        tokio::spawn(async move { background.refresh().await });

        sync
    }

    pub fn subscribe(&self) -> watch::Receiver<PaymentSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn status_changes(&self) -> watch::Receiver<Option<StatusChange>> {
        self.signal.subscribe()
    }

    pub fn current(&self) -> PaymentSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Non-blocking freshness pass: poll the remote store and fold the
    /// result in. Failures keep the stale snapshot; the UI never sees a
    /// spinner because of a background refresh.
    pub async fn refresh(&self) {
        match self.api.latest_payment(&self.user).await {
            Ok(Some(payment)) => self.apply(payment, SnapshotSource::Poll).await,
            Ok(None) => {
                let _guard = self.write_lock.lock().await;
                self.snapshot.send_if_modified(|held| {
                    if held.is_loading() {
                        *held = PaymentSnapshot::Absent;
                        true
                    } else {
                        false
                    }
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "Payment refresh failed, keeping stale snapshot");
            }
        }
    }

    /// The apply-reducer: folds a remote observation into the held
    /// snapshot, writes the cache back and drives the acknowledgement
    /// gate. Stale observations are dropped by the recency guard.
    pub async fn apply(&self, incoming: Payment, source: SnapshotSource) {
        if incoming.owner != self.user {
            tracing::warn!(
                owner = %incoming.owner,
                user = %self.user,
                "Dropping payment snapshot for another user"
            );
            return;
        }

        let _guard = self.write_lock.lock().await;

        let mut applied = false;
        self.snapshot.send_if_modified(|held| {
            if should_apply(held, &incoming, source) {
                *held = PaymentSnapshot::Present(incoming.clone());
                applied = true;
                true
            } else {
                false
            }
        });

        if !applied {
            tracing::debug!(payment_id = %incoming.id, ?source, "Dropped stale snapshot");
            return;
        }

        if let Err(err) = self.store.cache_payment(&self.user, &incoming).await {
            tracing::warn!(error = %err, "Failed to write back payment cache");
        }

        if incoming.is_terminal() {
            self.raise_if_unacknowledged(&incoming).await;
        }
    }

    /// Records an upload outcome on the held payment. The receipt fields
    /// are client-owned, so this writes snapshot and cache directly; the
    /// cache write is the durable failure marker that survives a restart
    /// even when the remote patch did not land.
    pub async fn patch_receipt(
        &self,
        payment_id: &PaymentId,
        receipt_path: Option<String>,
        receipt_status: ReceiptStatus,
    ) {
        let _guard = self.write_lock.lock().await;

        let mut patched = None;
        self.snapshot.send_if_modified(|held| {
            let PaymentSnapshot::Present(payment) = held else {
                return false;
            };
            if payment.id != *payment_id {
                return false;
            }
            if let Some(path) = &receipt_path {
                payment.receipt_path = Some(path.clone());
            }
            payment.receipt_status = receipt_status;
            payment.updated_at = Utc::now();
            patched = Some(payment.clone());
            true
        });

        if let Some(payment) = patched {
            if let Err(err) = self.store.cache_payment(&self.user, &payment).await {
                tracing::warn!(error = %err, "Failed to persist receipt status marker");
            }
        }
    }

    /// Confirms that the user saw the pending terminal transition.
    /// Idempotent and safe under at-least-once delivery: the marker write
    /// and the signal clear both collapse on replay.
    pub async fn acknowledge(&self) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;

        let Some(change) = self.signal.borrow().clone() else {
            return Ok(());
        };
        self.store
            .set_acknowledged(&self.user, &change.payment_id)
            .await?;
        self.signal.send_replace(None);
        Ok(())
    }

    async fn raise_if_unacknowledged(&self, payment: &Payment) {
        debug_assert!(payment.is_terminal());

        if self.store.acknowledged_payment(&self.user).await.as_ref() == Some(&payment.id) {
            return;
        }

        let change = StatusChange {
            payment_id: payment.id.clone(),
            status: payment.status,
            rejection_reason: payment.rejection_reason.clone(),
        };
        self.signal.send_if_modified(|current| {
            if current.as_ref() == Some(&change) {
                return false;
            }
            *current = Some(change.clone());
            true
        });
    }
}

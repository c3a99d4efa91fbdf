// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use rewards_config::Config;
use rewards_ledger::{BalanceLedger, LedgerConfig};
use rewards_local_store::LocalStore;
use rewards_model::{Amount, DraftKey, PaymentId, ReceiptDraft, ReceiptStatus, UserId};
use rewards_remote::ApiClient;
use rewards_sync::{PaymentSnapshot, PaymentSynchronizer, SnapshotSource, StatusChange};
use rewards_uploader::{UploadOptions, UploadSlot};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

use crate::SessionError;

/// Everything scoped to one signed-in user. Built on sign-in, torn down
/// on sign-out; nothing in here outlives the session except the durable
/// store contents on disk.
pub struct Session {
    user: UserId,
    http: reqwest::Client,
    api: ApiClient,
    store: LocalStore,
    sync: Arc<PaymentSynchronizer>,
    ledger: Arc<BalanceLedger>,
    slot: Arc<UploadSlot>,
    upload_opts: UploadOptions,
    background: Vec<JoinHandle<()>>,
}

impl Session {
    pub async fn sign_in(config: &Config, user: UserId) -> anyhow::Result<Self> {
        let http = reqwest::Client::new();
        let store = LocalStore::connect(&config.database.path).await?;
        let api = ApiClient::new(
            http.clone(),
            config.remote.api_url.clone(),
            config.remote.auth_token.clone(),
            config.remote.request_timeout,
        );

        let sync = PaymentSynchronizer::attach(user.clone(), store.clone(), api.clone()).await;
        let ledger = BalanceLedger::new(
            user.clone(),
            api.clone(),
            store.clone(),
            LedgerConfig {
                cooldown: config.claims.cooldown,
                retry_max_attempts: config.claims.retry_max_attempts,
                retry_backoff_step: config.claims.retry_backoff_step,
            },
        );

        let mut background = Vec::new();

        // push feed: payment mutations arrive here without polling
        let feed_url = config.remote.api_url.join(&config.sync.feed_path)?;
        let mut feed_rx = rewards_remote::subscribe(
            http.clone(),
            feed_url,
            config.remote.auth_token.clone(),
            user.clone(),
        );
        let feed_sync = sync.clone();
        background.push(tokio::spawn(async move {
            while let Some(event) = feed_rx.recv().await {
                feed_sync.apply(event, SnapshotSource::Push).await;
            }
            tracing::debug!("Change feed pump stopped");
        }));

        // periodic balance poll: the ledger's reconciliation source
        let balance_api = api.clone();
        let balance_ledger = ledger.clone();
        let balance_user = user.clone();
        let poll_interval = config.sync.refresh_interval;
        background.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match balance_api.balance(&balance_user).await {
                    Ok(balance) => balance_ledger.observe(balance),
                    Err(err) => {
                        tracing::debug!(error = %err, "Balance poll failed, keeping last observation");
                    }
                }
            }
        }));

        let session = Self {
            user,
            http,
            api,
            store,
            sync,
            ledger,
            slot: Arc::new(UploadSlot::new()),
            upload_opts: UploadOptions {
                target_timeout: config.uploads.target_timeout,
                stall_timeout: config.uploads.stall_timeout,
                hard_timeout: config.uploads.hard_timeout,
            },
            background,
        };

        session.resume_interrupted_upload().await;
        Ok(session)
    }

    /// Tears down everything session-scoped. In-flight uploads are
    /// aborted too: without a session there is no identity to attribute
    /// the receipt to.
    pub fn sign_out(self) {
        for task in &self.background {
            task.abort();
        }
        self.slot.abort_all();
        tracing::info!(user = %self.user, "Session closed");
    }

    pub fn current_payment(&self) -> PaymentSnapshot {
        self.sync.current()
    }

    pub fn subscribe_payment(&self) -> watch::Receiver<PaymentSnapshot> {
        self.sync.subscribe()
    }

    pub fn status_changes(&self) -> watch::Receiver<Option<StatusChange>> {
        self.sync.status_changes()
    }

    pub fn displayed_balance(&self) -> Amount {
        self.ledger.displayed_balance()
    }

    pub fn subscribe_balance(&self) -> watch::Receiver<Amount> {
        self.ledger.subscribe()
    }

    /// Foreground-regain / manual refresh: refetch payment and balance.
    /// Callers that must not block spawn this; it never flips a populated
    /// snapshot back to a loading state.
    pub async fn refresh(&self) {
        self.sync.refresh().await;
        match self.api.balance(&self.user).await {
            Ok(balance) => self.ledger.observe(balance),
            Err(err) => tracing::debug!(error = %err, "Balance refresh failed"),
        }
    }

    /// Stages the receipt durably, creates the remote payment record and
    /// detaches the upload. Returns as soon as the record exists; the
    /// transfer itself reports through the payment snapshot.
    pub async fn submit_receipt(
        &self,
        draft: ReceiptDraft,
        amount: Amount,
    ) -> Result<PaymentId, SessionError> {
        let user_key = DraftKey::User(self.user.clone());

        // stage before anything remote: the draft must survive a
        // suspension that happens while the record is still being created
        self.store
            .stage_draft(&user_key, &draft)
            .await
            .map_err(SessionError::DraftUnavailable)?;

        // a failed create leaves the draft staged under the user key, so
        // a later submit attempt does not need the file re-picked
        let payment = self.api.create_payment(&self.user, amount).await?;

        let payment_key = DraftKey::Payment(payment.id.clone());
        self.store
            .rekey_draft(&user_key, &payment_key)
            .await
            .map_err(SessionError::DraftUnavailable)?;

        self.sync.apply(payment.clone(), SnapshotSource::Poll).await;
        self.start_upload(payment.id.clone(), draft);
        Ok(payment.id)
    }

    /// Re-runs the upload for the current payment from its staged draft.
    pub async fn retry_upload(&self) -> Result<(), SessionError> {
        let PaymentSnapshot::Present(payment) = self.sync.current() else {
            return Err(SessionError::NoPayment);
        };

        let key = DraftKey::Payment(payment.id.clone());
        let Some(draft) = self.store.load_draft(&key).await else {
            return Err(SessionError::DraftGone);
        };

        self.sync
            .patch_receipt(&payment.id, None, ReceiptStatus::Uploading)
            .await;
        self.start_upload(payment.id, draft);
        Ok(())
    }

    pub async fn acknowledge_status_change(&self) -> Result<(), SessionError> {
        self.sync.acknowledge().await.map_err(SessionError::Store)
    }

    pub fn claim(&self, amount: Amount) -> Result<(), SessionError> {
        self.ledger.claim(amount)?;
        Ok(())
    }

    /// Records a user-confirmed withdrawal: the one case where the
    /// displayed balance may drop.
    pub fn confirm_withdrawal(&self, amount: Amount) {
        self.ledger.confirm_debit(amount);
    }

    /// A payment left at `uploading` with a surviving draft means the
    /// process was suspended mid-transfer: pick the upload back up.
    /// `failed` is left alone; that state surfaces a retry affordance
    /// instead.
    async fn resume_interrupted_upload(&self) {
        let PaymentSnapshot::Present(payment) = self.sync.current() else {
            return;
        };
        if payment.receipt_status != ReceiptStatus::Uploading {
            return;
        }

        let key = DraftKey::Payment(payment.id.clone());
        if let Some(draft) = self.store.load_draft(&key).await {
            tracing::info!(payment_id = %payment.id, "Resuming interrupted receipt upload");
            self.start_upload(payment.id.clone(), draft);
        }
    }

    /// Spawns the detached transfer task for `payment_id`, cancelling any
    /// attempt already in flight for the same key. The task records the
    /// outcome as the durable receipt-status marker whether or not the
    /// remote patch lands.
    fn start_upload(&self, payment_id: PaymentId, draft: ReceiptDraft) {
        let key = DraftKey::Payment(payment_id.clone());
        let http = self.http.clone();
        let api = self.api.clone();
        let store = self.store.clone();
        let sync = self.sync.clone();
        let user = self.user.clone();
        let opts = self.upload_opts.clone();
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            match rewards_uploader::upload(&http, &api, &user, draft, &opts).await {
                Ok(path) => {
                    // the receipt fields are client-owned: the local
                    // marker is the contract, the remote patch the record
                    sync.patch_receipt(&payment_id, Some(path.clone()), ReceiptStatus::Uploaded)
                        .await;
                    if let Err(err) = api
                        .patch_receipt(&payment_id, Some(&path), ReceiptStatus::Uploaded)
                        .await
                    {
                        tracing::warn!(
                            error = %err,
                            payment_id = %payment_id,
                            "Upload succeeded but the remote receipt patch failed"
                        );
                    }
                    // the object store holds the receipt now; the staged
                    // copy has served its purpose
                    store.delete_draft(&task_key).await;
                }
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        payment_id = %payment_id,
                        "Receipt upload failed, draft kept for retry"
                    );
                    sync.patch_receipt(&payment_id, None, ReceiptStatus::Failed)
                        .await;
                    if let Err(patch_err) = api
                        .patch_receipt(&payment_id, None, ReceiptStatus::Failed)
                        .await
                    {
                        tracing::debug!(
                            error = %patch_err,
                            "Could not record the failed upload remotely"
                        );
                    }
                }
            }
        });

        self.slot.begin(&key, handle);
    }
}

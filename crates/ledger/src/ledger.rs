// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use rewards_local_store::LocalStore;
use rewards_model::{Amount, UserId};
use rewards_remote::ApiClient;
use thiserror::Error;
use tokio::{sync::watch, time::Instant};

use crate::{
    metrics::{CLAIMS_TOTAL, CLAIM_SYNC_EXHAUSTED, CLAIM_SYNC_FAILURES},
    RetrySchedule,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimError {
    #[error("a claim is already being synced")]
    InFlight,
    #[error("claim cooldown is active")]
    Cooldown,
    #[error("claim amount must be positive")]
    InvalidAmount,
}

#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub cooldown: Duration,
    pub retry_max_attempts: u32,
    pub retry_backoff_step: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(60),
            retry_max_attempts: 4,
            retry_backoff_step: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Last server balance this session has seen. `None` until the first
    /// observation, which is only ever a baseline, never a trigger.
    last_server: Option<Amount>,
    /// Claimed amounts not yet confirmed by the server.
    boost: Amount,
    /// Highest value ever displayed. The display never goes below this
    /// without an explicit user-confirmed debit.
    high_water: Amount,
    claim_in_flight: bool,
    cooldown_until: Option<Instant>,
}

impl LedgerState {
    fn displayed(&self) -> Amount {
        (self.last_server.unwrap_or(0) + self.boost).max(self.high_water)
    }
}

/// Merges instantaneous local claims with the eventually-consistent
/// server balance. Single mutex over the whole state: every transition
/// is a short critical section with no awaits inside.
pub struct BalanceLedger {
    user: UserId,
    api: ApiClient,
    store: LocalStore,
    config: LedgerConfig,
    state: Mutex<LedgerState>,
    displayed: watch::Sender<Amount>,
}

impl BalanceLedger {
    pub fn new(user: UserId, api: ApiClient, store: LocalStore, config: LedgerConfig) -> Arc<Self> {
        let (displayed, _) = watch::channel(0);
        Arc::new(Self {
            user,
            api,
            store,
            config,
            state: Mutex::new(LedgerState::default()),
            displayed,
        })
    }

    pub fn displayed_balance(&self) -> Amount {
        *self.displayed.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Amount> {
        self.displayed.subscribe()
    }

    /// Applies a reward claim optimistically and kicks off the remote
    /// sync. Rejected without any state change while a previous claim is
    /// still syncing or the cooldown is running: that guard is what makes
    /// rapid double-taps harmless.
    pub fn claim(self: &Arc<Self>, amount: Amount) -> Result<(), ClaimError> {
        if amount <= 0 {
            return Err(ClaimError::InvalidAmount);
        }

        {
            let mut state = self.state.lock().expect("ledger lock poisoned");
            if state.claim_in_flight {
                return Err(ClaimError::InFlight);
            }
            if state
                .cooldown_until
                .is_some_and(|until| Instant::now() < until)
            {
                return Err(ClaimError::Cooldown);
            }

            state.claim_in_flight = true;
            state.cooldown_until = Some(Instant::now() + self.config.cooldown);
            state.boost += amount;
            self.publish(&mut state);
        }

        CLAIMS_TOTAL.inc();
        tracing::info!(user = %self.user, amount, "Reward claim applied locally");

        let ledger = self.clone();
        tokio::spawn(async move { ledger.sync_claim(amount).await });
        Ok(())
    }

    /// Folds a fresh server balance observation in. The first observation
    /// of a session is a baseline only. Afterwards, growth of at least
    /// the outstanding boost means the server has caught up: keeping the
    /// boost past that point would double count it.
    pub fn observe(&self, server: Amount) {
        let mut state = self.state.lock().expect("ledger lock poisoned");
        match state.last_server {
            None => {
                state.last_server = Some(server);
            }
            Some(previous) => {
                if state.boost > 0 && server - previous >= state.boost {
                    tracing::debug!(
                        user = %self.user,
                        boost = state.boost,
                        "Server balance caught up, clearing boost"
                    );
                    state.boost = 0;
                }
                state.last_server = Some(server);
            }
        }
        self.publish(&mut state);
    }

    /// Lowers the display floor after a user-confirmed debit such as a
    /// completed withdrawal. This is the only path that lets the
    /// displayed value go down.
    pub fn confirm_debit(&self, amount: Amount) {
        let mut state = self.state.lock().expect("ledger lock poisoned");
        state.high_water = (state.high_water - amount).max(0);
        self.publish(&mut state);
    }

    async fn sync_claim(&self, amount: Amount) {
        let mut schedule =
            RetrySchedule::new(self.config.retry_max_attempts, self.config.retry_backoff_step);

        loop {
            match self.api.credit_balance(&self.user, amount).await {
                Ok(server_total) => {
                    self.confirm_claim(amount, server_total);
                    return;
                }
                Err(err) => {
                    CLAIM_SYNC_FAILURES.inc();
                    tracing::warn!(
                        user = %self.user,
                        amount,
                        attempt = schedule.attempts_made() + 1,
                        error = %err,
                        "Claim sync attempt failed"
                    );

                    match schedule.next_delay() {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => {
                            self.abandon_sync(amount, schedule.attempts_made()).await;
                            return;
                        }
                    }
                }
            }
        }
    }

    /// The server acknowledged exactly this claim, so its share of the
    /// boost is confirmed and comes off. The returned total also becomes
    /// the newest server observation.
    fn confirm_claim(&self, amount: Amount, server_total: Amount) {
        let mut state = self.state.lock().expect("ledger lock poisoned");
        state.boost = (state.boost - amount).max(0);
        state.last_server = Some(server_total);
        state.claim_in_flight = false;
        self.publish(&mut state);
    }

    /// All retries failed. The boost stays applied: the user is not
    /// penalized for a transient network failure. An audit row records
    /// the intended claim for later reconciliation.
    async fn abandon_sync(&self, amount: Amount, attempts: u32) {
        CLAIM_SYNC_EXHAUSTED.inc();
        tracing::error!(
            user = %self.user,
            amount,
            attempts,
            "Claim sync exhausted retries, keeping local boost and auditing"
        );

        if let Err(err) = self.store.record_failed_claim(&self.user, amount, attempts).await {
            tracing::error!(error = %err, "Failed to write claim audit entry");
        }

        let mut state = self.state.lock().expect("ledger lock poisoned");
        state.claim_in_flight = false;
    }

    fn publish(&self, state: &mut LedgerState) {
        let displayed = state.displayed();
        state.high_water = displayed;
        self.displayed.send_replace(displayed);
    }
}

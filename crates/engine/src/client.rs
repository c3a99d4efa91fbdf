// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use rewards_config::Config;
use rewards_model::{Amount, PaymentId, ReceiptDraft, UserId};
use rewards_sync::{PaymentSnapshot, StatusChange};
use tokio::sync::watch;

use crate::{Session, SessionError};

/// Authentication gate over [`Session`].
///
/// The identity provider decides when a user exists; this type only
/// mirrors that decision. Session loss means "no user": every dependent
/// operation answers [`SessionError::NotAuthenticated`] and the
/// session-scoped state has already been dropped.
pub struct RewardsClient {
    config: Config,
    session: Option<Session>,
}

impl RewardsClient {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub async fn sign_in(&mut self, user: UserId) -> anyhow::Result<()> {
        if let Some(previous) = self.session.take() {
            previous.sign_out();
        }
        self.session = Some(Session::sign_in(&self.config, user).await?);
        Ok(())
    }

    pub fn sign_out(&mut self) {
        if let Some(session) = self.session.take() {
            session.sign_out();
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }

    fn session(&self) -> Result<&Session, SessionError> {
        self.session.as_ref().ok_or(SessionError::NotAuthenticated)
    }

    pub fn current_payment(&self) -> Result<PaymentSnapshot, SessionError> {
        Ok(self.session()?.current_payment())
    }

    pub fn subscribe_payment(&self) -> Result<watch::Receiver<PaymentSnapshot>, SessionError> {
        Ok(self.session()?.subscribe_payment())
    }

    pub fn status_changes(&self) -> Result<watch::Receiver<Option<StatusChange>>, SessionError> {
        Ok(self.session()?.status_changes())
    }

    pub async fn submit_receipt(
        &self,
        draft: ReceiptDraft,
        amount: Amount,
    ) -> Result<PaymentId, SessionError> {
        self.session()?.submit_receipt(draft, amount).await
    }

    pub async fn retry_upload(&self) -> Result<(), SessionError> {
        self.session()?.retry_upload().await
    }

    pub async fn acknowledge_status_change(&self) -> Result<(), SessionError> {
        self.session()?.acknowledge_status_change().await
    }

    pub fn claim(&self, amount: Amount) -> Result<(), SessionError> {
        self.session()?.claim(amount)
    }

    pub fn displayed_balance(&self) -> Result<Amount, SessionError> {
        Ok(self.session()?.displayed_balance())
    }

    pub fn confirm_withdrawal(&self, amount: Amount) -> Result<(), SessionError> {
        self.session()?.confirm_withdrawal(amount);
        Ok(())
    }

    pub async fn refresh(&self) -> Result<(), SessionError> {
        self.session()?.refresh().await;
        Ok(())
    }
}

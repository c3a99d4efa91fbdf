// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use reqwest::{header, RequestBuilder, StatusCode, Url};
use rewards_model::{Amount, Payment, PaymentId, ReceiptStatus, UserId};
use serde::{Deserialize, Serialize};

use crate::RemoteError;

/// Pre-signed, short-lived write target issued by the signing service.
/// `storage_path` is the durable reference recorded on the payment; the
/// URL itself expires and must never be persisted.
#[derive(Clone, Debug, Deserialize)]
pub struct SignedUploadTarget {
    pub upload_url: Url,
    pub storage_path: String,
}

/// Client for the remote relational store and the signing service.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    auth_token: Option<String>,
    request_timeout: Duration,
}

#[derive(Serialize)]
struct CreatePaymentBody<'a> {
    owner: &'a str,
    amount: Amount,
}

#[derive(Serialize)]
struct PatchReceiptBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    receipt_path: Option<&'a str>,
    receipt_status: ReceiptStatus,
}

#[derive(Serialize)]
struct SignUploadBody<'a> {
    owner: &'a str,
    file_name: &'a str,
    content_type: &'a str,
}

#[derive(Serialize)]
struct CreditBody {
    amount: Amount,
}

#[derive(Deserialize)]
struct BalanceBody {
    balance: Amount,
}

impl ApiClient {
    pub fn new(
        http: reqwest::Client,
        base: Url,
        auth_token: Option<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http,
            base,
            auth_token,
            request_timeout,
        }
    }

    /// Creates the payment record the instant the user confirms intent to
    /// pay. The receipt is still uploading at this point, which is why the
    /// record starts out `pending`/`uploading` on the server.
    pub async fn create_payment(
        &self,
        owner: &UserId,
        amount: Amount,
    ) -> Result<Payment, RemoteError> {
        let url = self.base.join("payments")?;
        let response = self
            .send(self.http.post(url).json(&CreatePaymentBody {
                owner: owner.as_str(),
                amount,
            }))
            .await?;
        Ok(Self::checked(response)?.json().await?)
    }

    /// Reads the most recent payment for `owner`. A 404 means the user
    /// has never created one.
    pub async fn latest_payment(&self, owner: &UserId) -> Result<Option<Payment>, RemoteError> {
        let url = self.base.join("payments/latest")?;
        let response = self
            .send(self.http.get(url).query(&[("owner", owner.as_str())]))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::checked(response)?.json().await?))
    }

    /// Records the upload outcome on the payment. Only the receipt fields
    /// are writable from the client; `status` belongs to the approval
    /// collaborator.
    pub async fn patch_receipt(
        &self,
        payment: &PaymentId,
        receipt_path: Option<&str>,
        receipt_status: ReceiptStatus,
    ) -> Result<Payment, RemoteError> {
        let url = self.base.join(&format!("payments/{payment}/receipt"))?;
        let response = self
            .send(self.http.patch(url).json(&PatchReceiptBody {
                receipt_path,
                receipt_status,
            }))
            .await?;
        Ok(Self::checked(response)?.json().await?)
    }

    pub async fn balance(&self, owner: &UserId) -> Result<Amount, RemoteError> {
        let url = self.base.join(&format!("balances/{owner}"))?;
        let response = self.send(self.http.get(url)).await?;
        let body: BalanceBody = Self::checked(response)?.json().await?;
        Ok(body.balance)
    }

    /// Adds `amount` to the server-side balance and returns the new total.
    pub async fn credit_balance(
        &self,
        owner: &UserId,
        amount: Amount,
    ) -> Result<Amount, RemoteError> {
        let url = self.base.join(&format!("balances/{owner}/credit"))?;
        let response = self
            .send(self.http.post(url).json(&CreditBody { amount }))
            .await?;
        let body: BalanceBody = Self::checked(response)?.json().await?;
        Ok(body.balance)
    }

    /// Requests a pre-signed upload target. This call has its own, shorter
    /// budget than the transfer it precedes: if the signing service cannot
    /// answer quickly the whole attempt is better off failing fast.
    pub async fn sign_upload(
        &self,
        owner: &UserId,
        file_name: &str,
        content_type: &str,
        timeout: Duration,
    ) -> Result<SignedUploadTarget, RemoteError> {
        let url = self.base.join("storage/sign")?;
        let request = self
            .with_auth(self.http.post(url))
            .json(&SignUploadBody {
                owner: owner.as_str(),
                file_name,
                content_type,
            })
            .send();

        let response = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| RemoteError::Timeout)??;
        Ok(Self::checked(response)?.json().await?)
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(header::USER_AGENT, "rewards-client");
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let request = self.with_auth(request).send();
        tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| RemoteError::Timeout)?
            .map_err(RemoteError::Http)
    }

    fn checked(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(RemoteError::Status(response.status()))
        }
    }
}

#[cfg(test)]
mod tests {
    use rewards_model::PaymentStatus;
    use rewards_test_assets::{payment, TEST_USER};
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    async fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(
            reqwest::Client::new(),
            server.uri().parse().unwrap(),
            Some("token".into()),
            Duration::from_secs(2),
        )
    }

    #[test_log::test(tokio::test)]
    async fn create_payment_posts_owner_and_amount() {
        let server = MockServer::start().await;
        let expected = payment(
            "pay-1",
            PaymentStatus::Pending,
            ReceiptStatus::Uploading,
        );
        Mock::given(method("POST"))
            .and(path("/payments"))
            .and(body_partial_json(json!({ "owner": TEST_USER, "amount": 25_000 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&expected))
            .mount(&server)
            .await;

        let created = client(&server)
            .await
            .create_payment(&UserId::new(TEST_USER), 25_000)
            .await
            .unwrap();
        assert_eq!(created, expected);
    }

    #[test_log::test(tokio::test)]
    async fn latest_payment_maps_404_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payments/latest"))
            .and(query_param("owner", TEST_USER))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let latest = client(&server)
            .await
            .latest_payment(&UserId::new(TEST_USER))
            .await
            .unwrap();
        assert!(latest.is_none());
    }

    #[test_log::test(tokio::test)]
    async fn patch_receipt_sends_path_and_status() {
        let server = MockServer::start().await;
        let mut expected = payment("pay-1", PaymentStatus::Pending, ReceiptStatus::Uploaded);
        expected.receipt_path = Some("receipts/pay-1.png".into());
        Mock::given(method("PATCH"))
            .and(path("/payments/pay-1/receipt"))
            .and(body_partial_json(json!({
                "receipt_path": "receipts/pay-1.png",
                "receipt_status": "uploaded"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&expected))
            .mount(&server)
            .await;

        let patched = client(&server)
            .await
            .patch_receipt(
                &PaymentId::new("pay-1"),
                Some("receipts/pay-1.png"),
                ReceiptStatus::Uploaded,
            )
            .await
            .unwrap();
        assert_eq!(patched.receipt_status, ReceiptStatus::Uploaded);
    }

    #[test_log::test(tokio::test)]
    async fn balance_endpoints_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/balances/{TEST_USER}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "balance": 100 })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/balances/{TEST_USER}/credit")))
            .and(body_partial_json(json!({ "amount": 10 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "balance": 110 })))
            .mount(&server)
            .await;

        let api = client(&server).await;
        let owner = UserId::new(TEST_USER);
        assert_eq!(api.balance(&owner).await.unwrap(), 100);
        assert_eq!(api.credit_balance(&owner, 10).await.unwrap(), 110);
    }

    #[test_log::test(tokio::test)]
    async fn server_error_is_a_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/balances/{TEST_USER}")))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .balance(&UserId::new(TEST_USER))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Status(status) if status.as_u16() == 500));
    }

    #[test_log::test(tokio::test)]
    async fn sign_upload_has_its_own_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/sign"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "upload_url": format!("{}/upload/abc", server.uri()),
                        "storage_path": "receipts/abc.png"
                    }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .sign_upload(
                &UserId::new(TEST_USER),
                "receipt.png",
                "image/png",
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Timeout));
    }
}

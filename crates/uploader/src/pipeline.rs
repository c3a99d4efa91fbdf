// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use bytes::Bytes;
use reqwest::header;
use rewards_model::{ReceiptDraft, UserId};
use rewards_remote::ApiClient;
use tokio::sync::watch;

use crate::{
    metrics::{UPLOAD_ATTEMPTS, UPLOAD_FAILURES, UPLOAD_SUCCESSES},
    UploadError,
};

/// Transfer chunk granularity. Progress is observed per chunk, so this
/// also bounds how coarse the stall detector's signal is.
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Clone, Debug)]
pub struct UploadOptions {
    /// Budget for the signed-target request, deliberately smaller than
    /// the transfer deadline.
    pub target_timeout: Duration,
    /// No-progress window after which the transfer is considered stalled.
    pub stall_timeout: Duration,
    /// Whole-attempt deadline.
    pub hard_timeout: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            target_timeout: Duration::from_secs(5),
            stall_timeout: Duration::from_secs(10),
            hard_timeout: Duration::from_secs(30),
        }
    }
}

/// Runs one upload attempt end to end and returns the durable storage
/// path of the uploaded receipt.
pub async fn upload(
    http: &reqwest::Client,
    api: &ApiClient,
    owner: &UserId,
    draft: ReceiptDraft,
    opts: &UploadOptions,
) -> Result<String, UploadError> {
    UPLOAD_ATTEMPTS.inc();

    let result = attempt(http, api, owner, draft, opts).await;
    match &result {
        Ok(path) => {
            UPLOAD_SUCCESSES.inc();
            tracing::info!(owner = %owner, path = %path, "Receipt upload finished");
        }
        Err(err) => {
            UPLOAD_FAILURES.with_label_values(&[err.reason()]).inc();
            tracing::warn!(owner = %owner, error = %err, "Receipt upload failed");
        }
    }
    result
}

async fn attempt(
    http: &reqwest::Client,
    api: &ApiClient,
    owner: &UserId,
    draft: ReceiptDraft,
    opts: &UploadOptions,
) -> Result<String, UploadError> {
    // A fresh attempt always starts from a fresh target: the previous
    // signed URL may have expired, and independent addressing is what
    // makes retries idempotent.
    let target = api
        .sign_upload(owner, &draft.file_name, &draft.mime_type, opts.target_timeout)
        .await
        .map_err(UploadError::TargetUnavailable)?;

    let total = draft.bytes.len() as u64;
    let (progress_tx, progress_rx) = watch::channel(0u64);

    let transfer = async {
        let response = http
            .put(target.upload_url.clone())
            .header(header::CONTENT_TYPE, draft.mime_type.as_str())
            .header(header::CONTENT_LENGTH, total.to_string())
            .body(progress_body(draft.bytes, progress_tx))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(UploadError::Rejected(response.status()))
        }
    };

    race_transfer(transfer, progress_rx, opts).await?;
    Ok(target.storage_path)
}

/// Races the transfer against the stall watchdog and the hard deadline.
async fn race_transfer<F>(
    transfer: F,
    progress: watch::Receiver<u64>,
    opts: &UploadOptions,
) -> Result<(), UploadError>
where
    F: std::future::Future<Output = Result<(), UploadError>>,
{
    tokio::select! {
        result = transfer => result,
        _ = stall_watchdog(progress, opts.stall_timeout) => Err(UploadError::Stalled),
        _ = tokio::time::sleep(opts.hard_timeout) => Err(UploadError::TimedOut),
    }
}

/// Resolves only when no progress event arrives within `window`. Once the
/// sender is gone the transfer outcome is imminent either way, so the
/// watchdog parks instead of resolving.
async fn stall_watchdog(mut progress: watch::Receiver<u64>, window: Duration) {
    loop {
        match tokio::time::timeout(window, progress.changed()).await {
            Ok(Ok(())) => continue,
            Ok(Err(_)) => std::future::pending::<()>().await,
            Err(_) => return,
        }
    }
}

/// Chunked request body that reports cumulative bytes handed to the
/// transport through a watch channel.
fn progress_body(bytes: Vec<u8>, progress: watch::Sender<u64>) -> reqwest::Body {
    let chunks: Vec<Bytes> = bytes.chunks(CHUNK_SIZE).map(Bytes::copy_from_slice).collect();
    let mut sent = 0u64;
    let stream = futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len() as u64;
        let _ = progress.send(sent);
        Ok::<Bytes, std::io::Error>(chunk)
    }));
    reqwest::Body::wrap_stream(stream)
}

#[cfg(test)]
mod tests {
    use rewards_model::UserId;
    use rewards_test_assets::{draft_bytes, TEST_USER};
    use serde_json::json;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn draft() -> ReceiptDraft {
        ReceiptDraft::new("receipt.png", "image/png", draft_bytes())
    }

    fn fast_opts() -> UploadOptions {
        UploadOptions {
            target_timeout: Duration::from_millis(500),
            stall_timeout: Duration::from_millis(300),
            hard_timeout: Duration::from_secs(5),
        }
    }

    async fn api(server: &MockServer) -> ApiClient {
        ApiClient::new(
            reqwest::Client::new(),
            server.uri().parse().unwrap(),
            None,
            Duration::from_secs(2),
        )
    }

    async fn mount_signer(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/storage/sign"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "upload_url": format!("{}/upload/abc", server.uri()),
                "storage_path": "receipts/abc.png"
            })))
            .mount(server)
            .await;
    }

    #[test_log::test(tokio::test)]
    async fn successful_upload_returns_storage_path() {
        let server = MockServer::start().await;
        mount_signer(&server).await;
        Mock::given(method("PUT"))
            .and(path("/upload/abc"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let path = upload(
            &reqwest::Client::new(),
            &api(&server).await,
            &UserId::new(TEST_USER),
            draft(),
            &fast_opts(),
        )
        .await
        .unwrap();

        assert_eq!(path, "receipts/abc.png");
    }

    #[test_log::test(tokio::test)]
    async fn unreachable_signer_is_target_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/sign"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = upload(
            &reqwest::Client::new(),
            &api(&server).await,
            &UserId::new(TEST_USER),
            draft(),
            &fast_opts(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, UploadError::TargetUnavailable(_)));
    }

    #[test_log::test(tokio::test)]
    async fn rejected_put_is_a_typed_failure() {
        let server = MockServer::start().await;
        mount_signer(&server).await;
        Mock::given(method("PUT"))
            .and(path("/upload/abc"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = upload(
            &reqwest::Client::new(),
            &api(&server).await,
            &UserId::new(TEST_USER),
            draft(),
            &fast_opts(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, UploadError::Rejected(status) if status.as_u16() == 500));
    }

    #[test_log::test(tokio::test)]
    async fn silent_server_trips_the_stall_window() {
        let server = MockServer::start().await;
        mount_signer(&server).await;
        // The body is consumed immediately, then the response never comes:
        // progress events stop and the stall window must fire well before
        // the hard deadline.
        Mock::given(method("PUT"))
            .and(path("/upload/abc"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let started = std::time::Instant::now();
        let err = upload(
            &reqwest::Client::new(),
            &api(&server).await,
            &UserId::new(TEST_USER),
            draft(),
            &fast_opts(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, UploadError::Stalled));
        assert!(started.elapsed() < fast_opts().hard_timeout);
    }

    #[test_log::test(tokio::test)]
    async fn hard_deadline_fires_when_stall_window_is_wider() {
        let server = MockServer::start().await;
        mount_signer(&server).await;
        Mock::given(method("PUT"))
            .and(path("/upload/abc"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let opts = UploadOptions {
            target_timeout: Duration::from_millis(500),
            // stall window wider than the hard deadline: only the hard
            // deadline can fire
            stall_timeout: Duration::from_secs(10),
            hard_timeout: Duration::from_millis(300),
        };

        let err = upload(
            &reqwest::Client::new(),
            &api(&server).await,
            &UserId::new(TEST_USER),
            draft(),
            &opts,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, UploadError::TimedOut));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn stall_fires_before_hard_deadline_when_progress_stops() {
        // Progress for ~2s, then silence. With a 10s stall window and a
        // 30s hard deadline the attempt must fail as Stalled around the
        // 12s mark, long before the deadline.
        let (tx, rx) = watch::channel(0u64);
        tokio::spawn(async move {
            for i in 1..=4u64 {
                tokio::time::sleep(Duration::from_millis(500)).await;
                let _ = tx.send(i * 1024);
            }
            // keep the sender alive so the watchdog sees silence, not a
            // finished transfer
            std::future::pending::<()>().await;
        });

        let opts = UploadOptions::default();
        let started = tokio::time::Instant::now();
        let transfer = std::future::pending::<Result<(), UploadError>>();
        let result = race_transfer(transfer, rx, &opts).await;

        assert!(matches!(result, Err(UploadError::Stalled)));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(12));
        assert!(elapsed < opts.hard_timeout);
    }
}

// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Push change feed over server-sent events.
//!
//! The remote store publishes payment mutations (most importantly the
//! approval collaborator's terminal writes) as SSE `data:` lines carrying
//! the full updated row. The subscriber task keeps one connection open,
//! reconnects with exponential backoff and delivers rows in receipt
//! order over an mpsc channel. Dropping the receiver ends the task.

use futures_util::StreamExt as _;
use reqwest::{header, Url};
use rewards_model::{Payment, UserId};
use tokio::sync::mpsc;

use crate::ReconnectBackoff;

/// Pause after a server-side clean close before dialing again. Healthy
/// servers hold the stream open, so a quick EOF must not turn into a
/// dial loop.
const EOF_RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

/// Opens a change-feed subscription for `owner`'s payments.
pub fn subscribe(
    http: reqwest::Client,
    feed_url: Url,
    auth_token: Option<String>,
    owner: UserId,
) -> mpsc::Receiver<Payment> {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut backoff = ReconnectBackoff::default();
        loop {
            let clean_close = match pump(&http, &feed_url, auth_token.as_deref(), &owner, &tx).await
            {
                Ok(()) => {
                    backoff.ok();
                    true
                }
                Err(err) => {
                    backoff.fail();
                    tracing::warn!(error = %err, "Change feed connection lost");
                    false
                }
            };

            if tx.is_closed() {
                tracing::debug!("Change feed receiver dropped, stopping subscription");
                break;
            }
            if let Some(delay) = backoff.remaining() {
                tokio::time::sleep(delay).await;
            } else if clean_close {
                tokio::time::sleep(EOF_RECONNECT_DELAY).await;
            }
        }
    });

    rx
}

/// Reads one connection until the server closes it, forwarding every
/// decoded event. Returns Ok on a clean end of stream.
async fn pump(
    http: &reqwest::Client,
    feed_url: &Url,
    auth_token: Option<&str>,
    owner: &UserId,
    tx: &mpsc::Sender<Payment>,
) -> anyhow::Result<()> {
    let mut request = http
        .get(feed_url.clone())
        .query(&[("owner", owner.as_str())])
        .header(header::ACCEPT, "text/event-stream");
    if let Some(token) = auth_token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await?.error_for_status()?;
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));
        for payment in drain_events(&mut buffer) {
            if tx.send(payment).await.is_err() {
                return Ok(());
            }
        }
    }

    Ok(())
}

/// Pulls complete `data:` lines out of the buffer, leaving any trailing
/// partial line in place for the next chunk. Undecodable events are
/// logged and skipped rather than tearing the connection down.
fn drain_events(buffer: &mut String) -> Vec<Payment> {
    let mut events = Vec::new();

    while let Some(newline) = buffer.find('\n') {
        let line: String = buffer.drain(..=newline).collect();
        let line = line.trim();

        let Some(body) = line.strip_prefix("data:") else {
            // comments, `event:`/`id:` fields and blank separators
            continue;
        };

        match serde_json::from_str::<Payment>(body.trim()) {
            Ok(payment) => events.push(payment),
            Err(err) => {
                tracing::warn!(error = %err, "Skipping undecodable change feed event");
            }
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use rewards_model::{PaymentStatus, ReceiptStatus};
    use rewards_test_assets::{payment, TEST_USER};
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    #[test]
    fn drain_events_parses_data_lines_and_keeps_partials() {
        let row = payment("pay-1", PaymentStatus::Approved, ReceiptStatus::Uploaded);
        let encoded = serde_json::to_string(&row).unwrap();
        let mut buffer = format!(": ping\n\ndata: {encoded}\n\ndata: {{\"trunc");

        let events = drain_events(&mut buffer);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, row.id);
        // the partial event stays buffered for the next chunk
        assert_eq!(buffer, "data: {\"trunc");
    }

    #[test]
    fn drain_events_skips_garbage_without_failing() {
        let mut buffer = "data: not json\ndata: 42\n".to_string();
        assert!(drain_events(&mut buffer).is_empty());
        assert!(buffer.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn subscribe_delivers_events_in_order() {
        let server = MockServer::start().await;
        let first = payment("pay-1", PaymentStatus::Pending, ReceiptStatus::Uploaded);
        let second = payment("pay-1", PaymentStatus::Rejected, ReceiptStatus::Uploaded);
        let body = format!(
            "data: {}\n\ndata: {}\n\n",
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );

        Mock::given(method("GET"))
            .and(path("/feed/payments"))
            .and(query_param("owner", TEST_USER))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let feed_url: Url = format!("{}/feed/payments", server.uri()).parse().unwrap();
        let mut rx = subscribe(
            reqwest::Client::new(),
            feed_url,
            None,
            UserId::new(TEST_USER),
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.status, PaymentStatus::Pending);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.status, PaymentStatus::Rejected);
    }
}

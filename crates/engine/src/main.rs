// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use rewards_engine::{
    cli::{get_cli_and_config, Command},
    RewardsClient,
};
use rewards_model::{ReceiptDraft, ReceiptStatus, UserId};
use rewards_sync::PaymentSnapshot;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (cli, config) = get_cli_and_config()?;
    let settle_budget = config.uploads.hard_timeout + Duration::from_secs(5);

    let mut client = RewardsClient::new(config);
    client.sign_in(UserId::new(cli.user)).await?;

    match cli.command {
        Command::Status => {
            let rx = client.subscribe_payment()?;
            let snapshot = wait_until_hydrated(rx, Duration::from_secs(10)).await;
            print_snapshot(&snapshot);
            if let Some(change) = client.status_changes()?.borrow().clone() {
                println!(
                    "unacknowledged status change: payment {} is now {:?}",
                    change.payment_id, change.status
                );
            }
        }
        Command::Balance => {
            client.refresh().await?;
            println!("balance: {}", client.displayed_balance()?);
        }
        Command::Submit { file, amount } => {
            let bytes = tokio::fs::read(&file).await?;
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "receipt".to_string());
            let draft = ReceiptDraft::new(file_name, mime_for(&file), bytes);

            let payment_id = client.submit_receipt(draft, amount).await?;
            println!("payment {payment_id} created, uploading receipt...");

            let rx = client.subscribe_payment()?;
            let snapshot = wait_until_settled(rx, settle_budget).await;
            print_snapshot(&snapshot);
        }
        Command::Retry => {
            client.retry_upload().await?;
            println!("retrying upload...");
            let rx = client.subscribe_payment()?;
            let snapshot = wait_until_settled(rx, settle_budget).await;
            print_snapshot(&snapshot);
        }
        Command::Claim { amount } => {
            client.claim(amount)?;
            println!(
                "claimed {amount}, displayed balance: {}",
                client.displayed_balance()?
            );
        }
        Command::Acknowledge => {
            client.acknowledge_status_change().await?;
            println!("acknowledged");
        }
    }

    client.sign_out();
    Ok(())
}

fn print_snapshot(snapshot: &PaymentSnapshot) {
    match snapshot {
        PaymentSnapshot::Loading => println!("payment status unavailable (still loading)"),
        PaymentSnapshot::Absent => println!("no payment yet"),
        PaymentSnapshot::Present(payment) => {
            println!(
                "payment {}: amount {}, status {:?}, receipt {:?}",
                payment.id, payment.amount, payment.status, payment.receipt_status
            );
            if let Some(reason) = &payment.rejection_reason {
                println!("rejection reason: {reason}");
            }
        }
    }
}

/// Waits until the snapshot leaves its loading state.
async fn wait_until_hydrated(
    mut rx: watch::Receiver<PaymentSnapshot>,
    budget: Duration,
) -> PaymentSnapshot {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        let snapshot = rx.borrow().clone();
        if !snapshot.is_loading() {
            return snapshot;
        }
        match tokio::time::timeout_at(deadline, rx.changed()).await {
            Ok(Ok(())) => continue,
            _ => return rx.borrow().clone(),
        }
    }
}

/// Waits until the current payment's receipt leaves the `uploading`
/// state, or the budget runs out.
async fn wait_until_settled(
    mut rx: watch::Receiver<PaymentSnapshot>,
    budget: Duration,
) -> PaymentSnapshot {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        let snapshot = rx.borrow().clone();
        match &snapshot {
            PaymentSnapshot::Present(payment)
                if payment.receipt_status != ReceiptStatus::Uploading =>
            {
                return snapshot;
            }
            _ => {}
        }
        match tokio::time::timeout_at(deadline, rx.changed()).await {
            Ok(Ok(())) => continue,
            _ => return rx.borrow().clone(),
        }
    }
}

fn mime_for(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

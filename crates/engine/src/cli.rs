// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rewards_config::Config;
use tracing::{
    level_filters::LevelFilter,
    subscriber::{set_global_default, SetGlobalDefaultError},
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(version, about = "Rewards client: payments, receipts and reward claims")]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// User id to run the session as.
    #[arg(long, value_name = "USER")]
    pub user: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the current payment and its status.
    Status,
    /// Show the displayed balance after a fresh refresh.
    Balance,
    /// Stage a receipt file, create the payment and upload.
    Submit {
        /// Receipt file to upload.
        file: PathBuf,
        /// Payment amount in minor units.
        #[arg(long)]
        amount: i64,
    },
    /// Retry the upload for the current payment from its staged draft.
    Retry,
    /// Claim a reward.
    Claim {
        /// Claim amount in minor units.
        amount: i64,
    },
    /// Acknowledge a pending terminal status notification.
    Acknowledge,
}

/// Sets up tracing, allows log level to be set from the environment variables
fn init_tracing(format: String) -> Result<(), SetGlobalDefaultError> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let subscriber_builder: tracing_subscriber::fmt::SubscriberBuilder<
        tracing_subscriber::fmt::format::DefaultFields,
        tracing_subscriber::fmt::format::Format,
        EnvFilter,
    > = FmtSubscriber::builder().with_env_filter(filter);
    match format.as_str() {
        "json" => set_global_default(subscriber_builder.json().finish()),
        "full" => set_global_default(subscriber_builder.finish()),
        "compact" => set_global_default(subscriber_builder.compact().finish()),
        _ => set_global_default(subscriber_builder.with_ansi(true).pretty().finish()),
    }
}

pub fn get_cli_and_config() -> anyhow::Result<(Cli, Config)> {
    let cli = Cli::parse();
    let config = Config::parse(cli.config.as_ref()).map_err(|e| {
        tracing::error!(
            "Invalid configuration file `{}`: {}",
            cli.config.clone().unwrap_or_default().display(),
            e
        );
        anyhow::anyhow!(e)
    })?;

    init_tracing("pretty".to_string()).expect(
        "Could not set up global default subscriber for logger, check \
        environmental variable `RUST_LOG`",
    );

    Ok((cli, config))
}

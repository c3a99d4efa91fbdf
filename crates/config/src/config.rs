// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::{env, path::PathBuf, time::Duration};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use regex::Regex;
use serde::Deserialize;
use serde_with::{serde_as, DurationSecondsWithFrac};
use url::Url;

const ENV_PREFIX: &str = "REWARDS_";

#[derive(Debug, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Config {
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub uploads: UploadsConfig,
    pub claims: ClaimsConfig,
    pub sync: SyncConfig,
}

// Newtype wrapping Config to be able use serde_ignored with Figment
#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ConfigWrapper(pub Config);

// Custom Deserializer for ConfigWrapper
// This is needed to warn about unknown fields
impl<'de> Deserialize<'de> for ConfigWrapper {
    fn deserialize<D>(deserializer: D) -> Result<ConfigWrapper, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let config: Config = serde_ignored::deserialize(deserializer, |path| {
            tracing::warn!("Ignoring unknown configuration field: {}", path);
        })?;

        Ok(ConfigWrapper(config))
    }
}

impl Config {
    pub fn parse(filename: Option<&PathBuf>) -> Result<Self, String> {
        let config_defaults = include_str!("../default_values.toml");

        let mut figment_config = Figment::new().merge(Toml::string(config_defaults));

        if let Some(path) = filename {
            let mut config_content = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read config file: {e}"))?;
            config_content = Self::substitute_env_vars(config_content)?;
            figment_config = figment_config.merge(Toml::string(&config_content));
        }

        let config: ConfigWrapper = figment_config
            .merge(Self::from_env_ignore_empty(ENV_PREFIX))
            .extract()
            .map_err(|e| e.to_string())?;

        config.0.validate()?;
        Ok(config.0)
    }

    fn from_env_ignore_empty(prefix: &str) -> Env {
        let prefixed_env = Env::prefixed(prefix).split("__");
        let ignore_prefixed: Vec<_> = prefixed_env
            .iter()
            .filter_map(|(key, value)| {
                if value.is_empty() {
                    Some(key.into_string())
                } else {
                    None
                }
            })
            .collect();
        let ref_ignore = ignore_prefixed
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>();
        prefixed_env.ignore(&ref_ignore)
    }

    fn substitute_env_vars(content: String) -> Result<String, String> {
        let reg = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| e.to_string())?;
        let mut missing_vars = Vec::new();
        let mut result = String::new();

        for line in content.lines() {
            if !line.trim_start().starts_with('#') {
                let processed_line = reg.replace_all(line, |caps: &regex::Captures| {
                    let var_name = &caps[1];
                    match env::var(var_name) {
                        Ok(value) => value,
                        Err(_) => {
                            missing_vars.push(var_name.to_string());
                            format!("${{{var_name}}}")
                        }
                    }
                });
                result.push_str(&processed_line);
                result.push('\n');
            }
        }

        if !missing_vars.is_empty() {
            return Err(format!(
                "Missing environment variables: {}",
                missing_vars.join(", ")
            ));
        }

        Ok(result.trim_end().to_string())
    }

    // custom validation of the values
    fn validate(&self) -> Result<(), String> {
        if self.uploads.stall_timeout >= self.uploads.hard_timeout {
            return Err(format!(
                "uploads.stall_timeout ({:?}) must be smaller than uploads.hard_timeout ({:?}), \
                otherwise a stalled transfer is indistinguishable from a slow one",
                self.uploads.stall_timeout, self.uploads.hard_timeout
            ));
        }
        if self.uploads.target_timeout >= self.uploads.hard_timeout {
            tracing::warn!(
                "uploads.target_timeout is not smaller than uploads.hard_timeout; \
                the signing request is supposed to be the cheap part of an upload"
            );
        }

        if self.claims.retry_max_attempts == 0 {
            return Err("claims.retry_max_attempts must be at least 1".to_string());
        }
        if self.claims.cooldown < Duration::from_secs(1) {
            tracing::warn!("claims.cooldown below 1s barely guards against double-taps");
        }

        if self.sync.refresh_interval < Duration::from_secs(5) {
            tracing::warn!(
                "sync.refresh_interval below 5s polls the remote store aggressively; \
                the change feed already delivers updates"
            );
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct DatabaseConfig {
    /// Path of the local SQLite file holding drafts, the payment cache and
    /// the acknowledgement marker.
    pub path: PathBuf,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct RemoteConfig {
    /// Base URL of the relational store API (payments, balances, signing).
    pub api_url: Url,
    pub auth_token: Option<String>,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub request_timeout: Duration,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct UploadsConfig {
    /// Budget for obtaining a pre-signed upload target.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub target_timeout: Duration,
    /// Abort the transfer when no progress event arrives within this window.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub stall_timeout: Duration,
    /// Whole-operation deadline for one upload attempt.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub hard_timeout: Duration,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ClaimsConfig {
    /// Minimum time between two reward claims.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub cooldown: Duration,
    pub retry_max_attempts: u32,
    /// Linear backoff step between claim-sync retries.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub retry_backoff_step: Duration,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct SyncConfig {
    /// Interval of the background balance poll.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub refresh_interval: Duration,
    /// Path of the change-feed endpoint, relative to `remote.api_url`.
    pub feed_path: String,
}

#[cfg(test)]
mod tests {
    use std::{fs, time::Duration};

    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn parse_defaults_only() {
        let config = Config::parse(None).expect("defaults must parse");
        assert_eq!(config.uploads.hard_timeout, Duration::from_secs(30));
        assert_eq!(config.uploads.stall_timeout, Duration::from_secs(10));
        assert_eq!(config.uploads.target_timeout, Duration::from_secs(5));
        assert!(config.claims.retry_max_attempts >= 1);
    }

    #[test]
    #[serial]
    fn user_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rewards.toml");
        fs::write(
            &path,
            r#"
            [uploads]
            hard_timeout = 60
            "#,
        )
        .unwrap();

        let config = Config::parse(Some(&path)).unwrap();
        assert_eq!(config.uploads.hard_timeout, Duration::from_secs(60));
        // untouched sections keep their defaults
        assert_eq!(config.uploads.stall_timeout, Duration::from_secs(10));
    }

    #[test]
    #[serial]
    fn env_overrides_file() {
        std::env::set_var("REWARDS_CLAIMS__COOLDOWN", "120");
        let config = Config::parse(None).unwrap();
        std::env::remove_var("REWARDS_CLAIMS__COOLDOWN");
        assert_eq!(config.claims.cooldown, Duration::from_secs(120));
    }

    #[test]
    #[serial]
    fn empty_env_values_are_ignored() {
        std::env::set_var("REWARDS_CLAIMS__COOLDOWN", "");
        let config = Config::parse(None);
        std::env::remove_var("REWARDS_CLAIMS__COOLDOWN");
        assert!(config.is_ok());
    }

    #[test]
    #[serial]
    fn stall_timeout_must_undercut_hard_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rewards.toml");
        fs::write(
            &path,
            r#"
            [uploads]
            stall_timeout = 45
            hard_timeout = 30
            "#,
        )
        .unwrap();

        let err = Config::parse(Some(&path)).unwrap_err();
        assert!(err.contains("stall_timeout"));
    }

    #[test]
    #[serial]
    fn env_var_substitution_in_config_file() {
        std::env::set_var("REWARDS_TEST_TOKEN", "sekret");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rewards.toml");
        fs::write(
            &path,
            r#"
            [remote]
            auth_token = "${REWARDS_TEST_TOKEN}"
            "#,
        )
        .unwrap();

        let config = Config::parse(Some(&path)).unwrap();
        std::env::remove_var("REWARDS_TEST_TOKEN");
        assert_eq!(config.remote.auth_token.as_deref(), Some("sekret"));
    }

    #[test]
    #[serial]
    fn missing_substitution_variable_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rewards.toml");
        fs::write(
            &path,
            r#"
            [remote]
            auth_token = "${REWARDS_NO_SUCH_VAR}"
            "#,
        )
        .unwrap();

        let err = Config::parse(Some(&path)).unwrap_err();
        assert!(err.contains("REWARDS_NO_SUCH_VAR"));
    }
}

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::{error::Error, lifecycle::MAX_INTERVAL};

const DEFAULT_WEBHOOK_URL: &str = "http://127.0.0.1:8081/webhook";

/// Service configuration, read from `HERALD_*` environment variables.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// SQLite database file. `None` keeps everything in memory.
    #[serde(default)]
    pub db_path: Option<String>,

    pub webhook_url: Url,
    /// Sent as `x-ins-auth-key` when present.
    #[serde(default)]
    pub webhook_key: Option<SecretString>,

    /// Confirmation cache. Falls back to an in-process map when unset.
    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default = "default_send_interval_seconds")]
    pub send_interval_seconds: u64,
    #[serde(default = "default_message_char_limit")]
    pub message_char_limit: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_sender_timeout_seconds")]
    pub sender_timeout_seconds: u64,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,

    /// Start the auto sender as soon as the service is up.
    #[serde(default = "default_autostart")]
    pub autostart: bool,
    #[serde(default)]
    pub seed_on_startup: bool,
}

fn default_send_interval_seconds() -> u64 {
    120
}

fn default_message_char_limit() -> u32 {
    160
}

fn default_max_retries() -> u32 {
    3
}

fn default_batch_size() -> u32 {
    2
}

fn default_sender_timeout_seconds() -> u64 {
    5
}

fn default_bind_address() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_autostart() -> bool {
    true
}

impl Config {
    pub fn load() -> eyre::Result<Self> {
        let config = envy::prefixed("HERALD_").from_env::<Self>()?;
        config.validate()?;
        Ok(config)
    }

    pub fn db_path(&self) -> Option<&str> {
        self.db_path.as_deref()
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_secs(self.send_interval_seconds)
    }

    pub fn sender_timeout(&self) -> Duration {
        Duration::from_secs(self.sender_timeout_seconds)
    }

    /// Rejects settings the dispatch loop cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_retries == 0 {
            return Err(Error::config("max_retries must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }
        if self.send_interval_seconds == 0 {
            return Err(Error::config("send_interval_seconds must be at least 1"));
        }
        if self.send_interval() > MAX_INTERVAL {
            return Err(Error::config(format!(
                "send_interval_seconds must be at most {}",
                MAX_INTERVAL.as_secs()
            )));
        }
        if self.sender_timeout_seconds == 0 {
            return Err(Error::config("sender_timeout_seconds must be at least 1"));
        }
        if self.message_char_limit == 0 {
            return Err(Error::config("message_char_limit must be at least 1"));
        }
        match self.webhook_url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(Error::config(format!(
                "webhook_url must be http or https, got {scheme}"
            ))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            webhook_url: Url::parse(DEFAULT_WEBHOOK_URL).expect("valid default webhook url"),
            webhook_key: None,
            redis_url: None,
            send_interval_seconds: default_send_interval_seconds(),
            message_char_limit: default_message_char_limit(),
            max_retries: default_max_retries(),
            batch_size: default_batch_size(),
            sender_timeout_seconds: default_sender_timeout_seconds(),
            bind_address: default_bind_address(),
            port: default_port(),
            autostart: default_autostart(),
            seed_on_startup: false,
        }
    }
}

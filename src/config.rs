use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Runtime configuration. Every field has a serde default so a partial (or
/// empty) JSON document is a valid config; `validate` runs once at build time
/// and is the only place configuration problems become fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Pattern tested case-insensitively against the start of each message.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Balance seeded into a wallet on first sight of a user.
    #[serde(default = "default_starting_balance")]
    pub starting_balance: i64,

    /// Storage key under which the wallet ledger document lives.
    #[serde(default = "default_wallet_storage_key")]
    pub wallet_storage_key: String,

    #[serde(default)]
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_broadcast_interval", with = "duration_ms")]
    pub broadcast_interval: Duration,

    #[serde(default = "default_chat_interval", with = "duration_ms")]
    pub chat_interval: Duration,

    #[serde(default = "default_subscription_interval", with = "duration_ms")]
    pub subscription_interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            broadcast_interval: default_broadcast_interval(),
            chat_interval: default_chat_interval(),
            subscription_interval: default_subscription_interval(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            starting_balance: default_starting_balance(),
            wallet_storage_key: default_wallet_storage_key(),
            polling: PollingConfig::default(),
        }
    }
}

impl BotConfig {
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let file = File::open(path)
            .map_err(|e| ConfigError::Read(format!("failed to open config file: {}", e)))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| ConfigError::Read(format!("failed to parse config file: {}", e)))
    }

    pub fn from_str(s: &str) -> ConfigResult<Self> {
        serde_json::from_str(s)
            .map_err(|e| ConfigError::Read(format!("failed to parse config: {}", e)))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.command_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "command_prefix must not be empty".to_string(),
            ));
        }
        if self.command_prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(
                "command_prefix must not contain whitespace".to_string(),
            ));
        }
        if self.starting_balance < 0 {
            return Err(ConfigError::Invalid(
                "starting_balance must not be negative".to_string(),
            ));
        }
        if self.wallet_storage_key.is_empty() {
            return Err(ConfigError::Invalid(
                "wallet_storage_key must not be empty".to_string(),
            ));
        }
        for (name, interval) in [
            ("broadcast_interval", self.polling.broadcast_interval),
            ("chat_interval", self.polling.chat_interval),
            ("subscription_interval", self.polling.subscription_interval),
        ] {
            if interval.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }
        Ok(())
    }
}

// Default values
fn default_command_prefix() -> String {
    ">".to_string()
}
fn default_starting_balance() -> i64 {
    100
}
fn default_wallet_storage_key() -> String {
    "wallet_ledger".to_string()
}
fn default_broadcast_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_chat_interval() -> Duration {
    Duration::from_secs(5)
}
fn default_subscription_interval() -> Duration {
    Duration::from_secs(60)
}

// Duration serialization helper (milliseconds)
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

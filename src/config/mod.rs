use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use subxt::utils::AccountId32;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required env var: {0}")]
    MissingEnv(String),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: String, value: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub stake: StakeConfig,
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Subtensor WebSocket RPC endpoint.
    pub ws_url: String,
    /// Signing mnemonic - loaded from env MNEMONIC
    #[serde(default)]
    pub mnemonic: String,
    /// Seconds between `author_pendingExtrinsics` polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Subnets `1..=subnet_count` are scanned for owners at startup.
    #[serde(default = "default_subnet_count")]
    pub subnet_count: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StakeConfig {
    /// Stake amount in rao.
    #[serde(default = "default_stake_amount")]
    pub amount: u64,
    /// Tip in rao.
    #[serde(default = "default_tip")]
    pub tip: u128,
    /// Multiplier applied to the spot price to get the limit price.
    #[serde(default = "default_slippage", with = "rust_decimal::serde::str")]
    pub slippage: Decimal,
    /// Validator hotkey (SS58) the stake is delegated to.
    #[serde(default = "default_validator_hotkey")]
    pub validator_hotkey: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_api")]
    pub api_url: String,
    /// Bot token - loaded from env TG_BOT_TOKEN
    #[serde(default)]
    pub bot_token: String,
    /// Chat id - loaded from env TG_CHAT_ID
    #[serde(default)]
    pub chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_poll_interval() -> u64 {
    5
}
fn default_subnet_count() -> u16 {
    128
}
fn default_stake_amount() -> u64 {
    6_000_000_000
}
fn default_tip() -> u128 {
    10_000_000
}
fn default_slippage() -> Decimal {
    Decimal::new(13, 1)
}
fn default_validator_hotkey() -> String {
    "5GKH9FPPnWSUoeeTJp19wVtd84XqFW4pyK2ijV2GsFbhTrP1".to_string()
}
fn default_max_attempts() -> u32 {
    5
}
fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StakeConfig {
    fn default() -> Self {
        Self {
            amount: default_stake_amount(),
            tip: default_tip(),
            slippage: default_slippage(),
            validator_hotkey: default_validator_hotkey(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl NodeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        // Secrets never live in the config file
        if let Ok(mnemonic) = std::env::var("MNEMONIC") {
            config.node.mnemonic = mnemonic;
        }
        if let Ok(token) = std::env::var("TG_BOT_TOKEN") {
            config.telegram.bot_token = token;
        }
        if let Ok(chat) = std::env::var("TG_CHAT_ID") {
            config.telegram.chat_id = chat;
        }

        config.validate()?;
        Ok(config)
    }

    /// Build the config purely from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let required = |name: &str| get(name).ok_or_else(|| ConfigError::MissingEnv(name.to_string()));

        let config = Config {
            node: NodeConfig {
                ws_url: required("WS_URL")?,
                mnemonic: required("MNEMONIC")?,
                poll_interval_secs: parse_or(get("POLL_INTERVAL"), "POLL_INTERVAL", default_poll_interval())?,
                subnet_count: parse_or(get("SUBNET_COUNT"), "SUBNET_COUNT", default_subnet_count())?,
            },
            stake: StakeConfig {
                amount: parse_or(get("STAKE_AMOUNT"), "STAKE_AMOUNT", default_stake_amount())?,
                tip: parse_or(get("TIP_AMOUNT"), "TIP_AMOUNT", default_tip())?,
                slippage: parse_or(get("SLIPPAGE"), "SLIPPAGE", default_slippage())?,
                validator_hotkey: get("VALIDATOR_HOTKEY").unwrap_or_else(default_validator_hotkey),
                max_attempts: parse_or(get("MAX_STAKE_ATTEMPTS"), "MAX_STAKE_ATTEMPTS", default_max_attempts())?,
            },
            telegram: TelegramConfig {
                api_url: get("TG_API_URL").unwrap_or_else(default_telegram_api),
                bot_token: required("TG_BOT_TOKEN")?,
                chat_id: required("TG_CHAT_ID")?,
            },
            logging: LoggingConfig {
                level: get("LOG_LEVEL").unwrap_or_else(default_log_level),
                json: parse_or(get("LOG_JSON"), "LOG_JSON", false)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.node.ws_url.is_empty() {
            return Err(ConfigError::MissingEnv("WS_URL".to_string()));
        }
        if self.node.mnemonic.is_empty() {
            return Err(ConfigError::MissingEnv("MNEMONIC".to_string()));
        }
        if self.telegram.bot_token.is_empty() {
            return Err(ConfigError::MissingEnv("TG_BOT_TOKEN".to_string()));
        }
        if self.telegram.chat_id.is_empty() {
            return Err(ConfigError::MissingEnv("TG_CHAT_ID".to_string()));
        }
        if self.node.poll_interval_secs == 0 {
            return Err(invalid("POLL_INTERVAL", "0"));
        }
        if self.stake.max_attempts == 0 {
            return Err(invalid("MAX_STAKE_ATTEMPTS", "0"));
        }
        if self.stake.slippage <= Decimal::ZERO {
            return Err(invalid("SLIPPAGE", &self.stake.slippage.to_string()));
        }
        if AccountId32::from_str(&self.stake.validator_hotkey).is_err() {
            return Err(invalid("VALIDATOR_HOTKEY", &self.stake.validator_hotkey));
        }
        Ok(())
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, name: &str, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.trim().parse().map_err(|_| invalid(name, &value)),
        None => Ok(default),
    }
}

fn invalid(name: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        value: value.to_string(),
    }
}

//! Configuration module for loading and parsing TOML configuration files.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse TOML configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// Invalid configuration value.
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// The fixed ticker universe, lowercase local symbols.
    pub tickers: Vec<String>,
    /// Market/exchange settings.
    #[serde(default)]
    pub market: MarketConfig,
    /// Indicator engine settings.
    #[serde(default)]
    pub indicator: IndicatorConfig,
    /// Option chain window settings.
    #[serde(default)]
    pub chain: ChainConfig,
    /// Pricing model defaults.
    #[serde(default)]
    pub pricing: PricingConfig,
    /// Order placement settings.
    #[serde(default)]
    pub trading: TradingConfig,
}

/// Market/exchange configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Exchange suffix appended to feed symbols (e.g. "US").
    pub suffix: String,
    /// Benchmark tickers compared against in pre-market factors.
    pub benchmarks: Vec<String>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            suffix: "US".to_string(),
            benchmarks: vec!["spy".to_string(), "qqq".to_string()],
        }
    }
}

/// Indicator engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorConfig {
    /// Sliding window length in ticks.
    pub memory: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self { memory: 50 }
    }
}

/// Option chain window configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Number of contracts quoted around the money.
    pub num_quoted: usize,
    /// Extra contracts added on the out-of-the-money side.
    pub otm_bias: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            num_quoted: 6,
            otm_bias: 0,
        }
    }
}

/// Pricing model defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    /// Annualized risk-free rate.
    pub risk_free_rate: f64,
    /// Implied volatility used when the caller supplies none.
    pub default_iv: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.04,
            default_iv: 0.30,
        }
    }
}

/// Order placement configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Shares represented by one option contract.
    pub contract_multiplier: u32,
    /// Cents shaved off the best bid when pricing a limit buy.
    pub limit_offset_cents: u32,
    /// Milliseconds to wait after submission before the first detail fetch.
    pub settle_ms: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            contract_multiplier: 100,
            limit_offset_cents: 5,
            settle_ms: 500,
        }
    }
}

impl TradingConfig {
    /// The limit-buy price improvement as an exact decimal.
    #[must_use]
    pub fn limit_offset(&self) -> Decimal {
        Decimal::new(i64::from(self.limit_offset_cents), 2)
    }

    /// The post-submission settle wait.
    #[must_use]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, or fails validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    /// Returns error if the content cannot be parsed or fails validation.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.validate()?;
        config.normalize();
        Ok(config)
    }

    /// Validates the configuration values.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.tickers.is_empty() {
            return Err(ConfigError::InvalidValue(
                "at least one ticker must be configured".to_string(),
            ));
        }
        for tk in &self.tickers {
            if tk.is_empty() || !tk.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(ConfigError::InvalidValue(format!(
                    "ticker `{tk}` must be a plain alphabetic symbol"
                )));
            }
        }
        if self.market.suffix.is_empty() {
            return Err(ConfigError::InvalidValue(
                "market suffix cannot be empty".to_string(),
            ));
        }
        if self.indicator.memory < 3 {
            return Err(ConfigError::InvalidValue(format!(
                "indicator memory must be at least 3, got {}",
                self.indicator.memory
            )));
        }
        if self.chain.num_quoted < 2 {
            return Err(ConfigError::InvalidValue(format!(
                "chain num_quoted must be at least 2, got {}",
                self.chain.num_quoted
            )));
        }
        if self.pricing.risk_free_rate < 0.0 {
            return Err(ConfigError::InvalidValue(
                "risk_free_rate must be non-negative".to_string(),
            ));
        }
        if self.pricing.default_iv <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "default_iv must be positive".to_string(),
            ));
        }
        if self.trading.contract_multiplier == 0 {
            return Err(ConfigError::InvalidValue(
                "contract_multiplier must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Lowercases tickers and benchmarks so map keys are uniform.
    fn normalize(&mut self) {
        for tk in &mut self.tickers {
            *tk = tk.to_lowercase();
        }
        for tk in &mut self.market.benchmarks {
            *tk = tk.to_lowercase();
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tickers: vec!["aapl".to_string(), "tsla".to_string(), "nvda".to_string()],
            market: MarketConfig::default(),
            indicator: IndicatorConfig::default(),
            chain: ChainConfig::default(),
            pricing: PricingConfig::default(),
            trading: TradingConfig::default(),
        }
    }
}

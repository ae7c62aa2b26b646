// Configuration loading and validation
// Everything comes from the environment; bad values abort startup

use anyhow::{anyhow, Result};

#[derive(Debug, Clone)]
pub struct AppCfg {
    /// xAI API key for the decision agent.
    pub xai_api_key: String,
    /// Chat model identifier.
    pub model: String,
    /// Brokerage API key pair.
    pub brokerage_key: String,
    pub brokerage_secret: String,
    /// The single instrument this process tracks.
    pub symbol: String,
    /// Decision gate interval in minutes.
    pub interval: u32,
    /// When true, decision cycles return immediately without contacting the model.
    pub disable_agent: bool,
    /// Paper-trading endpoints.
    pub paper: bool,
    /// Bind address for the observer push gateway.
    pub gateway_bind: String,
    pub feed_url: String,
    pub data_base_url: String,
    pub trading_base_url: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppCfg {
    pub fn from_env() -> Result<Self> {
        let xai_api_key = std::env::var("XAI_API_KEY")
            .map_err(|_| anyhow!("XAI_API_KEY environment variable is required"))?;
        let brokerage_key = std::env::var("BROKERAGE_API_KEY")
            .map_err(|_| anyhow!("BROKERAGE_API_KEY environment variable is required"))?;
        let brokerage_secret = std::env::var("BROKERAGE_SECRET_KEY")
            .map_err(|_| anyhow!("BROKERAGE_SECRET_KEY environment variable is required"))?;

        let interval: i64 = env_or("INTERVAL", "5")
            .parse()
            .map_err(|_| anyhow!("INTERVAL must be an integer number of minutes"))?;
        if interval <= 0 {
            return Err(anyhow!("INTERVAL must be a positive integer, got {interval}"));
        }
        let symbol = env_or("SYMBOL", "TSLA");
        if symbol.trim().is_empty() {
            return Err(anyhow!("SYMBOL must not be empty"));
        }
        let paper = env_or("PAPER", "true").to_lowercase() == "true";

        let trading_default = if paper {
            "https://paper-api.alpaca.markets"
        } else {
            "https://api.alpaca.markets"
        };

        Ok(Self {
            xai_api_key,
            model: env_or("MODEL", "grok-3-mini"),
            brokerage_key,
            brokerage_secret,
            symbol,
            interval: interval as u32,
            disable_agent: env_or("DISABLE_AGENT", "false").to_lowercase() == "true",
            paper,
            gateway_bind: env_or("GATEWAY_BIND", "0.0.0.0:8765"),
            feed_url: env_or("FEED_URL", "wss://stream.data.alpaca.markets/v2/iex"),
            data_base_url: env_or("DATA_BASE_URL", "https://data.alpaca.markets"),
            trading_base_url: env_or("TRADING_BASE_URL", trading_default),
        })
    }
}

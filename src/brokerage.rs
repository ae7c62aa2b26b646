// Brokerage facade
// TTL-cached reads, validated mutations, errors surfaced as tool-readable strings

use crate::cache::TtlCache;
use crate::config::AppCfg;
use crate::types::{AccountInfo, EquityPoint, OpenPosition, OptionContract, PortfolioValue};
use anyhow::{anyhow, Context, Result};
use log::info;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Provider error code for an uncovered option order.
const NOT_COVERED_CODE: &str = "40310000";

/// Wraps the order-execution API. Each read endpoint sits behind its own TTL
/// cache cell; mutating endpoints validate before any network call and return
/// descriptive strings so the agent loop can read failures as tool output.
pub struct BrokerageFacade {
    http: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    symbol: String,
    account_cache: TtlCache<AccountInfo>,
    positions_cache: TtlCache<Vec<OpenPosition>>,
    equity_one: TtlCache<Vec<EquityPoint>>,
    equity_fifteen: TtlCache<Vec<EquityPoint>>,
    equity_hour: TtlCache<Vec<EquityPoint>>,
    equity_day: TtlCache<Vec<EquityPoint>>,
}

// ============================================================================
// Provider response shapes (numeric fields arrive as strings)
// ============================================================================

#[derive(Deserialize)]
struct AccountResponse {
    portfolio_value: String,
    cash: String,
    buying_power: String,
    long_market_value: String,
    short_market_value: String,
}

#[derive(Deserialize)]
struct PositionResponse {
    symbol: String,
    qty: String,
    market_value: String,
    cost_basis: String,
    unrealized_pl: String,
}

#[derive(Deserialize)]
struct PortfolioHistoryResponse {
    timestamp: Vec<i64>,
    equity: Vec<Option<f64>>,
}

#[derive(Deserialize)]
struct ContractResponse {
    symbol: String,
    name: String,
    #[serde(rename = "type")]
    contract_type: String,
    strike_price: String,
    expiration_date: String,
    close_price: Option<String>,
}

#[derive(Deserialize)]
struct ContractListResponse {
    option_contracts: Vec<ContractResponse>,
}

fn parse_num(value: &str) -> f64 {
    value.parse::<f64>().unwrap_or(0.0)
}

/// Last 60 points of an equity series, oldest first.
pub fn tail_series(series: Vec<EquityPoint>) -> Vec<EquityPoint> {
    let skip = series.len().saturating_sub(60);
    series.into_iter().skip(skip).collect()
}

/// Expiration bounds arrive as plain dates, but some models hand back full
/// ISO timestamps; accept those too before rejecting.
fn parse_expiration(value: &str) -> Option<chrono::NaiveDate> {
    if let Ok(date) = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.date_naive())
}

// ============================================================================
// Input validation (string results, never raised)
// ============================================================================

fn validate_symbol(symbol: &str) -> Option<String> {
    if symbol.trim().is_empty() {
        return Some("Invalid symbol".to_string());
    }
    None
}

fn validate_quantity(quantity: f64) -> Option<String> {
    if quantity == 0.0 || !quantity.is_finite() {
        return Some("Quantity must be a non-zero number".to_string());
    }
    None
}

fn validate_positive(value: f64, field: &str) -> Option<String> {
    if value <= 0.0 || !value.is_finite() {
        return Some(format!("{field} must be a positive number"));
    }
    None
}

impl BrokerageFacade {
    pub fn new(cfg: &AppCfg) -> Self {
        let http = Client::builder()
            .user_agent("trading-agent/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");
        Self {
            http,
            base_url: cfg.trading_base_url.trim_end_matches('/').to_string(),
            api_key: cfg.brokerage_key.clone(),
            secret_key: cfg.brokerage_secret.clone(),
            symbol: cfg.symbol.clone(),
            account_cache: TtlCache::new(Duration::from_secs(60)),
            positions_cache: TtlCache::new(Duration::from_secs(60)),
            equity_one: TtlCache::new(Duration::from_secs(60)),
            equity_fifteen: TtlCache::new(Duration::from_secs(900)),
            equity_hour: TtlCache::new(Duration::from_secs(3600)),
            equity_day: TtlCache::new(Duration::from_secs(86400)),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{}", self.base_url, path))
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
    }

    // ------------------------------------------------------------------
    // Cached reads
    // ------------------------------------------------------------------

    pub async fn account_info(&self) -> Result<AccountInfo> {
        self.account_cache
            .get_or_fetch(|| async {
                let resp: AccountResponse = self
                    .get("/v2/account")
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await
                    .context("malformed account response")?;
                Ok(AccountInfo {
                    portfolio_value: parse_num(&resp.portfolio_value),
                    cash: parse_num(&resp.cash),
                    buying_power: parse_num(&resp.buying_power),
                    long_market_value: parse_num(&resp.long_market_value),
                    short_market_value: parse_num(&resp.short_market_value),
                })
            })
            .await
    }

    pub async fn open_positions(&self) -> Result<Vec<OpenPosition>> {
        self.positions_cache
            .get_or_fetch(|| async {
                let resp: Vec<PositionResponse> = self
                    .get("/v2/positions")
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await
                    .context("malformed positions response")?;
                Ok(resp
                    .into_iter()
                    .map(|p| OpenPosition {
                        symbol: p.symbol,
                        quantity: parse_num(&p.qty),
                        market_value: parse_num(&p.market_value),
                        original_cost: parse_num(&p.cost_basis),
                        unrealized_profit_loss: parse_num(&p.unrealized_pl),
                    })
                    .collect())
            })
            .await
    }

    async fn equity_series(&self, timeframe: &str, period: &str) -> Result<Vec<EquityPoint>> {
        let resp: PortfolioHistoryResponse = self
            .get("/v2/account/portfolio/history")
            .query(&[("timeframe", timeframe), ("period", period)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("malformed portfolio history response")?;

        let points = resp
            .timestamp
            .iter()
            .zip(resp.equity.iter())
            .filter_map(|(ts, equity)| {
                let equity = (*equity)?;
                let stamp = chrono::DateTime::from_timestamp(*ts, 0)?;
                Some(EquityPoint {
                    timestamp: stamp.to_rfc3339(),
                    equity,
                })
            })
            .collect();
        Ok(points)
    }

    /// Equity series for all four cadences, each cell refreshed on its own
    /// TTL and truncated to the most recent 60 points.
    pub async fn portfolio_value(&self) -> Result<PortfolioValue> {
        let one = self
            .equity_one
            .get_or_fetch(|| self.equity_series("1Min", "1D"))
            .await?;
        let fifteen = self
            .equity_fifteen
            .get_or_fetch(|| self.equity_series("15Min", "5D"))
            .await?;
        let hour = self
            .equity_hour
            .get_or_fetch(|| self.equity_series("1H", "5D"))
            .await?;
        let day = self
            .equity_day
            .get_or_fetch(|| self.equity_series("1D", "30D"))
            .await?;

        Ok(PortfolioValue {
            one: tail_series(one),
            fifteen: tail_series(fifteen),
            hour: tail_series(hour),
            day: tail_series(day),
        })
    }

    // ------------------------------------------------------------------
    // Tool endpoints (string results)
    // ------------------------------------------------------------------

    /// Option-contract search. Validation failures and transport errors come
    /// back as the result string so the agent can react to them.
    pub async fn get_options(
        &self,
        strike_price_gte: &str,
        strike_price_lte: &str,
        option_type: &str,
        expiration_date_gte: &str,
    ) -> String {
        let gte: f64 = match strike_price_gte.parse() {
            Ok(v) => v,
            Err(_) => return "strike_price_gte must be a number".to_string(),
        };
        let lte: f64 = match strike_price_lte.parse() {
            Ok(v) => v,
            Err(_) => return "strike_price_lte must be a number".to_string(),
        };
        if gte > lte {
            return "strike_price_gte must be less than or equal to strike_price_lte".to_string();
        }
        let option_type = option_type.to_uppercase();
        if option_type != "CALL" && option_type != "PUT" {
            return "option_type must be 'CALL' or 'PUT'".to_string();
        }
        if parse_expiration(expiration_date_gte).is_none() {
            return format!("invalid expiration_date_gte: {expiration_date_gte}");
        }

        match self
            .fetch_options(gte, lte, &option_type, expiration_date_gte)
            .await
        {
            Ok(contracts) => {
                serde_json::to_string(&contracts).unwrap_or_else(|err| err.to_string())
            }
            Err(err) => err.to_string(),
        }
    }

    async fn fetch_options(
        &self,
        strike_gte: f64,
        strike_lte: f64,
        option_type: &str,
        expiration_gte: &str,
    ) -> Result<Vec<OptionContract>> {
        let resp: ContractListResponse = self
            .get("/v2/options/contracts")
            .query(&[
                ("underlying_symbols", self.symbol.as_str()),
                ("strike_price_gte", &strike_gte.to_string()),
                ("strike_price_lte", &strike_lte.to_string()),
                ("type", &option_type.to_lowercase()),
                ("expiration_date_gte", expiration_gte),
                ("status", "active"),
                ("limit", "15"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("malformed option contracts response")?;

        Ok(resp
            .option_contracts
            .into_iter()
            .map(|c| OptionContract {
                symbol: c.symbol,
                name: c.name,
                contract_type: c.contract_type,
                strike_price: parse_num(&c.strike_price),
                expiration_date: c.expiration_date,
                close_price: c.close_price.as_deref().map(parse_num),
            })
            .collect())
    }

    /// Market buy with a stop-loss / take-profit bracket. Inputs are validated
    /// before any network call; the success string carries the cash balance
    /// re-read through the account cache, which may be up to 60s stale.
    pub async fn buy_option(
        &self,
        symbol: &str,
        quantity: f64,
        stop_price: f64,
        profit_price: f64,
    ) -> String {
        if let Some(msg) = validate_symbol(symbol) {
            return msg;
        }
        if let Some(msg) = validate_quantity(quantity) {
            return msg;
        }
        if let Some(msg) = validate_positive(stop_price, "stop_price") {
            return msg;
        }
        if let Some(msg) = validate_positive(profit_price, "profit_price") {
            return msg;
        }

        let body = json!({
            "symbol": symbol,
            "qty": quantity,
            "side": "buy",
            "type": "market",
            "time_in_force": "day",
            "stop_loss": { "stop_price": stop_price },
            "take_profit": { "limit_price": profit_price },
        });

        match self.submit_order(body).await {
            Ok(order_id) => {
                info!("BROKERAGE: bought option, order {order_id}");
                let cash = self
                    .account_info()
                    .await
                    .map(|a| a.cash.to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                format!("Success. Remaining cash: {cash}")
            }
            Err(err) => {
                let text = err.to_string();
                if text.contains(NOT_COVERED_CODE) {
                    "Order was rejected due to the option not being covered. Try a different option."
                        .to_string()
                } else {
                    text
                }
            }
        }
    }

    /// Market sell to close. Same string contract as `buy_option`.
    pub async fn close_option(&self, symbol: &str, quantity: f64) -> String {
        if let Some(msg) = validate_symbol(symbol) {
            return msg;
        }
        if let Some(msg) = validate_quantity(quantity) {
            return msg;
        }

        let body = json!({
            "symbol": symbol,
            "qty": quantity,
            "side": "sell",
            "type": "market",
            "time_in_force": "day",
        });

        match self.submit_order(body).await {
            Ok(order_id) => {
                info!("BROKERAGE: sold option, order {order_id}");
                let cash = self
                    .account_info()
                    .await
                    .map(|a| a.cash.to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                format!("Success. New cash: {cash}")
            }
            Err(err) => err.to_string(),
        }
    }

    async fn submit_order(&self, body: serde_json::Value) -> Result<String> {
        let response = self.post("/v2/orders").json(&body).send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!("order rejected ({status}): {text}"));
        }
        let parsed: serde_json::Value =
            serde_json::from_str(&text).context("malformed order response")?;
        Ok(parsed
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string())
    }
}

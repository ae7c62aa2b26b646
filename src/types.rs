// Core data types shared across modules
// Everything that crosses a process boundary derives serde

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One OHLCV bucket plus the indicator fields stamped at admission time.
/// Indicators are computed once, from the trailing bars of the same window,
/// and never recomputed retroactively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub trade_count: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub five_period_ma: f64,
    #[serde(default)]
    pub ten_period_ma: f64,
    #[serde(default)]
    pub six_period_rsi: f64,
}

impl Bar {
    pub fn from_tick(tick: &RawTick) -> Self {
        Self {
            open: tick.open,
            high: tick.high,
            low: tick.low,
            close: tick.close,
            volume: tick.volume,
            trade_count: tick.trade_count,
            timestamp: tick.timestamp,
            five_period_ma: 0.0,
            ten_period_ma: 0.0,
            six_period_rsi: 0.0,
        }
    }
}

/// Raw incoming market-data record, before any bar-admission decision.
/// Field names follow the upstream feed's bar message.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTick {
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v")]
    pub volume: f64,
    #[serde(rename = "n", default)]
    pub trade_count: u64,
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
}

/// The four rolling timeframes, with their admission threshold in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    One,
    Fifteen,
    Hour,
    Day,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [
        Timeframe::One,
        Timeframe::Fifteen,
        Timeframe::Hour,
        Timeframe::Day,
    ];

    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::One => 1,
            Timeframe::Fifteen => 15,
            Timeframe::Hour => 60,
            Timeframe::Day => 60 * 24,
        }
    }
}

/// Snapshot of all four windows, truncated to the last 60 entries each.
/// This is the unit broadcast to observers and returned by the data query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatedState {
    pub one: Vec<Bar>,
    pub fifteen: Vec<Bar>,
    pub hour: Vec<Bar>,
    pub day: Vec<Bar>,
}

/// One rolling window: insertion order is chronological order, capped at 60.
pub type Window = VecDeque<Bar>;

/// Account snapshot normalized to plain numeric fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub portfolio_value: f64,
    pub cash: f64,
    pub buying_power: f64,
    pub long_market_value: f64,
    pub short_market_value: f64,
}

/// One open position, normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    pub symbol: String,
    pub quantity: f64,
    pub market_value: f64,
    pub original_cost: f64,
    pub unrealized_profit_loss: f64,
}

/// One point of the portfolio equity series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: String,
    pub equity: f64,
}

/// Equity series for all four cadences, each truncated to the last 60 points.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PortfolioValue {
    pub one: Vec<EquityPoint>,
    pub fifteen: Vec<EquityPoint>,
    pub hour: Vec<EquityPoint>,
    pub day: Vec<EquityPoint>,
}

/// One option contract as returned by the contract search, normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionContract {
    pub symbol: String,
    pub name: String,
    #[serde(rename = "type")]
    pub contract_type: String,
    pub strike_price: f64,
    pub expiration_date: String,
    #[serde(default)]
    pub close_price: Option<f64>,
}

/// Settings snapshot for the outward query surface.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub model: String,
    pub disabled: bool,
    pub interval: u32,
    pub paper: bool,
}

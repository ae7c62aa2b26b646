// Upstream market-data client
// Websocket tick stream with auth/subscribe handshake plus REST bar history

use crate::config::AppCfg;
use crate::indicators;
use crate::types::{Bar, RawTick};
use anyhow::{anyhow, Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::time::{interval_at, sleep, Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

const KEEPALIVE_SECS: u64 = 30;

/// Keepalive cadence for the feed connection. The first ping waits a full
/// period after connect; the handshake itself is proof of life.
pub fn keepalive_interval() -> tokio::time::Interval {
    let period = Duration::from_secs(KEEPALIVE_SECS);
    interval_at(Instant::now() + period, period)
}

pub struct MarketDataClient {
    http: Client,
    feed_url: String,
    data_base_url: String,
    api_key: String,
    secret_key: String,
    symbol: String,
}

#[derive(Deserialize)]
struct HistoryResponse {
    bars: Option<Vec<RawTick>>,
}

impl MarketDataClient {
    pub fn new(cfg: &AppCfg) -> Self {
        let http = Client::builder()
            .user_agent("trading-agent/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");
        Self {
            http,
            feed_url: cfg.feed_url.clone(),
            data_base_url: cfg.data_base_url.trim_end_matches('/').to_string(),
            api_key: cfg.brokerage_key.clone(),
            secret_key: cfg.brokerage_secret.clone(),
            symbol: cfg.symbol.clone(),
        }
    }

    /// Fetch up to ten days of history for one cadence and stamp indicators
    /// cumulatively over the fetched prefix, oldest first.
    pub async fn fetch_history(&self, interval_minutes: i64) -> Result<Vec<Bar>> {
        let timeframe = if interval_minutes < 60 {
            format!("{interval_minutes}Min")
        } else if interval_minutes == 60 {
            "1Hour".to_string()
        } else {
            "1Day".to_string()
        };
        let now = Utc::now();
        let start = now - ChronoDuration::days(10);

        let resp: HistoryResponse = self
            .http
            .get(format!(
                "{}/v2/stocks/{}/bars",
                self.data_base_url, self.symbol
            ))
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
            .query(&[
                ("timeframe", timeframe.as_str()),
                ("start", &start.to_rfc3339()),
                ("end", &now.to_rfc3339()),
                ("feed", "iex"),
                ("limit", "10000"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("malformed bar history response")?;

        let ticks = resp.bars.unwrap_or_default();
        let mut bars: Vec<Bar> = ticks.iter().map(Bar::from_tick).collect();
        for i in 0..bars.len() {
            let prefix = &bars[..=i];
            let five = indicators::moving_average(prefix, 5);
            let ten = indicators::moving_average(prefix, 10);
            let rsi = indicators::relative_strength_index(prefix, 6);
            bars[i].five_period_ma = five;
            bars[i].ten_period_ma = ten;
            bars[i].six_period_rsi = rsi;
        }
        Ok(bars)
    }

    /// Run the feed forever: authenticate, subscribe, keepalive every 30s,
    /// then hand ticks to the handler one at a time. Connection and stream
    /// errors reconnect with exponential backoff; a malformed tick is logged
    /// and dropped, it never stops the stream.
    pub async fn run_stream<F, Fut>(self: Arc<Self>, handler: F) -> Result<()>
    where
        F: Fn(RawTick) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let mut retry_delay = Duration::from_secs(1);
        loop {
            match self.stream_once(&handler).await {
                Ok(()) => {
                    warn!("FEED: stream ended, reconnecting");
                    retry_delay = Duration::from_secs(1);
                }
                Err(err) => warn!("FEED: stream error: {err:?}"),
            }
            info!("FEED: reconnecting in {}s", retry_delay.as_secs());
            sleep(retry_delay).await;
            retry_delay = (retry_delay * 2).min(Duration::from_secs(60));
        }
    }

    async fn stream_once<F, Fut>(&self, handler: &F) -> Result<()>
    where
        F: Fn(RawTick) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let (ws, _) = connect_async(&self.feed_url).await?;
        info!("FEED: connected ({})", self.feed_url);
        let (mut write, mut read) = ws.split();

        let auth = json!({
            "action": "auth",
            "key": self.api_key,
            "secret": self.secret_key,
        });
        write.send(Message::Text(auth.to_string())).await?;
        // Connection ack, then auth ack.
        for _ in 0..2 {
            let ack = read
                .next()
                .await
                .ok_or_else(|| anyhow!("feed closed during auth"))??;
            info!("FEED: {ack}");
        }

        let subscribe = json!({
            "action": "subscribe",
            "bars": [self.symbol],
        });
        write.send(Message::Text(subscribe.to_string())).await?;
        let ack = read
            .next()
            .await
            .ok_or_else(|| anyhow!("feed closed during subscribe"))??;
        info!("FEED: {ack}");

        // Keepalive runs on its own task while the connection is open.
        let ping_task = tokio::spawn(async move {
            let mut ticker = keepalive_interval();
            loop {
                ticker.tick().await;
                if write.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        });

        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    for tick in parse_bar_messages(&text) {
                        handler(tick).await;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    ping_task.abort();
                    return Err(err.into());
                }
            }
        }

        ping_task.abort();
        Ok(())
    }
}

/// The feed delivers a JSON array of messages; bar messages carry `"T":"b"`.
/// A malformed element is a fatal per-tick error: logged and dropped.
fn parse_bar_messages(text: &str) -> Vec<RawTick> {
    let parsed: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            warn!("FEED: dropping unparseable message: {err}");
            return Vec::new();
        }
    };
    let Some(entries) = parsed.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter(|entry| entry.get("T").and_then(|t| t.as_str()) == Some("b"))
        .filter_map(|entry| match serde_json::from_value(entry.clone()) {
            Ok(tick) => Some(tick),
            Err(err) => {
                warn!("FEED: dropping malformed tick: {err}");
                None
            }
        })
        .collect()
}

// Shared test fixtures
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use trading_agent::agent::{ChatApi, ChatMessage, ChatResponse};
use trading_agent::config::AppCfg;
use trading_agent::types::{Bar, RawTick};

/// Config pointing at unroutable local endpoints; validation paths short-circuit
/// before any of them is contacted.
pub fn test_cfg() -> AppCfg {
    AppCfg {
        xai_api_key: "test-xai-key".to_string(),
        model: "grok-3-mini".to_string(),
        brokerage_key: "test-key".to_string(),
        brokerage_secret: "test-secret".to_string(),
        symbol: "TSLA".to_string(),
        interval: 5,
        disable_agent: false,
        paper: true,
        gateway_bind: "127.0.0.1:0".to_string(),
        feed_url: "ws://127.0.0.1:9".to_string(),
        data_base_url: "http://127.0.0.1:9".to_string(),
        trading_base_url: "http://127.0.0.1:9".to_string(),
    }
}

pub fn ts(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, hour, minute, 0).unwrap()
}

pub fn bar(close: f64) -> Bar {
    Bar {
        open: close,
        high: close,
        low: close,
        close,
        volume: 100.0,
        trade_count: 10,
        timestamp: ts(14, 3),
        five_period_ma: 0.0,
        ten_period_ma: 0.0,
        six_period_rsi: 0.0,
    }
}

pub fn tick_at(timestamp: DateTime<Utc>, close: f64) -> RawTick {
    RawTick {
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 100.0,
        trade_count: 10,
        timestamp,
    }
}

/// Chat client replaying a fixed script of responses.
pub struct ScriptedChat {
    responses: Mutex<VecDeque<ChatResponse>>,
    pub calls: AtomicUsize,
    /// Conversation length seen on each sample, for asserting tool results
    /// were appended.
    pub seen_lens: Mutex<Vec<usize>>,
}

impl ScriptedChat {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            seen_lens: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatApi for ScriptedChat {
    async fn sample(&self, messages: &[ChatMessage]) -> Result<ChatResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_lens.lock().unwrap().push(messages.len());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

// Decision agent
// Bounded tool-execution loop against the chat API, dispatching to the brokerage

use crate::brokerage::BrokerageFacade;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Hard cap on model round trips per decision cycle. Hitting it aborts the
/// cycle with no decision instead of looping on a tool-happy model.
pub const MAX_ROUNDS: usize = 8;

// ============================================================================
// Conversation types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_calls(raw: Value) -> Self {
        Self {
            role: "assistant",
            content: None,
            tool_calls: Some(raw),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool",
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// One tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A sampled response: either free-form content (terminal) or tool calls.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    /// Raw assistant tool_calls payload, echoed back into the conversation.
    pub raw_tool_calls: Option<Value>,
}

/// Seam over the language-model API so the loop is testable with a scripted
/// client.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn sample(&self, messages: &[ChatMessage]) -> Result<ChatResponse>;
}

// ============================================================================
// xAI chat client
// ============================================================================

pub struct XaiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    tool_calls: Option<Value>,
}

impl XaiClient {
    pub fn new(api_key: String, model: String) -> Self {
        let http = Client::builder()
            .user_agent("trading-agent/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .expect("failed to build reqwest client");
        info!("AGENT: chat client initialized with model {model}");
        Self {
            http,
            base_url: "https://api.x.ai/v1".to_string(),
            api_key,
            model,
        }
    }

}

#[async_trait]
impl ChatApi for XaiClient {
    async fn sample(&self, messages: &[ChatMessage]) -> Result<ChatResponse> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "tools": tool_catalog(),
        });
        let resp: CompletionResponse = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("malformed chat completion response")?;

        let message = resp
            .choices
            .into_iter()
            .next()
            .context("chat completion carried no choices")?
            .message;

        let raw_tool_calls = message.tool_calls.clone();
        let tool_calls = parse_tool_calls(message.tool_calls.as_ref());
        Ok(ChatResponse {
            content: message.content,
            tool_calls,
            raw_tool_calls,
        })
    }
}

fn parse_tool_calls(raw: Option<&Value>) -> Vec<ToolCall> {
    let Some(entries) = raw.and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let id = entry.get("id")?.as_str()?.to_string();
            let function = entry.get("function")?;
            let name = function.get("name")?.as_str()?.to_string();
            let arguments = match function.get("arguments") {
                Some(Value::String(s)) => serde_json::from_str(s).unwrap_or(Value::Null),
                Some(other) => other.clone(),
                None => Value::Null,
            };
            Some(ToolCall {
                id,
                name,
                arguments,
            })
        })
        .collect()
}

/// The fixed four-tool catalog offered to the model.
pub fn tool_catalog() -> Value {
    json!([
        {
            "type": "function",
            "function": {
                "name": "get_options",
                "description": "Search active option contracts for the tracked instrument.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "strike_price_gte": { "type": "string", "description": "Lower strike bound" },
                        "strike_price_lte": { "type": "string", "description": "Upper strike bound" },
                        "option_type": { "type": "string", "enum": ["CALL", "PUT"] },
                        "expiration_date_gte": { "type": "string", "description": "Earliest expiration, YYYY-MM-DD" }
                    },
                    "required": ["strike_price_gte", "strike_price_lte", "option_type", "expiration_date_gte"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "buy_option",
                "description": "Buy an option contract with a stop-loss / take-profit bracket.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "symbol": { "type": "string" },
                        "quantity": { "type": "number" },
                        "stop_price": { "type": "number" },
                        "profit_price": { "type": "number" }
                    },
                    "required": ["symbol", "quantity", "stop_price", "profit_price"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "close_option",
                "description": "Sell an open option position.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "symbol": { "type": "string" },
                        "quantity": { "type": "number" }
                    },
                    "required": ["symbol", "quantity"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "get_account_info",
                "description": "Fetch the current account snapshot.",
                "parameters": { "type": "object", "properties": {} }
            }
        }
    ])
}

// ============================================================================
// Tool loop
// ============================================================================

fn str_arg(arguments: &Value, key: &str) -> String {
    match arguments.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn num_arg(arguments: &Value, key: &str) -> f64 {
    match arguments.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Dispatch one tool call by name. Every outcome, including unknown names and
/// brokerage errors, comes back as a string the model can read.
pub async fn dispatch_tool(brokerage: &BrokerageFacade, call: &ToolCall) -> String {
    match call.name.as_str() {
        "get_options" => {
            brokerage
                .get_options(
                    &str_arg(&call.arguments, "strike_price_gte"),
                    &str_arg(&call.arguments, "strike_price_lte"),
                    &str_arg(&call.arguments, "option_type"),
                    &str_arg(&call.arguments, "expiration_date_gte"),
                )
                .await
        }
        "buy_option" => {
            brokerage
                .buy_option(
                    &str_arg(&call.arguments, "symbol"),
                    num_arg(&call.arguments, "quantity"),
                    num_arg(&call.arguments, "stop_price"),
                    num_arg(&call.arguments, "profit_price"),
                )
                .await
        }
        "close_option" => {
            brokerage
                .close_option(
                    &str_arg(&call.arguments, "symbol"),
                    num_arg(&call.arguments, "quantity"),
                )
                .await
        }
        "get_account_info" => match brokerage.account_info().await {
            Ok(info) => serde_json::to_string(&info).unwrap_or_else(|err| err.to_string()),
            Err(err) => err.to_string(),
        },
        other => format!("Unknown tool: {other}"),
    }
}

fn system_prompt(interval: u32, account_json: &str, positions_json: &str, symbol: &str) -> String {
    format!(
        "You are a professional day trader managing options on {symbol}. \
         You receive {symbol} bars on a {interval} minute interval together with \
         moving averages and RSI. Current account snapshot: {account_json}. \
         Open positions: {positions_json}. \
         Use the available tools to search option contracts, open a position with \
         a stop-loss and take-profit bracket, or close an existing position. \
         When you are done, answer with a short plain-text summary of the action \
         you took (or why you took none)."
    )
}

/// One complete decision cycle. Returns the terminal free-form answer, or
/// `None` when the agent is disabled, the round cap is hit, or the model is
/// content-free. Transport errors abort the cycle and bubble to the caller.
pub async fn run_decision_cycle(
    chat: &dyn ChatApi,
    brokerage: &BrokerageFacade,
    disabled: bool,
    interval: u32,
    symbol: &str,
    bars_json: &str,
) -> Result<Option<String>> {
    if disabled {
        info!("AGENT: disabled, skipping decision cycle");
        return Ok(None);
    }

    let account = brokerage.account_info().await?;
    let positions = brokerage.open_positions().await?;
    let account_json = serde_json::to_string(&account)?;
    let positions_json = serde_json::to_string(&positions)?;

    let conversation = vec![
        ChatMessage::system(system_prompt(interval, &account_json, &positions_json, symbol)),
        ChatMessage::user(bars_json.to_string()),
    ];
    run_tool_loop(chat, brokerage, conversation).await
}

/// The bounded dispatch loop itself: resample while the model keeps asking
/// for tools, terminate on the first content-bearing response.
pub async fn run_tool_loop(
    chat: &dyn ChatApi,
    brokerage: &BrokerageFacade,
    mut conversation: Vec<ChatMessage>,
) -> Result<Option<String>> {
    for round in 0..MAX_ROUNDS {
        let response = chat.sample(&conversation).await?;

        if response.tool_calls.is_empty() {
            return Ok(response.content);
        }

        if let Some(raw) = response.raw_tool_calls.clone() {
            conversation.push(ChatMessage::assistant_tool_calls(raw));
        }
        for call in &response.tool_calls {
            info!("AGENT: round {round}, tool call {}", call.name);
            let result = dispatch_tool(brokerage, call).await;
            conversation.push(ChatMessage::tool_result(call.id.clone(), result));
        }
    }

    warn!("AGENT: round cap of {MAX_ROUNDS} reached, aborting cycle");
    Ok(None)
}

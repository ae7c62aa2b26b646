// Tool-loop behavior with a scripted chat client

mod helpers;

use helpers::*;
use serde_json::json;
use trading_agent::agent::{
    dispatch_tool, run_decision_cycle, run_tool_loop, ChatMessage, ChatResponse, ToolCall,
    MAX_ROUNDS,
};
use trading_agent::brokerage::BrokerageFacade;

fn content_response(text: &str) -> ChatResponse {
    ChatResponse {
        content: Some(text.to_string()),
        tool_calls: Vec::new(),
        raw_tool_calls: None,
    }
}

fn tool_response(name: &str, arguments: serde_json::Value) -> ChatResponse {
    ChatResponse {
        content: None,
        tool_calls: vec![ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments,
        }],
        raw_tool_calls: Some(json!([{
            "id": "call_1",
            "function": { "name": name, "arguments": "{}" }
        }])),
    }
}

fn seed_conversation() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("test system prompt"),
        ChatMessage::user("[]"),
    ]
}

#[tokio::test]
async fn content_response_terminates_in_one_round() {
    let chat = ScriptedChat::new(vec![content_response("hold, no trade")]);
    let brokerage = BrokerageFacade::new(&test_cfg());

    let decision = run_tool_loop(&chat, &brokerage, seed_conversation())
        .await
        .unwrap();

    assert_eq!(decision.as_deref(), Some("hold, no trade"));
    assert_eq!(chat.call_count(), 1);
}

#[tokio::test]
async fn unknown_tool_injects_synthetic_result_and_continues() {
    let chat = ScriptedChat::new(vec![
        tool_response("fetch_weather", json!({})),
        content_response("done"),
    ]);
    let brokerage = BrokerageFacade::new(&test_cfg());

    let decision = run_tool_loop(&chat, &brokerage, seed_conversation())
        .await
        .unwrap();

    assert_eq!(decision.as_deref(), Some("done"));
    assert_eq!(chat.call_count(), 2);
    // Second sample saw the assistant echo plus the synthetic tool result.
    let lens = chat.seen_lens.lock().unwrap();
    assert_eq!(*lens, vec![2, 4]);
}

#[tokio::test]
async fn unknown_tool_result_names_the_tool() {
    let brokerage = BrokerageFacade::new(&test_cfg());
    let call = ToolCall {
        id: "call_1".to_string(),
        name: "fetch_weather".to_string(),
        arguments: json!({}),
    };
    assert_eq!(
        dispatch_tool(&brokerage, &call).await,
        "Unknown tool: fetch_weather"
    );
}

#[tokio::test]
async fn tool_happy_model_hits_round_cap_with_no_decision() {
    let script: Vec<ChatResponse> = (0..MAX_ROUNDS + 2)
        .map(|_| tool_response("missing_tool", json!({})))
        .collect();
    let chat = ScriptedChat::new(script);
    let brokerage = BrokerageFacade::new(&test_cfg());

    let decision = run_tool_loop(&chat, &brokerage, seed_conversation())
        .await
        .unwrap();

    assert_eq!(decision, None);
    assert_eq!(chat.call_count(), MAX_ROUNDS);
}

#[tokio::test]
async fn disabled_agent_skips_the_model_entirely() {
    let chat = ScriptedChat::new(vec![content_response("should never be seen")]);
    let brokerage = BrokerageFacade::new(&test_cfg());

    let decision = run_decision_cycle(&chat, &brokerage, true, 5, "TSLA", "[]")
        .await
        .unwrap();

    assert_eq!(decision, None);
    assert_eq!(chat.call_count(), 0, "model never contacted when disabled");
}

#[tokio::test]
async fn validation_failure_reaches_the_model_as_tool_output() {
    let brokerage = BrokerageFacade::new(&test_cfg());
    let call = ToolCall {
        id: "call_1".to_string(),
        name: "buy_option".to_string(),
        arguments: json!({
            "symbol": "TSLA240621C00190000",
            "quantity": 0,
            "stop_price": 1.0,
            "profit_price": 2.0
        }),
    };
    assert_eq!(
        dispatch_tool(&brokerage, &call).await,
        "Quantity must be a non-zero number"
    );
}

//! Integration tests for the conversation model and scripted client.

use serde_json::json;
use yeevu_llm::{
    ContentBlock, ConversationState, LlmClient, LlmTurn, Role, ScriptedLlm, StopReason, ToolResult,
};

fn write_call(id: &str, path: &str) -> ContentBlock {
    ContentBlock::tool_use(id, "Write", json!({"file_path": path, "content": "x"}))
}

/// Test that a multi-turn exchange keeps calls and results paired.
#[tokio::test]
async fn test_multi_turn_exchange_stays_paired() {
    let llm = ScriptedLlm::new()
        .then(LlmTurn::new(
            vec![write_call("a", "package.json"), write_call("b", "app/page.tsx")],
            StopReason::ToolUse,
        ))
        .then(LlmTurn::text("All files written."));

    let mut conversation = ConversationState::new("portfolio site");
    loop {
        conversation.validate().unwrap();
        let turn = llm.complete(None, conversation.messages(), &[]).await.unwrap();
        let calls = turn.tool_calls();
        conversation.push_assistant(turn.content.clone()).unwrap();
        if calls.is_empty() {
            break;
        }
        let results = calls
            .iter()
            .map(|c| ToolResult {
                tool_use_id: c.id.clone(),
                content: format!("wrote {}", c.input["file_path"]),
                is_error: false,
            })
            .collect();
        conversation.push_tool_results(results).unwrap();
    }

    assert_eq!(conversation.len(), 4);
    assert_eq!(conversation.messages()[2].role, Role::User);
    assert_eq!(conversation.messages()[2].content.len(), 2);

    // The second request carried the results of the first turn
    let requests = llm.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 3);
}

/// Test that the serialized history matches the Messages API layout.
#[test]
fn test_conversation_serializes_to_api_shape() {
    let mut conversation = ConversationState::new("hello");
    conversation
        .push_assistant(vec![write_call("t1", "a.txt")])
        .unwrap();
    conversation
        .push_tool_results(vec![ToolResult {
            tool_use_id: "t1".to_string(),
            content: "Error: disk full".to_string(),
            is_error: true,
        }])
        .unwrap();

    let value = serde_json::to_value(conversation.messages()).unwrap();
    assert_eq!(value[0]["role"], "user");
    assert_eq!(value[0]["content"][0]["type"], "text");
    assert_eq!(value[1]["content"][0]["type"], "tool_use");
    assert_eq!(value[2]["content"][0]["tool_use_id"], "t1");
    assert_eq!(value[2]["content"][0]["is_error"], true);
}

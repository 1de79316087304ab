//! Compiled conversation types.

use promptl_parser::MessageRole;
use serde::{Deserialize, Serialize};

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text { text: String },
    Image { image: String },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text { text: text.into() }
    }
}

/// A tool invocation requested by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: MessageRole,
    pub content: Vec<MessageContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    pub fn new(role: MessageRole, content: Vec<MessageContent>) -> Self {
        Self {
            role,
            content,
            name: None,
            tool_id: None,
            tool_calls: Vec::new(),
        }
    }

    /// An assistant message carrying a model response.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, vec![MessageContent::text(text)])
    }

    /// Concatenated text content.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|content| match content {
                MessageContent::Text { text } => Some(text.as_str()),
                MessageContent::Image { .. } => None,
            })
            .collect()
    }
}

/// The output of a compile run: the effective config and the messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub config: serde_json::Map<String, serde_json::Value>,
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_serializes_camel_case() {
        let mut message = Message::new(MessageRole::Tool, vec![MessageContent::text("42")]);
        message.tool_id = Some("call_1".into());
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "role": "tool",
                "content": [{ "type": "text", "text": "42" }],
                "toolId": "call_1"
            })
        );
    }

    #[test]
    fn test_tool_calls_serialize() {
        let mut message = Message::assistant("");
        message.content.clear();
        message.tool_calls.push(ToolCall {
            id: "1".into(),
            name: "lookup".into(),
            arguments: json!({ "q": "x" }),
        });
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["toolCalls"][0]["arguments"]["q"], "x");
        assert_eq!(value["content"], json!([]));
    }
}

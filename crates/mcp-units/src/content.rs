//! Result content types and normalization of unit return values.
//!
//! Callbacks may return a primitive, a plain object, or an already-structured
//! MCP result. Normalization folds all three into the same response shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    #[serde(rename = "resource")]
    Resource { resource: ResourceContent },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolContent>,
    #[serde(default, rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolCallResult {
    pub fn text(text: String) -> Self {
        Self {
            content: vec![ToolContent::Text { text }],
            is_error: None,
        }
    }

    pub fn json(value: &impl Serialize) -> Self {
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|e| e.to_string());
        Self::text(text)
    }

    pub fn error(message: String) -> Self {
        Self {
            content: vec![ToolContent::Text { text: message }],
            is_error: Some(true),
        }
    }

    /// Concatenated text of all text items.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ToolContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceContent {
    pub uri: String,
    #[serde(default, rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContent>,
}

impl ReadResourceResult {
    /// Plain-text contents reporting a datasource failure.
    pub fn error(uri: &str, message: String) -> Self {
        Self {
            contents: vec![ResourceContent {
                uri: uri.to_string(),
                mime_type: Some("text/plain".to_string()),
                text: Some(message),
                blob: None,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: ToolContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptGetResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

impl PromptGetResult {
    /// Single user message reporting a template failure.
    pub fn error(description: Option<&str>, message: String) -> Self {
        Self {
            description: description.map(str::to_string),
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: ToolContent::Text { text: message },
            }],
        }
    }
}

/// Already-structured results are recognized by their top-level array key.
fn structured<T: for<'de> Deserialize<'de>>(value: &Value, key: &str) -> Option<T> {
    value
        .get(key)
        .filter(|v| v.is_array())
        .and_then(|_| serde_json::from_value(value.clone()).ok())
}

fn render_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|e| e.to_string())
        }
        other => other.to_string(),
    }
}

/// Normalize an action's return value into a `tools/call` result.
pub fn normalize_action_output(value: Value) -> ToolCallResult {
    if let Some(result) = structured::<ToolCallResult>(&value, "content") {
        return result;
    }
    match value {
        Value::Object(_) | Value::Array(_) => ToolCallResult::json(&value),
        other => ToolCallResult::text(render_text(&other)),
    }
}

/// Normalize a datasource's return value into a `resources/read` result.
pub fn normalize_datasource_output(
    uri: &str,
    mime_type: Option<&str>,
    value: Value,
) -> ReadResourceResult {
    if let Some(result) = structured::<ReadResourceResult>(&value, "contents") {
        return result;
    }

    let default_mime = if value.is_string() {
        "text/plain"
    } else {
        "application/json"
    };
    ReadResourceResult {
        contents: vec![ResourceContent {
            uri: uri.to_string(),
            mime_type: Some(mime_type.unwrap_or(default_mime).to_string()),
            text: Some(render_text(&value)),
            blob: None,
        }],
    }
}

/// Normalize a template's return value into a `prompts/get` result.
pub fn normalize_template_output(description: Option<&str>, value: Value) -> PromptGetResult {
    if let Some(result) = structured::<PromptGetResult>(&value, "messages") {
        return result;
    }
    PromptGetResult {
        description: description.map(str::to_string),
        messages: vec![PromptMessage {
            role: "user".to_string(),
            content: ToolContent::Text {
                text: render_text(&value),
            },
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_output_shapes_match() {
        let from_number = serde_json::to_value(normalize_action_output(json!(5))).unwrap();
        let from_object =
            serde_json::to_value(normalize_action_output(json!({ "sum": 5 }))).unwrap();
        let from_structured = serde_json::to_value(normalize_action_output(json!({
            "content": [{ "type": "text", "text": "5" }]
        })))
        .unwrap();

        for v in [&from_number, &from_object, &from_structured] {
            assert!(v["content"].is_array(), "{v}");
            assert_eq!(v["content"][0]["type"], "text");
        }
        assert_eq!(from_number["content"][0]["text"], "5");
        assert_eq!(from_structured, from_number);
        assert!(from_object["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("\"sum\": 5"));
    }

    #[test]
    fn test_action_output_keeps_error_flag() {
        let result = normalize_action_output(json!({
            "content": [{ "type": "text", "text": "boom" }],
            "isError": true
        }));
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.text_content(), "boom");
    }

    #[test]
    fn test_object_with_non_array_content_is_plain() {
        let result = normalize_action_output(json!({ "content": "not a list" }));
        assert!(result.text_content().contains("not a list"));
    }

    #[test]
    fn test_datasource_output() {
        let text = normalize_datasource_output("info://x", None, json!("hello"));
        assert_eq!(text.contents[0].mime_type.as_deref(), Some("text/plain"));
        assert_eq!(text.contents[0].text.as_deref(), Some("hello"));

        let obj = normalize_datasource_output("info://x", None, json!({ "k": 1 }));
        assert_eq!(obj.contents[0].mime_type.as_deref(), Some("application/json"));
        assert_eq!(obj.contents[0].uri, "info://x");
    }

    #[test]
    fn test_template_output() {
        let result = normalize_template_output(Some("Review"), json!("Look at this"));
        assert_eq!(result.description.as_deref(), Some("Review"));
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].role, "user");
    }

    #[test]
    fn test_failure_results_carry_message() {
        let read = ReadResourceResult::error("info://x", "disk gone".to_string());
        assert_eq!(read.contents[0].uri, "info://x");
        assert_eq!(read.contents[0].mime_type.as_deref(), Some("text/plain"));
        assert_eq!(read.contents[0].text.as_deref(), Some("disk gone"));

        let prompt = PromptGetResult::error(Some("Review"), "bad input".to_string());
        assert_eq!(prompt.description.as_deref(), Some("Review"));
        assert_eq!(prompt.messages[0].role, "user");
        assert_eq!(
            prompt.messages[0].content,
            ToolContent::Text {
                text: "bad input".to_string()
            }
        );
    }
}

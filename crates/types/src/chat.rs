//! Strongly-typed chat data model shared by the front door and the translator.
//!
//! Inbound bodies are parsed leniently (extra fields are ignored, absent
//! optional fields take defaults) but strictly range-checked; every rejection
//! is a [`GatewayError::Validation`] naming the offending field.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Model used when the request does not name one.
pub const DEFAULT_MODEL: &str = "gpt-4.1";

/// Author of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(GatewayError::validation(
                "role",
                format!("unsupported role '{other}'"),
            )),
        }
    }
}

/// One turn of a conversation. Field order is `role`, `content` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Sampling parameters forwarded upstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f64,
    pub top_p: f64,
    pub n: u32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 1.0,
            n: 1,
            max_tokens: 512,
        }
    }
}

/// A validated OpenAI-style chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Model name as the client sent it (mapped to an upstream name later).
    pub model: String,
    pub messages: Vec<Message>,
    pub params: SamplingParams,
    pub stream: bool,
}

impl ChatRequest {
    /// Builds a non-streaming request with default sampling parameters.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            params: SamplingParams::default(),
            stream: false,
        }
    }

    /// Parses and validates a raw JSON request body.
    ///
    /// `messages` may also be supplied as `input` (a message array or a bare
    /// string). `model` defaults to [`DEFAULT_MODEL`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] naming the first invalid field.
    pub fn from_body(body: &Value) -> Result<Self> {
        let obj = body
            .as_object()
            .ok_or_else(|| GatewayError::validation("body", "request body must be a JSON object"))?;

        let raw_messages = present(obj.get("messages"))
            .or_else(|| present(obj.get("input")))
            .ok_or_else(|| {
                GatewayError::validation("messages", "Missing required field: messages or input")
            })?;
        let messages = parse_messages(raw_messages)?;
        if messages.is_empty() {
            return Err(GatewayError::validation(
                "messages",
                "Missing required field: messages or input",
            ));
        }

        let model = match present(obj.get("model")) {
            None => DEFAULT_MODEL.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(GatewayError::validation("model", "model must be a string")),
        };

        let defaults = SamplingParams::default();
        let params = SamplingParams {
            temperature: float_in(obj, "temperature", defaults.temperature, 0.0, 2.0)?,
            top_p: float_in(obj, "top_p", defaults.top_p, 0.0, 1.0)?,
            n: positive_int(obj, "n", defaults.n)?,
            max_tokens: positive_int(obj, "max_tokens", defaults.max_tokens)?,
        };

        let stream = match present(obj.get("stream")) {
            None => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(GatewayError::validation("stream", "stream must be a boolean")),
        };

        Ok(Self {
            model,
            messages,
            params,
            stream,
        })
    }
}

/// Treats JSON `null` the same as an absent field.
fn present(v: Option<&Value>) -> Option<&Value> {
    v.filter(|v| !v.is_null())
}

fn parse_messages(raw: &Value) -> Result<Vec<Message>> {
    match raw {
        Value::String(s) => Ok(vec![Message::user(s.clone())]),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_message(i, item))
            .collect(),
        _ => Err(GatewayError::validation(
            "messages",
            "messages must be an array of {role, content} objects",
        )),
    }
}

fn parse_message(index: usize, item: &Value) -> Result<Message> {
    let obj = item.as_object().ok_or_else(|| {
        GatewayError::validation("messages", format!("messages[{index}] must be an object"))
    })?;

    let role = match present(obj.get("role")) {
        None => Role::User,
        Some(Value::String(s)) => s.parse().map_err(|_| {
            GatewayError::validation(
                "messages",
                format!("messages[{index}].role: unsupported role '{s}'"),
            )
        })?,
        Some(_) => {
            return Err(GatewayError::validation(
                "messages",
                format!("messages[{index}].role must be a string"),
            ));
        }
    };

    let content = match present(obj.get("content")) {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => flatten_parts(parts),
        Some(_) => {
            return Err(GatewayError::validation(
                "messages",
                format!("messages[{index}].content must be a string"),
            ));
        }
    };

    Ok(Message { role, content })
}

/// Joins the text of OpenAI content parts (`[{"type":"text","text":..}]`).
fn flatten_parts(parts: &[Value]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            Value::String(s) => Some(s.as_str()),
            _ => p.get("text").and_then(Value::as_str),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn float_in(
    obj: &serde_json::Map<String, Value>,
    field: &str,
    default: f64,
    min: f64,
    max: f64,
) -> Result<f64> {
    let Some(v) = present(obj.get(field)) else {
        return Ok(default);
    };
    let x = v
        .as_f64()
        .ok_or_else(|| GatewayError::validation(field, format!("{field} must be a number")))?;
    if (min..=max).contains(&x) {
        Ok(x)
    } else {
        Err(GatewayError::validation(
            field,
            format!("{field} must be between {min} and {max}"),
        ))
    }
}

fn positive_int(obj: &serde_json::Map<String, Value>, field: &str, default: u32) -> Result<u32> {
    let Some(v) = present(obj.get(field)) else {
        return Ok(default);
    };
    v.as_u64()
        .filter(|n| *n >= 1)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| GatewayError::validation(field, format!("{field} must be an integer >= 1")))
}

/// Token accounting reported with a non-streaming completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    /// Builds a usage record whose total is the sum of its parts.
    #[must_use]
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Result of a non-streaming chat call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

impl Completion {
    /// Error-shaped completion: the message as text, zeroed usage.
    pub fn error(message: impl fmt::Display) -> Self {
        Self {
            text: format!("Error: {message}"),
            usage: Usage::default(),
        }
    }
}

/// One item of a streaming chat result.
///
/// A well-formed stream is zero or more `Text`, at most one `Error`, then
/// exactly one `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Next piece of generated text.
    Text(String),
    /// The upstream call failed; emitted once before `Done`.
    Error(String),
    /// End of the sequence.
    Done,
}

impl Fragment {
    /// Text to forward to the client, if any. Errors render as `Error: ...`.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Text(t) => Some(t.clone()),
            Self::Error(e) => Some(format!("Error: {e}")),
            Self::Done => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_body_minimal() {
        let req = ChatRequest::from_body(&json!({
            "model": "gpt-4.1",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();
        assert_eq!(req.model, "gpt-4.1");
        assert!(!req.stream);
        assert_eq!(req.messages, vec![Message::user("hi")]);
        assert_eq!(req.params, SamplingParams::default());
    }

    #[test]
    fn test_from_body_preserves_order() {
        let req = ChatRequest::from_body(&json!({
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "a"},
                {"role": "assistant", "content": "b"},
                {"role": "user", "content": "c"}
            ]
        }))
        .unwrap();
        let roles: Vec<Role> = req.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(req.messages[3].content, "c");
    }

    #[test]
    fn test_missing_messages_names_field() {
        let err = ChatRequest::from_body(&json!({"model": "gpt-4.1"})).unwrap_err();
        match err {
            GatewayError::Validation { field, .. } => assert_eq!(field, "messages"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_messages_rejected() {
        let err = ChatRequest::from_body(&json!({"messages": []})).unwrap_err();
        assert!(matches!(err, GatewayError::Validation { ref field, .. } if field == "messages"));
    }

    #[test]
    fn test_input_alias_and_default_model() {
        let req = ChatRequest::from_body(&json!({
            "input": [{"role": "user", "content": "from n8n"}]
        }))
        .unwrap();
        assert_eq!(req.model, DEFAULT_MODEL);
        assert_eq!(req.messages[0].content, "from n8n");
    }

    #[test]
    fn test_input_bare_string() {
        let req = ChatRequest::from_body(&json!({"input": "hello"})).unwrap();
        assert_eq!(req.messages, vec![Message::user("hello")]);
    }

    #[test]
    fn test_message_defaults_and_parts() {
        let req = ChatRequest::from_body(&json!({
            "messages": [
                {"content": "no role"},
                {"role": "user", "content": [
                    {"type": "text", "text": "part one"},
                    {"type": "image_url", "image_url": {"url": "x"}},
                    {"type": "text", "text": "part two"}
                ]},
                {"role": "assistant"}
            ]
        }))
        .unwrap();
        assert_eq!(req.messages[0].role, Role::User);
        assert_eq!(req.messages[1].content, "part one\npart two");
        assert_eq!(req.messages[2].content, "");
    }

    #[test]
    fn test_unknown_role_rejected() {
        let err = ChatRequest::from_body(&json!({
            "messages": [{"role": "wizard", "content": "x"}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("wizard"));
    }

    #[test]
    fn test_extra_fields_ignored() {
        let req = ChatRequest::from_body(&json!({
            "model": "gpt-4.1",
            "messages": [{"role": "user", "content": "hi", "name": "bob"}],
            "stop": ["\n"],
            "presence_penalty": 0.5,
            "user": "u-1"
        }))
        .unwrap();
        assert_eq!(req.messages.len(), 1);
    }

    #[test]
    fn test_sampling_params_parsed() {
        let req = ChatRequest::from_body(&json!({
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 0.2,
            "top_p": 0.9,
            "n": 2,
            "max_tokens": 64,
            "stream": true
        }))
        .unwrap();
        assert!(req.stream);
        assert!((req.params.temperature - 0.2).abs() < f64::EPSILON);
        assert!((req.params.top_p - 0.9).abs() < f64::EPSILON);
        assert_eq!(req.params.n, 2);
        assert_eq!(req.params.max_tokens, 64);
    }

    #[test]
    fn test_temperature_out_of_range() {
        let err = ChatRequest::from_body(&json!({
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 2.5
        }))
        .unwrap_err();
        assert!(matches!(err, GatewayError::Validation { ref field, .. } if field == "temperature"));
    }

    #[test]
    fn test_max_tokens_zero_rejected() {
        let err = ChatRequest::from_body(&json!({
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 0
        }))
        .unwrap_err();
        assert!(matches!(err, GatewayError::Validation { ref field, .. } if field == "max_tokens"));
    }

    #[test]
    fn test_null_fields_take_defaults() {
        let req = ChatRequest::from_body(&json!({
            "model": null,
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": null,
            "stream": null
        }))
        .unwrap();
        assert_eq!(req.model, DEFAULT_MODEL);
        assert!(!req.stream);
    }

    #[test]
    fn test_message_serializes_role_then_content() {
        let s = serde_json::to_string(&Message::user("x")).unwrap();
        assert_eq!(s, r#"{"role":"user","content":"x"}"#);
    }

    #[test]
    fn test_usage_total_is_sum() {
        let u = Usage::new(100, 10);
        assert_eq!(u.total_tokens, 110);
    }

    #[test]
    fn test_completion_error_shape() {
        let c = Completion::error(503);
        assert_eq!(c.text, "Error: 503");
        assert_eq!(c.usage, Usage::default());
    }

    #[test]
    fn test_fragment_to_text() {
        assert_eq!(Fragment::Text("a".into()).to_text().as_deref(), Some("a"));
        assert_eq!(
            Fragment::Error("down".into()).to_text().as_deref(),
            Some("Error: down")
        );
        assert_eq!(Fragment::Done.to_text(), None);
    }
}

//! OpenAI-compatible response envelopes.
//!
//! All builders take the request id, creation time and the client-facing
//! model name so that every chunk of one response carries the same envelope.

use freegpt_types::Completion;
use serde_json::{Value, json};

/// Terminal SSE frame of every stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

fn hex24() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(24);
    id
}

/// `chatcmpl-` followed by 24 hex characters.
#[must_use]
pub fn chat_completion_id() -> String {
    format!("chatcmpl-{}", hex24())
}

/// `cmpl-` followed by 24 hex characters.
#[must_use]
pub fn text_completion_id() -> String {
    format!("cmpl-{}", hex24())
}

/// Wrap a JSON value as one SSE frame.
#[must_use]
pub fn sse_frame(value: &Value) -> String {
    format!("data: {value}\n\n")
}

/// Non-streaming `chat.completion` response.
#[must_use]
pub fn chat_completion(id: &str, created: u64, model: &str, completion: &Completion) -> Value {
    json!({
        "id": id,
        "object": "chat.completion",
        "created": created,
        "model": model,
        "usage": completion.usage,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": completion.text},
            "finish_reason": "stop"
        }]
    })
}

/// One `chat.completion.chunk` carrying a content delta.
#[must_use]
pub fn chat_chunk(id: &str, created: u64, model: &str, content: &str) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
    })
}

/// Final `chat.completion.chunk`: empty delta, `finish_reason: "stop"`.
#[must_use]
pub fn chat_final_chunk(id: &str, created: u64, model: &str) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
    })
}

/// Non-streaming legacy `text_completion` response.
#[must_use]
pub fn text_completion(id: &str, created: u64, model: &str, completion: &Completion) -> Value {
    json!({
        "id": id,
        "object": "text_completion",
        "created": created,
        "model": model,
        "usage": completion.usage,
        "choices": [{
            "index": 0,
            "text": completion.text,
            "finish_reason": "stop",
            "logprobs": null
        }]
    })
}

/// One streamed `text_completion` chunk. `finish_reason` is `null` for
/// content chunks and `"stop"` on the last one.
#[must_use]
pub fn text_chunk(id: &str, created: u64, model: &str, text: &str, finish: bool) -> Value {
    json!({
        "id": id,
        "object": "text_completion",
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "text": text,
            "finish_reason": if finish { Value::from("stop") } else { Value::Null },
            "logprobs": null
        }]
    })
}

/// One entry of the model listing.
#[must_use]
pub fn model_object(id: &str, created: u64, owned_by: &str) -> Value {
    json!({"id": id, "object": "model", "created": created, "owned_by": owned_by})
}

#[cfg(test)]
mod tests {
    use super::*;
    use freegpt_types::Usage;

    fn is_hex(s: &str) -> bool {
        s.chars().all(|c| c.is_ascii_hexdigit())
    }

    #[test]
    fn test_ids() {
        let id = chat_completion_id();
        let suffix = id.strip_prefix("chatcmpl-").unwrap();
        assert_eq!(suffix.len(), 24);
        assert!(is_hex(suffix));
        assert_ne!(chat_completion_id(), id);

        let id = text_completion_id();
        assert_eq!(id.strip_prefix("cmpl-").unwrap().len(), 24);
    }

    #[test]
    fn test_chat_completion_envelope() {
        let c = Completion {
            text: "hello".into(),
            usage: Usage::new(3, 1),
        };
        let v = chat_completion("chatcmpl-x", 1_700_000_000, "gpt-4.1", &c);
        assert_eq!(v["object"], "chat.completion");
        assert_eq!(v["created"], 1_700_000_000_u64);
        assert_eq!(v["choices"][0]["message"]["role"], "assistant");
        assert_eq!(v["choices"][0]["message"]["content"], "hello");
        assert_eq!(v["choices"][0]["finish_reason"], "stop");
        assert_eq!(v["usage"]["total_tokens"], 4);
    }

    #[test]
    fn test_chunks() {
        let c = chat_chunk("id", 1, "m", "Hi");
        assert_eq!(c["object"], "chat.completion.chunk");
        assert_eq!(c["choices"][0]["delta"]["content"], "Hi");
        assert!(c["choices"][0]["finish_reason"].is_null());

        let f = chat_final_chunk("id", 1, "m");
        assert_eq!(f["choices"][0]["delta"], json!({}));
        assert_eq!(f["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn test_text_completion_envelopes() {
        let c = Completion {
            text: "ok".into(),
            usage: Usage::default(),
        };
        let v = text_completion("cmpl-x", 1, "m", &c);
        assert_eq!(v["object"], "text_completion");
        assert_eq!(v["choices"][0]["text"], "ok");
        assert!(v["choices"][0]["logprobs"].is_null());

        assert!(text_chunk("cmpl-x", 1, "m", "a", false)["choices"][0]["finish_reason"].is_null());
        assert_eq!(
            text_chunk("cmpl-x", 1, "m", "", true)["choices"][0]["finish_reason"],
            "stop"
        );
    }

    #[test]
    fn test_sse_frame() {
        assert_eq!(sse_frame(&json!({"a": 1})), "data: {\"a\":1}\n\n");
        assert_eq!(DONE_FRAME, "data: [DONE]\n\n");
    }
}

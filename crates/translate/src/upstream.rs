//! Upstream chat request body and non-streaming response handling.

use freegpt_types::{Completion, Message, SamplingParams, Usage};
use serde::Serialize;
use serde_json::{
    Value, json,
    ser::{Formatter, Serializer},
};
use std::io;

/// Build the upstream chat body: `{intent, model, temperature, top_p, n, stream, messages}`.
///
/// Messages are forwarded in order with role and content untouched.
#[must_use]
pub fn to_upstream_body(
    model: &str,
    messages: &[Message],
    params: &SamplingParams,
    stream: bool,
) -> Value {
    json!({
        "intent": false,
        "model": model,
        "temperature": params.temperature,
        "top_p": params.top_p,
        "n": params.n,
        "stream": stream,
        "messages": messages,
    })
}

/// Read the conversation back out of an upstream body.
///
/// # Errors
///
/// Returns an error if `messages` is missing or not a list of messages.
pub fn messages_of(body: &Value) -> serde_json::Result<Vec<Message>> {
    serde_json::from_value(body.get("messages").cloned().unwrap_or(Value::Null))
}

/// Turn a successful non-streaming upstream response into a [`Completion`].
///
/// Missing content reads as `""`. Usage is taken from the response when
/// present and well-formed, otherwise estimated with [`estimate_usage`].
#[must_use]
pub fn parse_completion(resp: &Value, messages: &[Message]) -> Completion {
    let text = resp
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let usage = resp
        .get("usage")
        .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok())
        .unwrap_or_else(|| estimate_usage(messages, &text));

    Completion { text, usage }
}

/// Four-characters-per-token estimate.
///
/// `prompt_tokens` is the length of the JSON-serialized message list
/// (Python `json.dumps` layout) divided by 4, `completion_tokens` the
/// completion's character count divided by 4. Integer division throughout.
#[must_use]
pub fn estimate_usage(messages: &[Message], completion: &str) -> Usage {
    let prompt = python_json_len(messages) / 4;
    let completion = completion.chars().count() / 4;
    Usage::new(prompt as u64, completion as u64)
}

/// Length of `value` serialized with `", "` / `": "` separators and every
/// non-ASCII character escaped as `\uXXXX`.
#[must_use]
pub fn python_json_len<T: Serialize + ?Sized>(value: &T) -> usize {
    let mut ser = Serializer::with_formatter(Vec::new(), PythonFormatter);
    match value.serialize(&mut ser) {
        Ok(()) => ser.into_inner().len(),
        Err(_) => 0,
    }
}

struct PythonFormatter;

impl Formatter for PythonFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut units = [0u16; 2];
        let mut utf8 = [0u8; 4];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(ch.encode_utf8(&mut utf8).as_bytes())?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

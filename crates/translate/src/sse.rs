//! Line grammar of the upstream event stream.
//!
//! ```text
//! line ::= "data: " json-object
//!        | "data: [DONE]"
//!        | other            (ignored)
//! ```
//!
//! A line with the `data: ` prefix whose payload is not a JSON object is
//! `other`, never an error.

use serde_json::Value;

/// One classified line of the upstream body.
#[derive(Debug, Clone, PartialEq)]
pub enum SseLine {
    /// A `data: {...}` event.
    Data(Value),
    /// The `data: [DONE]` terminator.
    Done,
    /// Blank lines, keep-alives, comments, malformed payloads.
    Other,
}

/// Classify a single line. Trailing `\r`/`\n` are ignored.
#[must_use]
pub fn parse_line(line: &str) -> SseLine {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(data) = line.strip_prefix("data: ") else {
        return SseLine::Other;
    };
    if data.trim() == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<Value>(data) {
        Ok(v) if v.is_object() => SseLine::Data(v),
        _ => SseLine::Other,
    }
}

/// `choices[0].delta.content` when it is a non-empty string.
#[must_use]
pub fn delta_content(event: &Value) -> Option<&str> {
    event
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// The fragment carried by `line`, if any.
#[must_use]
pub fn fragment_text(line: &str) -> Option<String> {
    match parse_line(line) {
        SseLine::Data(event) => delta_content(&event).map(str::to_string),
        SseLine::Done | SseLine::Other => None,
    }
}

/// Reassembles lines from arbitrarily split body chunks.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let nl = self.buf.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.buf.drain(..=nl).collect();
        let line = String::from_utf8_lossy(&raw);
        Some(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Take the unterminated remainder once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_line_variants() {
        assert_eq!(
            parse_line(r#"data: {"a":1}"#),
            SseLine::Data(json!({"a": 1}))
        );
        assert_eq!(parse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_line("data: [DONE]\r"), SseLine::Done);
        assert_eq!(parse_line(""), SseLine::Other);
        assert_eq!(parse_line(": keep-alive"), SseLine::Other);
        assert_eq!(parse_line("data: {not json"), SseLine::Other);
        assert_eq!(parse_line("data: 42"), SseLine::Other);
        assert_eq!(parse_line(r#"data:{"a":1}"#), SseLine::Other);
    }

    #[test]
    fn test_delta_content() {
        let ev = json!({"choices": [{"delta": {"content": "Hi"}}]});
        assert_eq!(delta_content(&ev), Some("Hi"));
        assert_eq!(delta_content(&json!({"choices": [{"delta": {}}]})), None);
        assert_eq!(
            delta_content(&json!({"choices": [{"delta": {"content": ""}}]})),
            None
        );
        assert_eq!(
            delta_content(&json!({"choices": [{"delta": {"content": null}}]})),
            None
        );
        assert_eq!(delta_content(&json!({"choices": []})), None);
    }

    #[test]
    fn test_skips_empty_delta_and_garbage() {
        let lines = [
            r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#,
            "",
            r#"data: {"choices":[{"delta":{}}]}"#,
            "garbage",
        ];
        let out: Vec<String> = lines.iter().copied().filter_map(fragment_text).collect();
        assert_eq!(out, vec!["Hi".to_string()]);
    }

    #[test]
    fn test_splitter_joins_split_chunks() {
        let mut s = LineSplitter::new();
        s.push(b"data: {\"choices\":[{\"delta\":");
        assert!(s.next_line().is_none());
        s.push(b"{\"content\":\"x\"}}]}\r\ndata: [DO");
        let line = s.next_line().unwrap();
        assert_eq!(fragment_text(&line).as_deref(), Some("x"));
        assert!(s.next_line().is_none());
        s.push(b"NE]");
        assert_eq!(s.finish().as_deref(), Some("data: [DONE]"));
        assert!(s.finish().is_none());
    }

    #[test]
    fn test_splitter_multibyte_across_chunks() {
        let text = "data: {\"choices\":[{\"delta\":{\"content\":\"é\"}}]}\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut s = LineSplitter::new();
        s.push(&text[..split]);
        assert!(s.next_line().is_none());
        s.push(&text[split..]);
        assert_eq!(fragment_text(&s.next_line().unwrap()).as_deref(), Some("é"));
    }
}

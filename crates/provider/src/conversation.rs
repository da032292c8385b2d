//! Shared conversation history for the interactive chat client.

use freegpt_types::{
    ChatBackend, ChatRequest, Completion, Fragment, Message, SamplingParams, traits::Result,
};
use futures_util::StreamExt as _;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Ordered, append-only turn history shared across calls.
///
/// Each call appends the user turn before contacting the backend and the
/// assistant turn afterwards, even when the reply is empty. The lock is
/// never held while waiting on the backend.
#[derive(Debug, Clone)]
pub struct Conversation {
    turns: Arc<Mutex<Vec<Message>>>,
    model: String,
    params: SamplingParams,
}

impl Conversation {
    pub fn new(model: impl Into<String>, params: SamplingParams) -> Self {
        Self {
            turns: Arc::default(),
            model: model.into(),
            params,
        }
    }

    /// Copy of the history so far.
    pub async fn history(&self) -> Vec<Message> {
        self.turns.lock().await.clone()
    }

    /// Append `message` and return the history including it.
    async fn push_and_snapshot(&self, message: Message) -> Vec<Message> {
        let mut turns = self.turns.lock().await;
        turns.push(message);
        turns.clone()
    }

    async fn push(&self, message: Message) {
        self.turns.lock().await.push(message);
    }

    fn request(&self, messages: Vec<Message>, stream: bool) -> ChatRequest {
        ChatRequest {
            params: self.params,
            stream,
            ..ChatRequest::new(self.model.clone(), messages)
        }
    }

    /// Send `prompt` with the full history and wait for the whole reply.
    ///
    /// # Errors
    ///
    /// Returns the backend's session error; the (empty) assistant turn is
    /// still recorded.
    pub async fn ask(&self, backend: &dyn ChatBackend, prompt: &str) -> Result<Completion> {
        let messages = self.push_and_snapshot(Message::user(prompt)).await;
        let result = backend.complete(&self.request(messages, false)).await;
        let reply = result.as_ref().map_or("", |c| c.text.as_str());
        self.push(Message::assistant(reply)).await;
        result
    }

    /// Streaming variant of [`Conversation::ask`]. `on_text` sees every
    /// fragment as it arrives, including rendered errors; only model text is
    /// recorded in the history.
    ///
    /// # Errors
    ///
    /// Returns the backend's session error; the (empty) assistant turn is
    /// still recorded.
    pub async fn ask_streaming(
        &self,
        backend: &dyn ChatBackend,
        prompt: &str,
        mut on_text: impl FnMut(&str),
    ) -> Result<String> {
        let messages = self.push_and_snapshot(Message::user(prompt)).await;
        let mut fragments = match backend.stream(&self.request(messages, true)).await {
            Ok(s) => s,
            Err(e) => {
                self.push(Message::assistant("")).await;
                return Err(e);
            }
        };

        let mut reply = String::new();
        while let Some(fragment) = fragments.next().await {
            match &fragment {
                Fragment::Text(text) => reply.push_str(text),
                Fragment::Error(_) => {}
                Fragment::Done => break,
            }
            if let Some(text) = fragment.to_text() {
                on_text(&text);
            }
        }
        self.push(Message::assistant(reply.clone())).await;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use freegpt_types::{FragmentStream, GatewayError, Role, Usage};
    use futures_util::stream;
    use std::sync::Mutex as StdMutex;

    /// Echoes the number of turns it was sent; records each request.
    #[derive(Default)]
    struct Recorder {
        seen: StdMutex<Vec<ChatRequest>>,
        reply: String,
        fail: bool,
    }

    #[async_trait]
    impl ChatBackend for Recorder {
        async fn complete(&self, request: &ChatRequest) -> Result<Completion> {
            self.seen.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(GatewayError::GrantMissing);
            }
            Ok(Completion {
                text: self.reply.clone(),
                usage: Usage::default(),
            })
        }

        async fn stream(&self, request: &ChatRequest) -> Result<FragmentStream> {
            self.seen.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(GatewayError::AuthorizationPending);
            }
            Ok(Box::pin(stream::iter([
                Fragment::Text("a".into()),
                Fragment::Text("b".into()),
                Fragment::Error("cut".into()),
                Fragment::Done,
            ])))
        }

        fn supported_models(&self) -> Vec<String> {
            vec!["gpt-4.1".into()]
        }
    }

    fn conversation() -> Conversation {
        Conversation::new("gpt-4.1", SamplingParams::default())
    }

    #[tokio::test]
    async fn test_history_accumulates() {
        let backend = Recorder {
            reply: "pong".into(),
            ..Recorder::default()
        };
        let conv = conversation();
        conv.ask(&backend, "ping").await.unwrap();
        conv.ask(&backend, "again").await.unwrap();

        let history = conv.history().await;
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(history[1].content, "pong");

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].messages.len(), 1);
        assert_eq!(seen[1].messages.len(), 3);
        assert_eq!(seen[1].messages[2].content, "again");
    }

    #[tokio::test]
    async fn test_empty_reply_is_recorded() {
        let backend = Recorder::default();
        let conv = conversation();
        conv.ask(&backend, "hi").await.unwrap();
        let history = conv.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1], Message::assistant(""));
    }

    #[tokio::test]
    async fn test_failure_still_records_turns() {
        let backend = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let conv = conversation();
        assert!(conv.ask(&backend, "hi").await.is_err());
        assert!(conv.ask_streaming(&backend, "hi", |_| {}).await.is_err());
        assert_eq!(conv.history().await.len(), 4);
    }

    #[tokio::test]
    async fn test_streaming_records_text_only() {
        let backend = Recorder::default();
        let conv = conversation();
        let mut printed = String::new();
        let reply = conv
            .ask_streaming(&backend, "hi", |t| printed.push_str(t))
            .await
            .unwrap();
        assert_eq!(reply, "ab");
        assert_eq!(printed, "abError: cut");
        assert_eq!(conv.history().await[1].content, "ab");
        assert!(backend.seen.lock().unwrap()[0].stream);
    }

    #[tokio::test]
    async fn test_clones_share_history() {
        let backend = Recorder::default();
        let conv = conversation();
        let other = conv.clone();
        other.ask(&backend, "hi").await.unwrap();
        assert_eq!(conv.history().await.len(), 2);
    }
}

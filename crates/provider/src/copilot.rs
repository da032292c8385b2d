//! GitHub Copilot chat executor.
//!
//! Auth: a Credential from the [`SessionManager`], refreshed once on 401/403.
//! Format: OpenAI-shaped body with Copilot extras; responses are parsed by
//! `freegpt-translate`.

use crate::registry::ModelMap;
use async_trait::async_trait;
use freegpt_auth::{SessionManager, copilot as auth};
use freegpt_translate::{
    LineSplitter, SseLine, parse_completion,
    sse::{self, delta_content},
    to_upstream_body,
};
use freegpt_types::{
    ChatRequest, Completion, Credential, Fragment, GatewayError, Message, Role,
    traits::{ByteStream, ChatBackend, FragmentStream, Result},
};
use futures_util::{StreamExt as _, stream};
use rquest::Client;
use serde_json::Value;
use std::sync::Arc;

const INTEGRATION_ID: &str = "vscode-chat";
const OPENAI_INTENT: &str = "conversation-panel";
const GITHUB_API_VERSION: &str = "2025-04-01";

/// Outcome of one chat POST after the credential retry.
enum Attempt {
    Response(rquest::Response),
    /// Transport failure or non-2xx; carries the client-visible message.
    Failed(String),
}

/// Executor for the GitHub Copilot chat API.
pub struct CopilotExecutor {
    http: Client,
    sessions: Arc<SessionManager>,
    models: ModelMap,
}

impl CopilotExecutor {
    pub fn new(http: Client, sessions: Arc<SessionManager>, models: ModelMap) -> Self {
        Self {
            http,
            sessions,
            models,
        }
    }

    #[must_use]
    pub fn models(&self) -> &ModelMap {
        &self.models
    }

    /// `X-Initiator`: `agent` once the conversation has an assistant turn.
    fn initiator(messages: &[Message]) -> &'static str {
        if messages.iter().any(|m| m.role == Role::Assistant) {
            "agent"
        } else {
            "user"
        }
    }

    fn request(&self, credential: &Credential, body: &Value, initiator: &str) -> rquest::RequestBuilder {
        self.http
            .post(credential.chat_url())
            .header("authorization", format!("Bearer {}", credential.token))
            .header("user-agent", auth::USER_AGENT)
            .header("editor-version", auth::EDITOR_VERSION)
            .header("editor-plugin-version", auth::PLUGIN_VERSION)
            .header("openai-intent", OPENAI_INTENT)
            .header("copilot-integration-id", INTEGRATION_ID)
            .header("x-github-api-version", GITHUB_API_VERSION)
            .header("x-initiator", initiator)
            .header("content-type", "application/json")
            .json(body)
    }

    /// POST the chat body, re-exchanging the Grant once if the Credential is
    /// rejected.
    ///
    /// `Err` only when the operator has to authorize; every other failure,
    /// including a transient credential exchange error, is `Attempt::Failed`.
    async fn post_chat(&self, body: &Value, messages: &[Message]) -> Result<Attempt> {
        let initiator = Self::initiator(messages);
        let mut refreshed = false;
        loop {
            let credential = match self.sessions.credential().await {
                Ok(c) => c,
                Err(e) if e.needs_authorization() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "credential exchange failed");
                    return Ok(Attempt::Failed(e.to_string()));
                }
            };
            let resp = match self.request(&credential, body, initiator).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(error = %e, "upstream chat request failed");
                    return Ok(Attempt::Failed(e.to_string()));
                }
            };

            let status = resp.status();
            if status.is_success() {
                return Ok(Attempt::Response(resp));
            }

            let code = status.as_u16();
            let err = GatewayError::CredentialRejected { status: code };
            if err.is_auth_rejection() {
                self.sessions.invalidate(&credential);
                if !refreshed {
                    tracing::warn!(status = code, "upstream rejected credential, refreshing");
                    refreshed = true;
                    continue;
                }
            }
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!(status = code, body = %text, "upstream chat returned an error");
            return Ok(Attempt::Failed(code.to_string()));
        }
    }
}

/// Turn an upstream SSE body into fragments.
///
/// Text for every `choices[0].delta.content`, then exactly one
/// [`Fragment::Done`] when the body ends, on `data: [DONE]`, or after a
/// single [`Fragment::Error`] if the transport fails mid-stream. Dropping
/// the returned stream drops `inner`.
pub fn fragments(inner: ByteStream) -> FragmentStream {
    struct State {
        inner: Option<ByteStream>,
        lines: LineSplitter,
        tail: Option<Fragment>,
    }

    Box::pin(stream::unfold(
        State {
            inner: Some(inner),
            lines: LineSplitter::new(),
            tail: None,
        },
        |mut s| async move {
            loop {
                if let Some(last) = s.tail.take() {
                    return Some((last, s));
                }
                let inner = s.inner.as_mut()?;

                if let Some(line) = s.lines.next_line() {
                    match sse::parse_line(&line) {
                        SseLine::Data(event) => {
                            if let Some(text) = delta_content(&event) {
                                return Some((Fragment::Text(text.to_string()), s));
                            }
                        }
                        SseLine::Done => {
                            s.inner = None;
                            return Some((Fragment::Done, s));
                        }
                        SseLine::Other => {}
                    }
                    continue;
                }

                let next = inner.next().await;
                match next {
                    Some(Ok(chunk)) => s.lines.push(&chunk),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "upstream stream interrupted");
                        s.inner = None;
                        s.tail = Some(Fragment::Done);
                        return Some((Fragment::Error(e.to_string()), s));
                    }
                    None => {
                        s.inner = None;
                        let last = s.lines.finish().as_deref().and_then(sse::fragment_text);
                        return Some(match last {
                            Some(text) => {
                                s.tail = Some(Fragment::Done);
                                (Fragment::Text(text), s)
                            }
                            None => (Fragment::Done, s),
                        });
                    }
                }
            }
        },
    ))
}

#[async_trait]
impl ChatBackend for CopilotExecutor {
    async fn complete(&self, request: &ChatRequest) -> Result<Completion> {
        let model = self.models.resolve(&request.model);
        let body = to_upstream_body(model, &request.messages, &request.params, false);
        tracing::debug!(model, messages = request.messages.len(), "upstream chat");

        Ok(match self.post_chat(&body, &request.messages).await? {
            Attempt::Response(resp) => match resp.json::<Value>().await {
                Ok(json) => parse_completion(&json, &request.messages),
                Err(e) => Completion::error(e),
            },
            Attempt::Failed(message) => Completion::error(message),
        })
    }

    async fn stream(&self, request: &ChatRequest) -> Result<FragmentStream> {
        let model = self.models.resolve(&request.model);
        let body = to_upstream_body(model, &request.messages, &request.params, true);
        tracing::debug!(model, messages = request.messages.len(), "upstream chat stream");

        Ok(match self.post_chat(&body, &request.messages).await? {
            Attempt::Response(resp) => {
                let bytes: ByteStream =
                    Box::pin(resp.bytes_stream().map(|r| r.map_err(GatewayError::from)));
                fragments(bytes)
            }
            Attempt::Failed(message) => Box::pin(stream::iter([
                Fragment::Error(message),
                Fragment::Done,
            ])),
        })
    }

    fn supported_models(&self) -> Vec<String> {
        self.models.names()
    }
}

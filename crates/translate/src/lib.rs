//! Protocol translation between the OpenAI chat API and the upstream
//! Copilot chat protocol.
//!
//! All functions here are pure; the upstream I/O lives in `freegpt-provider`.

pub mod openai;
pub mod sse;
pub mod upstream;

pub use sse::{LineSplitter, SseLine};
pub use upstream::{estimate_usage, parse_completion, to_upstream_body};

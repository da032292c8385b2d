//! Local API token store persisted as one JSON object keyed by token.
//!
//! The whole collection is the unit of persistence: every mutation reloads
//! the file, applies the change, and rewrites the file, all under one async
//! mutex so concurrent requests never lose each other's updates.
//!
//! A failed write is logged and swallowed. The change stays effective in
//! memory, and the store stops reloading from disk until a later write
//! succeeds, so a revocation on a read-only filesystem holds for the rest of
//! the process but will not survive a restart.
//!
//! A file that exists but cannot be parsed is never overwritten. The store
//! runs from memory and keeps re-reading it, merging its in-memory records
//! back in once the file parses again.
//!
//! Timestamps are written as Unix seconds. Files written by older tools that
//! stored ISO-8601 strings (with or without an offset; naive means UTC) are
//! read as well.

use freegpt_types::token::now_unix;
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::sync::Mutex;

/// Prefix that makes issued tokens recognizable.
pub const TOKEN_PREFIX: &str = "sk-";

/// Characters of a token shown by [`ApiTokenStore::list`].
const REDACTED_LEN: usize = 15;

fn default_active() -> bool {
    true
}

/// A stored timestamp in any of the shapes found in token files.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTime {
    Unix(u64),
    Float(f64),
    Text(String),
}

impl RawTime {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn into_unix(self) -> Option<u64> {
        match self {
            RawTime::Unix(secs) => Some(secs),
            RawTime::Float(secs) if secs.is_finite() && secs >= 0.0 => Some(secs as u64),
            RawTime::Float(_) => None,
            RawTime::Text(text) => parse_timestamp(&text),
        }
    }
}

/// Unix seconds from an RFC 3339 string, a naive ISO-8601 string, or digits.
/// Empty and "never" mean no timestamp.
fn parse_timestamp(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("never") {
        return None;
    }
    if let Ok(secs) = text.parse::<u64>() {
        return Some(secs);
    }
    let secs = chrono::DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.timestamp())
        .or_else(|_| text.parse::<chrono::NaiveDateTime>().map(|dt| dt.and_utc().timestamp()));
    match secs {
        Ok(secs) => Some(u64::try_from(secs).unwrap_or(0)),
        Err(e) => {
            tracing::debug!(value = text, error = %e, "unrecognized timestamp in token store");
            None
        }
    }
}

fn unix_seconds<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(Option::<RawTime>::deserialize(d)?
        .and_then(RawTime::into_unix)
        .unwrap_or(0))
}

fn opt_unix_seconds<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    Ok(Option::<RawTime>::deserialize(d)?.and_then(RawTime::into_unix))
}

/// Persisted metadata for one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub name: String,
    /// Unix seconds; 0 when the stored value was unrecognizable.
    #[serde(default, deserialize_with = "unix_seconds")]
    pub created_at: u64,
    /// Unix seconds of the last successful validation; `None` means never.
    #[serde(default, deserialize_with = "opt_unix_seconds")]
    pub last_used: Option<u64>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Listing entry with the token itself redacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub token_prefix: String,
    pub name: String,
    pub created_at: u64,
    pub last_used: Option<u64>,
    pub active: bool,
}

struct Inner {
    records: BTreeMap<String, TokenRecord>,
    /// Set after a failed write: memory is authoritative until a write succeeds.
    degraded: bool,
    /// The file exists but does not parse; it must not be written over.
    unreadable: bool,
}

/// JSON-file-backed store of gateway API tokens.
pub struct ApiTokenStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl ApiTokenStore {
    /// Opens the store at `path`. A missing file starts empty; an unreadable
    /// one starts empty and degraded, and is left untouched on disk.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut inner = Inner {
            records: BTreeMap::new(),
            degraded: false,
            unreadable: false,
        };
        match read_records(&path).await {
            Ok(records) => inner.records = records,
            Err(e) => mark_unreadable(&path, &mut inner, &e),
        }
        Self {
            path,
            inner: Mutex::new(inner),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates and persists a new active token named `name`.
    ///
    /// The token is `sk-` followed by 32 random bytes in hex. Collisions are
    /// not checked.
    pub async fn generate(&self, name: &str) -> String {
        let token = format!("{TOKEN_PREFIX}{}", hex::encode(rand::random::<[u8; 32]>()));
        let mut inner = self.inner.lock().await;
        self.reload(&mut inner).await;
        inner.records.insert(
            token.clone(),
            TokenRecord {
                name: name.to_string(),
                created_at: now_unix(),
                last_used: None,
                active: true,
            },
        );
        self.persist(&mut inner).await;
        tracing::info!(name, "api token created");
        token
    }

    /// Returns `true` for a known, active token and records its use.
    ///
    /// Not a pure read: a successful validation rewrites the store.
    pub async fn validate(&self, token: &str) -> bool {
        let mut inner = self.inner.lock().await;
        self.reload(&mut inner).await;
        let Some(record) = inner.records.get_mut(token) else {
            return false;
        };
        if !record.active {
            return false;
        }
        record.last_used = Some(now_unix());
        self.persist(&mut inner).await;
        true
    }

    /// All records, with tokens redacted to a short prefix.
    pub async fn list(&self) -> Vec<TokenInfo> {
        let mut inner = self.inner.lock().await;
        self.reload(&mut inner).await;
        inner
            .records
            .iter()
            .map(|(token, r)| TokenInfo {
                token_prefix: redact(token),
                name: r.name.clone(),
                created_at: r.created_at,
                last_used: r.last_used,
                active: r.active,
            })
            .collect()
    }

    /// Deactivates the first token starting with `prefix`.
    pub async fn revoke(&self, prefix: &str) -> bool {
        if prefix.is_empty() {
            return false;
        }
        let mut inner = self.inner.lock().await;
        self.reload(&mut inner).await;
        let Some(record) = inner
            .records
            .iter_mut()
            .find(|(token, _)| token.starts_with(prefix))
            .map(|(_, r)| r)
        else {
            return false;
        };
        record.active = false;
        self.persist(&mut inner).await;
        tracing::info!(prefix, "api token revoked");
        true
    }

    /// Removes the first token starting with `prefix`.
    pub async fn delete(&self, prefix: &str) -> bool {
        if prefix.is_empty() {
            return false;
        }
        let mut inner = self.inner.lock().await;
        self.reload(&mut inner).await;
        let Some(token) = inner
            .records
            .keys()
            .find(|token| token.starts_with(prefix))
            .cloned()
        else {
            return false;
        };
        inner.records.remove(&token);
        self.persist(&mut inner).await;
        tracing::info!(prefix, "api token deleted");
        true
    }

    /// Whether the store holds no records at all (active or not).
    pub async fn is_empty(&self) -> bool {
        let mut inner = self.inner.lock().await;
        self.reload(&mut inner).await;
        inner.records.is_empty()
    }

    /// Whether the last write failed and changes are memory-only.
    pub async fn is_degraded(&self) -> bool {
        self.inner.lock().await.degraded
    }

    /// Picks up changes made by other processes (e.g. the admin CLI).
    async fn reload(&self, inner: &mut Inner) {
        if inner.degraded && !inner.unreadable {
            return;
        }
        match read_records(&self.path).await {
            Ok(mut records) => {
                if inner.unreadable {
                    tracing::info!(path = %self.path.display(), "token store is readable again");
                    for (token, record) in std::mem::take(&mut inner.records) {
                        records.entry(token).or_insert(record);
                    }
                    inner.unreadable = false;
                    inner.degraded = false;
                }
                inner.records = records;
            }
            Err(e) => mark_unreadable(&self.path, inner, &e),
        }
    }

    async fn persist(&self, inner: &mut Inner) {
        if inner.unreadable {
            return;
        }
        match write_records(&self.path, &inner.records).await {
            Ok(()) => inner.degraded = false,
            Err(e) => {
                if !inner.degraded {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "token store is not writable; changes are kept in memory only"
                    );
                }
                inner.degraded = true;
            }
        }
    }
}

fn redact(token: &str) -> String {
    match token.char_indices().nth(REDACTED_LEN) {
        Some((idx, _)) => format!("{}...", &token[..idx]),
        None => token.to_string(),
    }
}

fn mark_unreadable(path: &Path, inner: &mut Inner, error: &std::io::Error) {
    if !inner.unreadable {
        tracing::warn!(
            path = %path.display(),
            error = %error,
            "token store cannot be parsed; leaving it untouched and keeping changes in memory"
        );
    }
    inner.unreadable = true;
    inner.degraded = true;
}

/// Empty for a missing or blank file.
async fn read_records(path: &Path) -> std::io::Result<BTreeMap<String, TokenRecord>> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e),
    };
    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(&text)?)
}

async fn write_records(path: &Path, records: &BTreeMap<String, TokenRecord>) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(records).map_err(std::io::Error::other)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await
}

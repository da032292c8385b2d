//! Upstream session lifecycle: Grant → short-lived Credential.
//!
//! The [`SessionManager`] owns the only cached [`Credential`] in the process.
//! Reads are lock-free through [`ArcSwapOption`]; exchanges are serialized so
//! that concurrent requests arriving with a stale cache trigger a single call
//! to the credential endpoint.
//!
//! ```text
//! NoGrant ──device flow──▶ HasGrant ──exchange──▶ HasCredential
//!    ▲                        ▲                        │
//!    └──── grant rejected ────┴──── expired/invalid ───┘
//! ```

use crate::{copilot, flow};
use arc_swap::ArcSwapOption;
use freegpt_config::UpstreamConfig;
use freegpt_types::{Credential, GatewayError, GrantStore, traits::Result};
use serde_json::Value;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::sync::{Mutex, Notify};

/// Observable state of the upstream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No Grant stored and nobody is authorizing.
    NoGrant,
    /// The device flow is running and waiting for the user.
    AwaitingInteractiveAuth,
    /// A Grant is stored but no usable Credential is cached.
    HasGrant,
    /// A non-expired Credential is cached.
    HasCredential,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoGrant => "no grant",
            Self::AwaitingInteractiveAuth => "awaiting interactive authorization",
            Self::HasGrant => "grant stored",
            Self::HasCredential => "credential cached",
        })
    }
}

pub struct SessionManager {
    http: rquest::Client,
    grants: Arc<dyn GrantStore>,
    upstream: UpstreamConfig,
    credential: ArcSwapOption<Credential>,
    refresh_lock: Mutex<()>,
    authorizing: AtomicBool,
    reauth: Notify,
}

impl SessionManager {
    pub fn new(http: rquest::Client, grants: Arc<dyn GrantStore>, upstream: UpstreamConfig) -> Self {
        Self {
            http,
            grants,
            upstream,
            credential: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
            authorizing: AtomicBool::new(false),
            reauth: Notify::new(),
        }
    }

    /// The cached Credential, if present and not about to expire.
    #[must_use]
    pub fn cached(&self) -> Option<Arc<Credential>> {
        self.credential.load_full().filter(|c| !c.is_expired())
    }

    /// Return a usable Credential, exchanging the Grant when the cache is
    /// empty or stale.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::GrantMissing`] / [`GatewayError::AuthorizationPending`]
    ///   when no Grant is stored.
    /// - [`GatewayError::GrantRejected`] when the upstream refuses the Grant;
    ///   the Grant is deleted before returning.
    /// - [`GatewayError::Upstream`] / [`GatewayError::Http`] on transient
    ///   exchange failures; the Grant is kept.
    pub async fn credential(&self) -> Result<Arc<Credential>> {
        if let Some(c) = self.cached() {
            return Ok(c);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another task may have refreshed while we waited.
        if let Some(c) = self.cached() {
            return Ok(c);
        }

        let Some(grant) = self.grants.load().await? else {
            self.reauth.notify_one();
            return Err(if self.authorizing.load(Ordering::Acquire) {
                GatewayError::AuthorizationPending
            } else {
                GatewayError::GrantMissing
            });
        };

        let credential = Arc::new(self.exchange(&grant).await?);
        self.credential.store(Some(Arc::clone(&credential)));
        tracing::info!(
            api_base = %credential.api_base,
            expires_at = ?credential.expires_at,
            "upstream credential refreshed"
        );
        Ok(credential)
    }

    /// Trade the Grant for a Credential.
    ///
    /// Only a 4xx other than 429 counts as a rejected Grant and deletes it.
    /// 5xx, 429, timeouts and transport errors are transient: the Grant is
    /// kept and the error goes back to the one caller.
    async fn exchange(&self, grant: &str) -> Result<Credential> {
        let req = self
            .http
            .get(&self.upstream.credential_url)
            .header("authorization", format!("token {grant}"))
            .header("accept", "application/json")
            .header("user-agent", copilot::USER_AGENT)
            .header("editor-version", copilot::EDITOR_VERSION)
            .header("editor-plugin-version", copilot::PLUGIN_VERSION);
        let resp = flow::bounded(req, &self.upstream).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let code = status.as_u16();
            let body = resp.text().await.unwrap_or_default();
            if status.is_client_error() && code != 429 {
                tracing::warn!(status = code, "upstream rejected the stored grant; removing it");
                if let Err(e) = self.grants.remove().await {
                    tracing::error!(error = %e, "failed to remove rejected grant");
                }
                self.credential.store(None);
                self.reauth.notify_one();
                return Err(GatewayError::GrantRejected { status: code });
            }
            tracing::warn!(status = code, "credential exchange failed");
            return Err(GatewayError::Upstream { status: code, body });
        }

        let json: Value = resp.json().await?;
        copilot::parse_credential_response(&json, &self.upstream.api_base)
    }

    /// Drop `stale` from the cache so the next call re-exchanges.
    ///
    /// A no-op when the cache already holds a different Credential, so a
    /// late failure on an old Credential cannot evict a fresh one.
    pub fn invalidate(&self, stale: &Arc<Credential>) {
        let prev = self
            .credential
            .compare_and_swap(&Some(Arc::clone(stale)), None::<Arc<Credential>>);
        if prev.as_ref().is_some_and(|p| Arc::ptr_eq(p, stale)) {
            tracing::debug!("upstream credential invalidated");
        }
    }

    /// Run the device flow and store the resulting Grant.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AuthorizationPending`] when another
    /// authorization is already running, or the device flow / storage error.
    pub async fn authorize_interactive(&self, open_browser: bool) -> Result<()> {
        if self.authorizing.swap(true, Ordering::AcqRel) {
            return Err(GatewayError::AuthorizationPending);
        }
        let result = flow::device_login(&self.http, &self.upstream, open_browser).await;
        self.authorizing.store(false, Ordering::Release);

        let grant = result?;
        self.grants.save(&grant).await?;
        self.credential.store(None);
        tracing::info!("upstream grant stored");
        Ok(())
    }

    /// Spawn the background authorizer.
    ///
    /// It runs the device flow whenever no Grant is stored, then sleeps until a
    /// request finds the Grant missing or the upstream rejects it.
    pub fn spawn_authorizer(self: &Arc<Self>, open_browser: bool) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let backoff = Duration::from_secs(this.upstream.poll_interval_secs.max(1));
            loop {
                match this.grants.load().await {
                    Ok(Some(_)) => this.reauth.notified().await,
                    Ok(None) => {
                        if let Err(e) = this.authorize_interactive(open_browser).await {
                            tracing::warn!(error = %e, "device authorization failed; retrying");
                            tokio::time::sleep(backoff).await;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to read grant");
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        })
    }

    /// Current session state.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant store cannot be read.
    pub async fn state(&self) -> Result<SessionState> {
        if self.cached().is_some() {
            return Ok(SessionState::HasCredential);
        }
        if self.authorizing.load(Ordering::Acquire) {
            return Ok(SessionState::AwaitingInteractiveAuth);
        }
        Ok(if self.grants.load().await?.is_some() {
            SessionState::HasGrant
        } else {
            SessionState::NoGrant
        })
    }

    /// Check whether a Grant is stored.
    pub async fn has_grant(&self) -> bool {
        matches!(self.grants.load().await, Ok(Some(_)))
    }

    /// Delete the Grant and forget the cached Credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant store fails to remove the Grant.
    pub async fn logout(&self) -> Result<()> {
        self.grants.remove().await?;
        self.credential.store(None);
        Ok(())
    }
}

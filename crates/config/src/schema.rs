use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_grant_path() -> PathBuf {
    PathBuf::from(".copilot_token")
}
fn default_tokens_path() -> PathBuf {
    PathBuf::from("api_tokens.json")
}
fn default_model() -> String {
    "gpt-4.1".to_string()
}
fn default_models() -> BTreeMap<String, String> {
    BTreeMap::from([("gpt-4.1".to_string(), "gpt-4.1".to_string())])
}

/// Endpoints and client identity used to talk to the upstream provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Public OAuth client ID used for the device flow.
    #[serde(default = "UpstreamConfig::default_client_id")]
    pub client_id: String,
    /// Device code request endpoint.
    #[serde(default = "UpstreamConfig::default_device_code_url")]
    pub device_code_url: String,
    /// OAuth token endpoint polled during the device flow.
    #[serde(default = "UpstreamConfig::default_oauth_token_url")]
    pub oauth_token_url: String,
    /// Grant → Credential exchange endpoint.
    #[serde(default = "UpstreamConfig::default_credential_url")]
    pub credential_url: String,
    /// Chat API base, used unless the exchange response names another.
    #[serde(default = "UpstreamConfig::default_api_base")]
    pub api_base: String,
    /// Lower bound for the device flow polling interval, in seconds.
    #[serde(default = "UpstreamConfig::default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Run the device flow in the background of `serve` when no Grant exists.
    #[serde(default = "default_true")]
    pub authorize_on_serve: bool,
    /// TCP connect timeout for every upstream call, in seconds. `0` disables it.
    #[serde(default = "UpstreamConfig::default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated while reading a response, streamed chunks
    /// included, in seconds. `0` disables it.
    #[serde(default = "UpstreamConfig::default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Whole-request limit for the short calls (device flow, credential
    /// exchange), in seconds. `0` disables it.
    #[serde(default = "UpstreamConfig::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl UpstreamConfig {
    fn default_client_id() -> String {
        "Iv1.b507a08c87ecfe98".to_string()
    }
    fn default_device_code_url() -> String {
        "https://github.com/login/device/code".to_string()
    }
    fn default_oauth_token_url() -> String {
        "https://github.com/login/oauth/access_token".to_string()
    }
    fn default_credential_url() -> String {
        "https://api.github.com/copilot_internal/v2/token".to_string()
    }
    fn default_api_base() -> String {
        "https://api.githubcopilot.com".to_string()
    }
    fn default_poll_interval_secs() -> u64 {
        5
    }
    fn default_connect_timeout_secs() -> u64 {
        10
    }
    fn default_read_timeout_secs() -> u64 {
        120
    }
    fn default_request_timeout_secs() -> u64 {
        30
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.read_timeout_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.request_timeout_secs)
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            client_id: Self::default_client_id(),
            device_code_url: Self::default_device_code_url(),
            oauth_token_url: Self::default_oauth_token_url(),
            credential_url: Self::default_credential_url(),
            api_base: Self::default_api_base(),
            poll_interval_secs: Self::default_poll_interval_secs(),
            authorize_on_serve: true,
            connect_timeout_secs: Self::default_connect_timeout_secs(),
            read_timeout_secs: Self::default_read_timeout_secs(),
            request_timeout_secs: Self::default_request_timeout_secs(),
        }
    }
}

/// Logging output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` wins when set.
    #[serde(default = "LogConfig::default_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
    /// Also append logs to this file.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LogConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            file: None,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Listen port (defaults to 8000).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen address (defaults to `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: String,
    /// Static bearer key accepted in addition to the token store.
    #[serde(default)]
    pub api_key: Option<String>,
    /// File holding the upstream Grant.
    #[serde(default = "default_grant_path")]
    pub grant_path: PathBuf,
    /// JSON file holding issued API tokens.
    #[serde(default = "default_tokens_path")]
    pub tokens_path: PathBuf,
    /// Upstream model used for names missing from `models`.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Client-facing model name → upstream model name.
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, String>,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Optional outbound HTTP proxy.
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            api_key: None,
            grant_path: default_grant_path(),
            tokens_path: default_tokens_path(),
            default_model: default_model(),
            models: default_models(),
            upstream: UpstreamConfig::default(),
            proxy_url: None,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Layers defaults ← optional YAML file ← environment.
    ///
    /// Environment: `PORT`, `OPENAI_API_KEY`, and any `FREEGPT_`-prefixed
    /// key (`FREEGPT_HOST`, `FREEGPT_API_KEY`, `FREEGPT_UPSTREAM__API_BASE`).
    /// A bare `HOST` is ignored: many shells export it as the machine name.
    /// `FREEGPT_*` wins over `PORT` and `OPENAI_API_KEY`.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> figment::Figment {
        use figment::{
            Figment,
            providers::{Env, Format as _, Serialized, Yaml},
        };
        let mut fig = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            fig = fig.merge(Yaml::file(path));
        }
        fig.merge(Env::raw().only(&["port"]))
            .merge(Env::raw().only(&["openai_api_key"]).map(|_| "api_key".into()))
            .merge(Env::prefixed("FREEGPT_").split("__"))
    }

    /// Loads configuration from an optional file plus the environment.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be parsed or a value has the wrong type.
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// Parses configuration from a YAML string, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
    }

    /// Whether any static key is configured.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
port: 9000
host: "127.0.0.1"
api_key: "sk-static"
default_model: "gpt-4o"
models:
  gpt-4.1: gpt-4.1
  fast: gpt-4o-mini
upstream:
  api_base: "http://localhost:9999"
  poll_interval_secs: 1
log:
  level: debug
  json: true
"#;

    #[test]
    fn test_default_config() {
        let c = Config::default();
        assert_eq!(c.port, 8000);
        assert_eq!(c.host, "0.0.0.0");
        assert!(c.api_key.is_none());
        assert_eq!(c.grant_path, PathBuf::from(".copilot_token"));
        assert_eq!(c.models.get("gpt-4.1").map(String::as_str), Some("gpt-4.1"));
        assert_eq!(c.upstream.poll_interval_secs, 5);
        assert!(c.upstream.authorize_on_serve);
    }

    #[test]
    fn test_from_yaml() {
        let c = Config::from_yaml(SAMPLE_YAML).unwrap();
        assert_eq!(c.port, 9000);
        assert_eq!(c.host, "127.0.0.1");
        assert_eq!(c.api_key.as_deref(), Some("sk-static"));
        assert_eq!(c.default_model, "gpt-4o");
        assert_eq!(c.models.len(), 2);
        assert_eq!(c.upstream.api_base, "http://localhost:9999");
        assert_eq!(c.upstream.poll_interval_secs, 1);
        assert!(c.log.json);
    }

    #[test]
    fn test_from_yaml_defaults_applied() {
        let c = Config::from_yaml("port: 1234").unwrap();
        assert_eq!(c.port, 1234);
        assert_eq!(c.host, "0.0.0.0");
        assert_eq!(c.upstream, UpstreamConfig::default());
    }

    #[test]
    fn test_partial_upstream_keeps_other_defaults() {
        let c = Config::from_yaml("upstream:\n  poll_interval_secs: 0\n").unwrap();
        assert_eq!(c.upstream.poll_interval_secs, 0);
        assert_eq!(c.upstream.client_id, "Iv1.b507a08c87ecfe98");
    }

    #[test]
    fn test_has_api_key() {
        let mut c = Config::default();
        assert!(!c.has_api_key());
        c.api_key = Some(String::new());
        assert!(!c.has_api_key());
        c.api_key = Some("sk-x".into());
        assert!(c.has_api_key());
    }

    #[test]
    fn test_load_file_then_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("freegpt.yaml", "port: 7000\napi_key: from-file\n")?;
            jail.set_env("FREEGPT_API_KEY", "from-env");
            jail.set_env("FREEGPT_UPSTREAM__API_BASE", "http://mock");
            let c = Config::load(Some(Path::new("freegpt.yaml")))?;
            assert_eq!(c.port, 7000);
            assert_eq!(c.api_key.as_deref(), Some("from-env"));
            assert_eq!(c.upstream.api_base, "http://mock");
            Ok(())
        });
    }

    #[test]
    fn test_bare_host_env_ignored() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("HOST", "build-runner-07");
            let c = Config::load(None)?;
            assert_eq!(c.host, "0.0.0.0");

            jail.set_env("FREEGPT_HOST", "127.0.0.1");
            let c = Config::load(None)?;
            assert_eq!(c.host, "127.0.0.1");
            Ok(())
        });
    }

    #[test]
    fn test_upstream_timeouts() {
        let c = Config::default();
        assert_eq!(c.upstream.connect_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(c.upstream.read_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(c.upstream.request_timeout(), Some(Duration::from_secs(30)));

        let c = Config::from_yaml("upstream:\n  read_timeout_secs: 0\n").unwrap();
        assert_eq!(c.upstream.read_timeout(), None);
        assert_eq!(c.upstream.connect_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_openai_api_key_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("OPENAI_API_KEY", "sk-openai");
            jail.set_env("PORT", "8123");
            let c = Config::load(None)?;
            assert_eq!(c.api_key.as_deref(), Some("sk-openai"));
            assert_eq!(c.port, 8123);
            Ok(())
        });
    }
}

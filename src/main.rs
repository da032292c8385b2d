use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use freegpt_auth::SessionManager;
use freegpt_config::{Config, LogConfig};
use freegpt_provider::{Conversation, CopilotExecutor, ModelMap};
use freegpt_proxy::AppState;
use freegpt_store::{ApiTokenStore, FileGrantStore};
use freegpt_types::{ChatBackend, SamplingParams};
use std::{io::Write as _, path::PathBuf, sync::Arc};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer as _, Registry, fmt, layer::SubscriberExt as _,
    util::SubscriberInitExt as _,
};

#[derive(Parser, Debug)]
#[command(name = "freegpt", version, about = "OpenAI-compatible gateway for GitHub Copilot chat")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the API server.
    Serve {
        /// Override the listening port (default: 8000).
        #[arg(short, long)]
        port: Option<u16>,
        /// Override the listening address (default: 0.0.0.0).
        #[arg(long)]
        host: Option<String>,
    },
    /// Authorize with GitHub through the device code flow.
    Login {
        /// Do not try to open the verification page in a browser.
        #[arg(long)]
        no_browser: bool,
    },
    /// Delete the stored upstream grant.
    Logout,
    /// Show upstream session and token store status.
    Status,
    /// Interactive chat in the terminal.
    Chat {
        /// Model name (mapped through the configured model table).
        #[arg(short, long)]
        model: Option<String>,
        /// Wait for each whole reply instead of streaming it.
        #[arg(long)]
        no_stream: bool,
    },
    /// Manage API tokens for the gateway.
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand, Debug)]
enum TokenAction {
    /// Issue a new token.
    Create {
        /// Label stored with the token.
        #[arg(default_value = "default")]
        name: String,
    },
    /// List tokens (redacted).
    List,
    /// Deactivate the first token starting with PREFIX.
    Revoke { prefix: String },
    /// Remove the first token starting with PREFIX.
    Delete { prefix: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("config error")?;
    let _guard = init_logging(&config.log)?;

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(config, port, host).await,
        Commands::Login { no_browser } => cmd_login(&config, !no_browser).await,
        Commands::Logout => cmd_logout(&config).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Chat { model, no_stream } => cmd_chat(&config, model, !no_stream).await,
        Commands::Token { action } => cmd_token(&config, action).await,
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `log.level`.
///
/// The returned guard flushes the log file on drop.
fn init_logging(log: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    let mut layers: Vec<Box<dyn tracing_subscriber::Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(if log.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().compact().with_writer(std::io::stderr).boxed()
    });

    let mut guard = None;
    if let Some(path) = &log.file {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        let name = path
            .file_name()
            .with_context(|| format!("log file has no name: {}", path.display()))?;
        std::fs::create_dir_all(dir)?;
        let (writer, g) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
        guard = Some(g);
        layers.push(if log.json {
            fmt::layer().json().with_writer(writer).boxed()
        } else {
            fmt::layer().with_ansi(false).with_writer(writer).boxed()
        });
    }

    tracing_subscriber::registry()
        .with(layers.with_filter(filter))
        .init();
    Ok(guard)
}

fn session_manager(config: &Config, http: rquest::Client) -> Arc<SessionManager> {
    Arc::new(SessionManager::new(
        http,
        Arc::new(FileGrantStore::new(&config.grant_path)),
        config.upstream.clone(),
    ))
}

fn http_client(config: &Config) -> Result<rquest::Client> {
    freegpt_proxy::build_http_client(config).context("failed to build HTTP client")
}

fn executor(config: &Config) -> Result<(Arc<SessionManager>, Arc<CopilotExecutor>)> {
    let http = http_client(config)?;
    let sessions = session_manager(config, http.clone());
    let executor = CopilotExecutor::new(http, Arc::clone(&sessions), ModelMap::from_config(config));
    Ok((sessions, Arc::new(executor)))
}

async fn cmd_serve(mut config: Config, port: Option<u16>, host: Option<String>) -> Result<()> {
    if let Some(p) = port {
        config.port = p;
    }
    if let Some(h) = host {
        config.host = h;
    }

    let (sessions, backend) = executor(&config)?;
    if config.upstream.authorize_on_serve {
        sessions.spawn_authorizer(false);
    } else if !sessions.has_grant().await {
        tracing::warn!("no upstream grant stored; run `freegpt login` before sending requests");
    }

    let tokens = Arc::new(ApiTokenStore::open(&config.tokens_path).await);
    if config.has_api_key() || !tokens.is_empty().await {
        tracing::info!("API key authentication is enabled");
    } else {
        tracing::warn!(
            "API key authentication is disabled (set FREEGPT_API_KEY or create a token to enable)"
        );
    }

    let addr = format!("{}:{}", config.host, config.port);
    let backend: Arc<dyn ChatBackend> = backend;
    let state = AppState::new(Arc::new(config), backend, tokens);
    let app = freegpt_proxy::make_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "freegpt listening");
    eprintln!("freegpt listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn cmd_login(config: &Config, open_browser: bool) -> Result<()> {
    let http = http_client(config)?;
    let sessions = session_manager(config, http);
    sessions
        .authorize_interactive(open_browser)
        .await
        .context("login failed")?;
    eprintln!("grant saved to {}", config.grant_path.display());
    Ok(())
}

async fn cmd_logout(config: &Config) -> Result<()> {
    let http = http_client(config)?;
    session_manager(config, http)
        .logout()
        .await
        .context("logout failed")?;
    eprintln!("logged out");
    Ok(())
}

async fn cmd_status(config: &Config) -> Result<()> {
    let http = http_client(config)?;
    let state = session_manager(config, http).state().await?;
    println!("upstream: {state}");

    let tokens = ApiTokenStore::open(&config.tokens_path).await;
    let count = tokens.list().await.len();
    let auth = if config.has_api_key() || count > 0 {
        "enabled"
    } else {
        "disabled"
    };
    println!("api tokens: {count} ({})", tokens.path().display());
    println!("authentication: {auth}");
    Ok(())
}

async fn cmd_chat(config: &Config, model: Option<String>, stream: bool) -> Result<()> {
    let (sessions, backend) = executor(config)?;
    if !sessions.has_grant().await {
        sessions.authorize_interactive(true).await.context("login failed")?;
    }

    let params = SamplingParams {
        temperature: 0.0,
        ..SamplingParams::default()
    };
    let conversation = Conversation::new(
        model.unwrap_or_else(|| config.default_model.clone()),
        params,
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!(">>> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }

        let reply = if stream {
            conversation
                .ask_streaming(backend.as_ref(), prompt, |text| {
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                })
                .await
        } else {
            conversation
                .ask(backend.as_ref(), prompt)
                .await
                .map(|completion| {
                    print!("{}", completion.text);
                    completion.text
                })
        };
        println!();
        if let Err(e) = reply {
            eprintln!("error: {e}");
            if e.needs_authorization() {
                sessions.authorize_interactive(true).await.context("login failed")?;
            }
        }
    }
    Ok(())
}

async fn cmd_token(config: &Config, action: TokenAction) -> Result<()> {
    let store = ApiTokenStore::open(&config.tokens_path).await;
    match action {
        TokenAction::Create { name } => {
            let token = store.generate(&name).await;
            println!("{token}");
            eprintln!("created token '{name}'; it will not be shown again");
        }
        TokenAction::List => {
            let tokens = store.list().await;
            if tokens.is_empty() {
                println!("no tokens");
            }
            for t in tokens {
                let last_used = t
                    .last_used
                    .map_or_else(|| "never".to_string(), |ts| ts.to_string());
                let state = if t.active { "active" } else { "revoked" };
                println!(
                    "{}  {:<16} created={} last_used={} {state}",
                    t.token_prefix, t.name, t.created_at, last_used
                );
            }
        }
        TokenAction::Revoke { prefix } => {
            if !store.revoke(&prefix).await {
                anyhow::bail!("no token matches '{prefix}'");
            }
            eprintln!("revoked");
        }
        TokenAction::Delete { prefix } => {
            if !store.delete(&prefix).await {
                anyhow::bail!("no token matches '{prefix}'");
            }
            eprintln!("deleted");
        }
    }
    if store.is_degraded().await {
        eprintln!("warning: {} could not be written", store.path().display());
    }
    Ok(())
}

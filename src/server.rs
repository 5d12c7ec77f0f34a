//! HTTP surface of the bot.
//!
//! `/webhook` is the Zoom event endpoint. Everything else is operator glue:
//! a health check, a small index page, the OAuth redirect landing page, and a
//! browser test console that can simulate webhooks and send messages directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::TokenCache;
use crate::chat::{ChatClient, MessageSender, OutboundMessage};
use crate::commands::CommandProcessor;
use crate::config::Config;
use crate::webhook::handle_webhook;

// The console page is embedded at compile time.
const CONSOLE_HTML: &str = include_str!("../console/index.html");
const CONSOLE_TOKEN_PLACEHOLDER: &str = "__VERIFICATION_TOKEN__";

const INDEX_HTML: &str = r#"<h1>🤖 Zoom Chat Bot</h1>
<p>The bot is running...</p>
<ul>
    <li><a href="/health">Health check</a></li>
    <li><a href="/test">Test console</a></li>
</ul>"#;

const OAUTH_SUCCESS_HTML: &str = r#"<h2>🎉 Zoom bot authorized!</h2>
<p>You have authorized the Zoom chat bot.</p>
<p>You can now talk to the bot in Zoom Team Chat.</p>
<p><strong>Try sending:</strong> hello or help</p>
<br>
<p><em>You can close this page.</em></p>"#;

const OAUTH_FAILURE_HTML: &str = r#"<h2>❌ Authorization failed</h2>
<p>Something went wrong during authorization, please try again.</p>
<p><a href="javascript:history.back()">Go back</a></p>"#;

const FALLBACK_ROBOT_JID: &str = "default_robot_jid";

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub commands: CommandProcessor,
    pub sender: Arc<dyn MessageSender>,
    started: Instant,
}

impl AppState {
    /// Build the production state: one token cache per process, shared by
    /// the chat client.
    pub fn new(config: Config) -> Self {
        let http = reqwest::Client::new();
        let tokens = Arc::new(TokenCache::new(http.clone(), config.zoom.clone()));
        let chat = ChatClient::new(http, tokens, config.zoom.api_base_url.clone());
        Self::with_sender(config, Arc::new(chat))
    }

    pub fn with_sender(config: Config, sender: Arc<dyn MessageSender>) -> Self {
        let commands = CommandProcessor::new(parse_timezone(&config.bot.timezone));
        Self {
            config,
            commands,
            sender,
            started: Instant::now(),
        }
    }
}

fn parse_timezone(name: &str) -> Tz {
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!("Unknown timezone '{}', falling back to Asia/Shanghai", name);
            chrono_tz::Asia::Shanghai
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/webhook", post(handle_webhook))
        .route("/health", get(health))
        .route("/oauth/callback", get(oauth_callback))
        .route("/test", get(serve_console))
        .route("/test-send-message", post(test_send_message))
        .with_state(state)
}

/// Bind `port` and serve until SIGINT or SIGTERM.
pub async fn run(state: Arc<AppState>, port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("🚀 Zoom chat bot started");
    info!("📡 Listening on port {}", port);
    info!("🌐 Webhook URL: http://localhost:{}/webhook", port);
    info!("🔧 Test console: http://localhost:{}/test", port);
    info!("💚 Health check: http://localhost:{}/health", port);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

// ── Handlers ───────────────────────────────────────────────────────────────────

async fn serve_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn serve_console(State(state): State<Arc<AppState>>) -> Html<String> {
    let token = state
        .config
        .zoom
        .verification_token
        .as_deref()
        .unwrap_or("test-token");
    // JSON string literal, with '<' escaped so it cannot close the script tag.
    let literal = serde_json::Value::from(token)
        .to_string()
        .replace('<', "\\u003c");
    Html(CONSOLE_HTML.replace(CONSOLE_TOKEN_PLACEHOLDER, &literal))
}

fn configured(value: &Option<String>) -> &'static str {
    match value.as_deref() {
        Some(v) if !v.is_empty() => "configured",
        _ => "missing",
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let zoom = &state.config.zoom;
    Json(serde_json::json!({
        "status": "running",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "uptime": state.started.elapsed().as_secs_f64(),
        "config": {
            "port": state.config.server.port,
            "clientId": configured(&zoom.client_id),
            "clientSecret": configured(&zoom.client_secret),
            "verificationToken": configured(&zoom.verification_token),
            "accountId": configured(&zoom.account_id),
        },
        "message": "🤖 Zoom chat bot is running",
    }))
}

#[derive(Deserialize)]
struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
}

async fn oauth_callback(Query(query): Query<OAuthCallback>) -> Response {
    info!(
        "OAuth callback: code={}, state={}",
        if query.code.is_some() { "provided" } else { "missing" },
        query.state.as_deref().unwrap_or("")
    );

    match query.code.as_deref() {
        Some(code) if !code.is_empty() => Html(OAUTH_SUCCESS_HTML).into_response(),
        _ => (StatusCode::BAD_REQUEST, Html(OAUTH_FAILURE_HTML)).into_response(),
    }
}

async fn test_send_message(
    State(state): State<Arc<AppState>>,
    Json(body): Json<HashMap<String, serde_json::Value>>,
) -> Response {
    let field = |name: &str| {
        body.get(name)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let (Some(to_jid), Some(message)) = (field("to_jid"), field("message")) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Missing required parameters",
                "required": ["to_jid", "message"],
            })),
        )
            .into_response();
    };

    let robot_jid = field("robot_jid")
        .or_else(|| state.config.zoom.bot_jid.clone())
        .unwrap_or_else(|| FALLBACK_ROBOT_JID.to_string());

    let outbound = OutboundMessage {
        to_jid,
        message,
        robot_jid,
    };

    match state.sender.send(&outbound).await {
        Ok(receipt) => Json(serde_json::json!({
            "status": "success",
            "message": "Message sent",
            "data": receipt,
        }))
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "status": "error",
                "message": "Failed to send message",
                "error": e.to_string(),
            })),
        )
            .into_response(),
    }
}

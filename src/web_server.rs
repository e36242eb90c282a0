use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    serve, Router,
};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::mpsc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::interaction_log::InteractionLog;
use crate::session::Session;

// Messages sent to the chat UI over the WebSocket.
#[derive(Debug, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    /// Sent once on connect with the canned greeting.
    Session { greeting: String },
    /// A turn started; chunks follow.
    Start,
    Chunk { text: String },
    /// The turn finished; `text` is the full concatenated reply.
    End { text: String },
    Error { message: String },
}

// Messages received from the chat UI.
#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Chat { text: String },
}

// Shared application state. Conversation state is NOT here: each WebSocket
// connection owns its session.
#[derive(Clone)]
struct AppState {
    templates: Arc<AutoReloader>,
    config: Arc<Config>,
    catalog: Arc<Catalog>,
    log: InteractionLog,
}

// Minijinja Environment setup
fn create_minijinja_env() -> Result<AutoReloader> {
    // Use AutoReloader for development convenience
    let reloader = AutoReloader::new(|notifier| {
        let loader = path_loader("templates");
        let mut env = Environment::new();
        env.set_loader(loader);
        notifier.watch_path("templates", true);
        Ok(env)
    });
    Ok(reloader)
}

async fn index_handler(
    State(state): State<AppState>,
) -> Result<axum::response::Html<String>, axum::response::Html<String>> {
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                let context = minijinja::context! {
                    title => "Marconi Motors",
                };
                tmpl.render(context)
            })
        })
        .map(axum::response::Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            axum::response::Html(format!("Internal Server Error: {}", e))
        })
}

// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// One WebSocket connection is one chat session: it owns the conversation
// transcript and (in generate mode) the context token for its lifetime.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    info!("New chat session established");
    let mut session = Session::new(&state.config, &state.catalog, state.log.clone());

    let hello = ServerMessage::Session {
        greeting: session.greeting().to_string(),
    };
    if send_json(&mut socket, &hello).await.is_err() {
        warn!("Failed to send greeting to new WebSocket client");
        return;
    }

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                let parsed: ClientMessage = match serde_json::from_str(&text) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!(error = %e, "Ignoring malformed client message");
                        continue;
                    }
                };
                let ClientMessage::Chat { text } = parsed;
                // The UI suppresses empty submissions; drop them if one
                // slips through anyway.
                if text.trim().is_empty() {
                    continue;
                }
                if run_socket_turn(&mut socket, &mut session, &text)
                    .await
                    .is_err()
                {
                    warn!("WebSocket client disconnected mid-turn. Closing connection.");
                    break;
                }
            }
            Message::Close(_) => {
                info!("Client requested WebSocket close");
                break;
            }
            // Axum answers Pings automatically.
            _ => {}
        }
    }
    info!("Chat session closed");
}

// Drive one turn, forwarding streamed chunks to the socket as they arrive.
// Errors returned here mean the socket is gone; turn failures are reported
// to the client in-band instead.
async fn run_socket_turn(
    socket: &mut WebSocket,
    session: &mut Session,
    text: &str,
) -> Result<(), axum::Error> {
    send_json(socket, &ServerMessage::Start).await?;

    let (tx, mut rx) = mpsc::channel::<String>(32);
    let result = {
        let turn = session.run_turn(text, &tx);
        tokio::pin!(turn);
        loop {
            tokio::select! {
                res = &mut turn => break res,
                Some(chunk) = rx.recv() => {
                    send_json(socket, &ServerMessage::Chunk { text: chunk }).await?;
                }
            }
        }
    };
    drop(tx);
    // Chunks that arrived while the turn was wrapping up.
    while let Ok(chunk) = rx.try_recv() {
        send_json(socket, &ServerMessage::Chunk { text: chunk }).await?;
    }

    match result {
        Ok(reply) => send_json(socket, &ServerMessage::End { text: reply }).await,
        Err(e) => {
            error!(error = %e, "Turn failed");
            send_json(
                socket,
                &ServerMessage::Error {
                    message: format!("{e:#}"),
                },
            )
            .await
        }
    }
}

async fn send_json(socket: &mut WebSocket, msg: &ServerMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(json)).await
}

/// Build the application router. Exposed for tests.
pub fn build_router(config: Arc<Config>, catalog: Arc<Catalog>) -> Result<Router> {
    let templates = create_minijinja_env().context("Failed to initialize template engine")?;
    let log = InteractionLog::new(config.log_path.clone());
    let state = AppState {
        templates: Arc::new(templates),
        config,
        catalog,
        log,
    };

    Ok(Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state)
        .layer(TraceLayer::new_for_http()))
}

pub async fn start_web_server(port: u16, config: Arc<Config>, catalog: Arc<Catalog>) -> Result<()> {
    let app = build_router(config, catalog)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}

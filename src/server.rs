//! Connection dispatcher: accept, turnstile, read one JSON value,
//! evaluate every action it carries, write one JSON response.
//!
//! The reference implementation runs a single-threaded accept-dispatch
//! loop; §5 explicitly allows a multi-worker reimplementation provided
//! the shared DAL handle and turnstile are synchronised, so this spawns
//! one task per connection on the Tokio multi-threaded runtime,
//! grounded on `connector-init`'s SIGINT/SIGTERM shutdown pattern.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::action::evaluate::evaluate;
use crate::action::{parse_action, response, split_request};
use crate::config::Settings;
use crate::dal::Dal;
use crate::scope::RequestScope;
use crate::turnstile::{Turnstile, Verdict};

const READ_CHUNK: usize = 8192;
const MAX_REQUEST_BYTES: usize = 1 << 20;

pub struct Server {
    listener: TcpListener,
    dal: Arc<dyn Dal>,
    turnstile: Arc<Turnstile>,
    cfg: Arc<Settings>,
}

impl Server {
    pub async fn bind(cfg: Arc<Settings>, dal: Arc<dyn Dal>) -> std::io::Result<Self> {
        let addr = SocketAddr::from(([127, 0, 0, 1], cfg.port));
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, dal, turnstile: Arc::new(Turnstile::new()), cfg })
    }

    /// Runs the accept loop until `shutdown` fires, then stops accepting
    /// new connections. In-flight connections run to completion, per
    /// §5's "no mid-action cancellation".
    pub async fn serve(self, shutdown: CancellationToken) -> std::io::Result<()> {
        tracing::info!(port = self.cfg.port, "listening");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("shutdown signal received, no longer accepting connections");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let dal = self.dal.clone();
                    let turnstile = self.turnstile.clone();
                    let cfg = self.cfg.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, peer, dal, turnstile, cfg).await;
                    });
                }
            }
        }
    }
}

/// Installs a SIGINT/SIGTERM handler that cancels `token` exactly once.
pub fn install_shutdown_signal(token: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        tracing::info!("caught signal to exit");
        token.cancel();
    });
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    dal: Arc<dyn Dal>,
    turnstile: Arc<Turnstile>,
    cfg: Arc<Settings>,
) {
    let ip = match peer.ip() {
        std::net::IpAddr::V4(v4) => v4,
        std::net::IpAddr::V6(_) => {
            tracing::warn!(%peer, "refusing non-IPv4 peer");
            return;
        }
    };

    match turnstile.check(ip, chrono::Utc::now(), &cfg).await {
        Verdict::Pass => {}
        Verdict::Blocked { next_request_at } => {
            let err = crate::action::ActionError::rate_limit("request", next_request_at);
            let body = serde_json::Value::Array(vec![response::encode(&response::Response::Error(err))]);
            let _ = write_response(&mut stream, &body).await;
            return;
        }
    }

    let mut scope = RequestScope::new();

    let raw = match read_request(&mut stream).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(%peer, error = %e, "failed to read request");
            return;
        }
    };

    let value: serde_json::Value = match serde_json::from_slice(&raw) {
        Ok(v) => v,
        Err(_) => serde_json::Value::Null,
    };
    scope.add(Some(Box::new(raw)));

    let responses = evaluate_request(&value, dal.as_ref(), &cfg).await;
    let body = serde_json::Value::Array(responses);
    scope.add(Some(Box::new(value)));
    let _ = write_response(&mut stream, &body).await;

    // Releases the request/response buffers deterministically here rather
    // than at the function's natural return; the early returns above still
    // release scope's (empty, at that point) contents via `Drop`.
    scope.destroy();
}

/// Parses and evaluates every action in `value`, in input order,
/// matching output length to input shape — one response for an object,
/// *n* for an array of *n*, one `type_mismatch` for anything else.
pub async fn evaluate_request(
    value: &serde_json::Value,
    dal: &dyn Dal,
    cfg: &Settings,
) -> Vec<serde_json::Value> {
    let actions = match split_request(value) {
        Ok(values) => values,
        Err(e) => return vec![response::encode(&response::Response::Error(e))],
    };

    let mut responses = Vec::with_capacity(actions.len());
    for action_value in actions {
        let action = parse_action(action_value, dal).await;
        let resp = evaluate(action, dal, cfg).await;
        responses.push(response::encode(&resp));
    }
    responses
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() >= MAX_REQUEST_BYTES {
            break;
        }
        if serde_json::from_slice::<serde_json::Value>(&buf).is_ok() {
            break;
        }
    }
    Ok(buf)
}

/// Writes `value` followed by a single `NUL` byte, looping over partial
/// writes per §6.
async fn write_response(stream: &mut TcpStream, value: &serde_json::Value) -> std::io::Result<()> {
    let mut bytes = serde_json::to_vec(value).unwrap_or_else(|_| b"[]".to_vec());
    bytes.push(0);
    let mut written = 0;
    while written < bytes.len() {
        written += stream.write(&bytes[written..]).await?;
    }
    Ok(())
}

//! TCP command endpoints.
//!
//! Each container listens on one dedicated endpoint speaking line-delimited
//! JSON: `{"cmd": name, "args": {…}}` in, `{"success": true, "result": …}` or
//! `{"success": false, "error": reason}` out. Transport failures on one
//! connection never tear down the listener or the container.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::core::error::AppResult;
use crate::dispatch::CommandHandler;

#[derive(Debug, Deserialize)]
struct WireRequest {
    cmd: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize)]
struct WireResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl WireResponse {
    fn from_outcome(outcome: Result<Value, String>) -> Self {
        match outcome {
            Ok(result) => Self {
                success: true,
                result: Some(result),
                error: None,
            },
            Err(error) => Self {
                success: false,
                result: None,
                error: Some(error),
            },
        }
    }
}

/// Serve one container's command endpoint until `shutdown` resolves, then
/// tear down every managed module through the handler.
///
/// # Errors
///
/// Fails only when the listener itself breaks; per-connection errors are
/// logged and absorbed.
pub async fn serve(
    listener: TcpListener,
    handler: Arc<dyn CommandHandler>,
    shutdown: impl Future<Output = ()> + Send,
) -> AppResult<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "command endpoint listening");
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "client connected");
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, handler).await {
                                tracing::warn!(%peer, error = %e, "connection closed with error");
                            }
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                }
            }
            () = &mut shutdown => break,
        }
    }
    tracing::info!(%addr, "command endpoint shutting down");
    handler.shutdown().await;
    Ok(())
}

async fn serve_connection(
    stream: TcpStream,
    handler: Arc<dyn CommandHandler>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let outcome = match serde_json::from_str::<WireRequest>(&line) {
            Ok(request) => handler.handle(&request.cmd, request.args).await,
            Err(e) => Err(format!("malformed request: {e}")),
        };
        let response = WireResponse::from_outcome(outcome);
        let mut encoded = serde_json::to_vec(&response).unwrap_or_else(|_| {
            br#"{"success":false,"error":"encoding failure"}"#.to_vec()
        });
        encoded.push(b'\n');
        write_half.write_all(&encoded).await?;
    }
    Ok(())
}

/// Resolve when the process receives SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

//! Live status socket
//!
//! Pushes `{event:"status", data: snapshot}` on every coalesced status
//! change and answers `{id, method, params}` frames (`think`, `pulse`,
//! `status`). `think` runs in a task owned by the connection, so status
//! pushes keep flowing while it is in flight and closing the socket drops
//! any request still running.

use crate::gateway::Gateway;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use bicameral_core::{Error, EventMessage, RpcRequest, RpcResponse, ThinkBody};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub async fn handle_live(socket: WebSocket, gateway: Arc<Gateway>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut status_rx = gateway.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();
    let mut tasks = JoinSet::new();

    let greeting = [
        to_json(&EventMessage::info(env!("CARGO_PKG_VERSION"))),
        to_json(&EventMessage::status(&status_rx.borrow_and_update().clone())),
    ];
    for json in greeting.into_iter().flatten() {
        if ws_tx.send(WsMessage::Text(json)).await.is_err() {
            return;
        }
    }
    info!("Live status client connected");

    loop {
        let outgoing = tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_frame(&text, &gateway, &reply_tx, &mut tasks)
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("Live status client disconnected");
                        return;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        return;
                    }
                    _ => None, // Binary, Ping, Pong
                }
            }

            changed = status_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                let snapshot = status_rx.borrow_and_update().clone();
                to_json(&EventMessage::status(&snapshot))
            }

            Some(reply) = reply_rx.recv() => Some(reply),

            Some(joined) = tasks.join_next() => {
                if let Err(e) = joined {
                    warn!("Live request task ended abnormally: {}", e);
                }
                None
            }
        };

        if let Some(json) = outgoing {
            if ws_tx.send(WsMessage::Text(json)).await.is_err() {
                return;
            }
        }
    }
}

/// Answer a frame inline, or spawn it and answer later through `reply_tx`.
fn handle_frame(
    text: &str,
    gateway: &Arc<Gateway>,
    reply_tx: &mpsc::UnboundedSender<String>,
    tasks: &mut JoinSet<()>,
) -> Option<String> {
    let req = match serde_json::from_str::<RpcRequest>(text) {
        Ok(req) => req,
        Err(e) => {
            warn!("Unparseable frame: {}", text.chars().take(100).collect::<String>());
            return to_json(&RpcResponse::parse_error(e.to_string()));
        }
    };
    debug!("Live request {} ({})", req.id, req.method);

    let response = match req.method.as_str() {
        "pulse" => to_value(&gateway.pulse()).map(|v| RpcResponse::ok(&req.id, v)),
        "status" => to_value(&gateway.status()).map(|v| RpcResponse::ok(&req.id, v)),
        "think" => match serde_json::from_value::<ThinkBody>(req.params) {
            Ok(body) => {
                let gateway = gateway.clone();
                let reply_tx = reply_tx.clone();
                let id = req.id;
                tasks.spawn(async move {
                    let response = match gateway.think(body).await {
                        Ok(outcome) => match serde_json::to_value(&outcome) {
                            Ok(v) => RpcResponse::ok(&id, v),
                            Err(e) => RpcResponse::from_error(&id, &Error::from(e)),
                        },
                        Err(e) => RpcResponse::from_error(&id, &e),
                    };
                    if let Some(json) = to_json(&response) {
                        let _ = reply_tx.send(json);
                    }
                });
                return None;
            }
            Err(e) => Ok(RpcResponse::from_error(&req.id, &Error::InvalidRequest(e.to_string()))),
        },
        other => Ok(RpcResponse::method_not_found(&req.id, other)),
    };

    let response = response.unwrap_or_else(|e| RpcResponse::from_error(&req.id, &e));
    to_json(&response)
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(Error::from)
}

fn to_json<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_string(value).ok()
}

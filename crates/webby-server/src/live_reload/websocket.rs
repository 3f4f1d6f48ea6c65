//! WebSocket handler for live reload.
//!
//! A connection joins the hub only after its hello has been answered, so the
//! hello response is always the first frame a client receives.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::sync::mpsc;

use super::hub::{ConnectionId, LiveReloadHub};
use super::protocol::{ClientCommand, HelloMessage};
use crate::registry::Manager;

/// Handle WebSocket upgrade for live reload.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(manager): State<Arc<Manager>>,
) -> impl IntoResponse {
    let hub = manager.hub();
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Outbound queue of a handshaken connection.
struct Registration {
    id: ConnectionId,
    outbound: mpsc::Receiver<Arc<str>>,
}

/// Wait for the next queued message, or forever before the handshake.
async fn next_outbound(registration: &mut Option<Registration>) -> Option<Arc<str>> {
    match registration {
        Some(registration) => registration.outbound.recv().await,
        None => std::future::pending().await,
    }
}

/// Handle an established WebSocket connection.
async fn handle_socket(mut socket: WebSocket, hub: Arc<LiveReloadHub>) {
    let mut registration: Option<Registration> = None;

    loop {
        tokio::select! {
            // Forward reload messages to client
            outbound = next_outbound(&mut registration) => {
                let Some(message) = outbound else { break };
                if socket.send(Message::Text(message.as_ref().into())).await.is_err() {
                    break;
                }
            }
            // Handle client commands
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let Some(command) = ClientCommand::parse(text.as_str()) else {
                            continue;
                        };
                        if !command.is_hello() {
                            tracing::trace!(command = %command.command, "Ignoring client command");
                            continue;
                        }
                        tracing::debug!("Sending live reload hello");
                        let hello = HelloMessage::new().to_json();
                        if socket.send(Message::Text(hello.into())).await.is_err() {
                            break;
                        }
                        if registration.is_none() {
                            let (id, outbound) = hub.register();
                            registration = Some(Registration { id, outbound });
                        }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    if let Some(registration) = registration {
        hub.unregister(registration.id);
    }
}

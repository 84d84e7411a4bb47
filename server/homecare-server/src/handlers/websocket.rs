//! Real-time channel
//!
//! One WebSocket per authenticated user. The token is checked before the
//! upgrade (`?token=` or a bearer header); afterwards the client speaks
//! [`ClientFrame`] JSON and receives [`ServerFrame`] JSON. Personal and role
//! topics are subscribed on connect, case topics only through `join_case`.

use auth_identity::Actor;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use error_common::codes;
use events_bus::{BusError, ConnectionId, Event, EventBus, SignalKind};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::bearer_token;
use crate::server::HomeCareServer;

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Inbound client message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    JoinCase { case_id: Uuid },
    #[serde(rename_all = "camelCase")]
    LeaveCase { case_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Signal {
        target_user_id: Uuid,
        kind: SignalKind,
        #[serde(default)]
        payload: serde_json::Value,
    },
    Ping,
}

/// Outbound server message
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Event(Event),
    #[serde(rename_all = "camelCase")]
    Ack {
        action: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        case_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        delivered: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<u64>,
    },
    Pong,
}

impl ServerFrame {
    fn ack(action: &str, case_id: Option<Uuid>, delivered: Option<usize>) -> Self {
        ServerFrame::Ack {
            action: action.to_string(),
            case_id,
            delivered,
        }
    }
}

impl From<BusError> for ServerFrame {
    fn from(err: BusError) -> Self {
        let retry_after_ms = match &err {
            BusError::RateLimited { retry_after } => u64::try_from(retry_after.as_millis()).ok(),
            _ => None,
        };
        ServerFrame::Error {
            code: err.code().to_string(),
            message: err.to_string(),
            retry_after_ms,
        }
    }
}

/// `GET /ws`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(server): State<HomeCareServer>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = match params.token.as_deref() {
        Some(token) if !token.is_empty() => token,
        _ => bearer_token(&headers)?,
    };
    let actor = server.tokens.verify(token)?;
    let bus = server.bus.clone();

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, bus, actor)))
}

async fn handle_socket(socket: WebSocket, bus: EventBus, actor: Actor) {
    let (connection, mut events) = bus.connect(actor);
    let (mut sink, mut stream) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerFrame>();

    let writer = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                Some(event) = events.recv() => ServerFrame::Event(event),
                Some(reply) = reply_rx.recv() => reply,
                else => break,
            };
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to encode outbound frame");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let reply = handle_client_frame(&bus, connection, &text).await;
                if reply_tx.send(reply).is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection = %connection, error = %e, "WebSocket receive failed");
                break;
            }
        }
    }

    bus.disconnect(connection).await;
    drop(reply_tx);
    writer.abort();
    info!(connection = %connection, actor = %actor, "WebSocket closed");
}

/// Apply one client frame and produce the reply
pub async fn handle_client_frame(bus: &EventBus, connection: ConnectionId, text: &str) -> ServerFrame {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            return ServerFrame::Error {
                code: codes::validation::INVALID_INPUT.to_string(),
                message: format!("Invalid message format: {e}"),
                retry_after_ms: None,
            }
        }
    };

    let outcome = match frame {
        ClientFrame::JoinCase { case_id } => bus
            .join_case(connection, case_id)
            .await
            .map(|()| ServerFrame::ack("join_case", Some(case_id), None)),
        ClientFrame::LeaveCase { case_id } => bus
            .leave_case(connection, case_id)
            .await
            .map(|()| ServerFrame::ack("leave_case", Some(case_id), None)),
        ClientFrame::Signal {
            target_user_id,
            kind,
            payload,
        } => bus
            .signal(connection, target_user_id, kind, payload)
            .await
            .map(|delivered| ServerFrame::ack("signal", None, Some(delivered))),
        ClientFrame::Ping => Ok(ServerFrame::Pong),
    };

    outcome.unwrap_or_else(|err| {
        debug!(connection = %connection, code = err.code(), "Client frame rejected");
        ServerFrame::from(err)
    })
}

//! WebSocket server handler
//!
//! A connection first identifies as a user. From then on it can drive the
//! collaboration workflow as that user and receives a
//! `collaborations_changed` push whenever something it can see changes.

use std::pin::Pin;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, ErrorKind, Result};
use crate::models::{
    CollaborationAgreement, CollaborationRequest, Decision, Direction, EnrichedRequest,
    InboxCursor, InboxPage, PaymentAmount, ProfileSummary, Terms,
};
use crate::AppState;

type ChangeStream = Pin<Box<dyn Stream<Item = ()> + Send>>;

/// WebSocket handler
pub async fn handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection state
#[derive(Default)]
struct Session {
    user: Option<Uuid>,
    changes: Option<ChangeStream>,
}

impl Session {
    fn identified(&self) -> Result<Uuid> {
        self.user.ok_or_else(|| {
            AppError::Authorization("Identify before sending other messages".to_string())
        })
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut session = Session::default();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                };

                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => dispatch(&state, &mut session, client_msg)
                        .await
                        .unwrap_or_else(|e| ServerMessage::from_error(&e)),
                    Err(e) => ServerMessage::from_error(&AppError::Validation(format!(
                        "Invalid message: {}",
                        e
                    ))),
                };

                if !send_json(&mut sender, &reply).await {
                    break;
                }
            }
            change = next_change(&mut session.changes) => {
                match change {
                    Some(()) => {
                        if !send_json(&mut sender, &ServerMessage::CollaborationsChanged).await {
                            break;
                        }
                    }
                    None => session.changes = None,
                }
            }
        }
    }

    tracing::debug!(user_id = ?session.user, "connection closed");
}

/// Next change signal, or never when the connection is not identified yet
async fn next_change(changes: &mut Option<ChangeStream>) -> Option<()> {
    match changes {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn send_json(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            return true;
        }
    };

    match sender.send(Message::Text(text)).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Failed to send message: {}", e);
            false
        }
    }
}

/// Handle one client message; everything except `identify` runs as the
/// identified user
async fn dispatch(
    state: &AppState,
    session: &mut Session,
    msg: ClientMessage,
) -> Result<ServerMessage> {
    let service = &state.service;

    let user = session.identified();

    match msg {
        ClientMessage::Identify { user_id } => {
            tracing::debug!(user_id = %user_id, "connection identified");
            session.user = Some(user_id);
            session.changes = Some(service.subscribe(user_id).into_stream());
            Ok(ServerMessage::Identified { user_id })
        }
        ClientMessage::SaveProfile {
            username,
            avatar_url,
            specialty,
        } => {
            let user_id = user?;
            let username = username.trim();
            if username.is_empty() {
                return Err(AppError::Validation("Username cannot be empty".to_string()));
            }
            let mut profile = ProfileSummary::new(user_id, username);
            profile.avatar_url = avatar_url.filter(|url| !url.trim().is_empty());
            profile.specialty = specialty
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            state.store.upsert_profile(&profile).await?;
            Ok(ServerMessage::ProfileSaved { profile })
        }
        ClientMessage::CreateRequest {
            receiver_id,
            message,
            payment_amount,
            currency,
        } => {
            let user_id = user?;
            let terms = match (payment_amount, currency) {
                (None, None) => Terms::default(),
                (amount, currency) => Terms::parse(
                    amount.unwrap_or(i64::from(PaymentAmount::MIN)),
                    currency.as_deref().unwrap_or("USD"),
                )?,
            };
            let (request, agreement) = service
                .requests
                .create_request_with_terms(user_id, receiver_id, message, terms)
                .await?;
            Ok(ServerMessage::RequestCreated { request, agreement })
        }
        ClientMessage::RespondToRequest {
            request_id,
            decision,
        } => {
            let user_id = user?;
            let request = service
                .requests
                .respond_to_request(request_id, user_id, decision)
                .await?;
            Ok(ServerMessage::RequestUpdated { request })
        }
        ClientMessage::CancelRequest { request_id } => {
            let user_id = user?;
            service.requests.cancel_request(request_id, user_id).await?;
            Ok(ServerMessage::RequestCancelled { request_id })
        }
        ClientMessage::CreateAgreement {
            request_id,
            payment_amount,
            currency,
        } => {
            let user_id = user?;
            let agreement = service
                .agreements
                .propose_terms(request_id, user_id, payment_amount, &currency)
                .await?;
            Ok(ServerMessage::AgreementCreated { agreement })
        }
        ClientMessage::RespondToAgreement {
            request_id,
            decision,
        } => {
            let user_id = user?;
            let agreement = service
                .agreements
                .respond_to_agreement(request_id, user_id, decision)
                .await?;
            Ok(ServerMessage::AgreementUpdated { agreement })
        }
        ClientMessage::ListInbox {
            direction,
            cursor,
            limit,
        } => {
            let user_id = user?;
            let page = match (cursor, limit) {
                (None, None) => InboxPage {
                    items: service.inbox.project_inbox(user_id, direction).await?,
                    next_cursor: None,
                },
                (cursor, limit) => {
                    service
                        .inbox
                        .project_inbox_page(
                            user_id,
                            direction,
                            cursor,
                            limit.unwrap_or(crate::collaboration::MAX_PAGE_SIZE),
                        )
                        .await?
                }
            };
            Ok(ServerMessage::Inbox {
                direction,
                items: page.items,
                next_cursor: page.next_cursor,
            })
        }
    }
}

/// Messages from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Act as this user for the rest of the connection
    Identify { user_id: Uuid },
    /// Create or update the caller's display profile
    SaveProfile {
        username: String,
        avatar_url: Option<String>,
        specialty: Option<String>,
    },
    /// Send a request, optionally with explicit terms
    CreateRequest {
        receiver_id: Uuid,
        message: Option<String>,
        payment_amount: Option<i64>,
        currency: Option<String>,
    },
    RespondToRequest {
        request_id: Uuid,
        decision: Decision,
    },
    CancelRequest { request_id: Uuid },
    /// Attach terms to a request that has none
    CreateAgreement {
        request_id: Uuid,
        payment_amount: i64,
        currency: String,
    },
    RespondToAgreement {
        request_id: Uuid,
        decision: Decision,
    },
    /// One side of the inbox; paged when `cursor` or `limit` is given
    ListInbox {
        direction: Direction,
        cursor: Option<InboxCursor>,
        limit: Option<usize>,
    },
}

/// Messages from server to client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Identified {
        user_id: Uuid,
    },
    ProfileSaved {
        profile: ProfileSummary,
    },
    RequestCreated {
        request: CollaborationRequest,
        agreement: CollaborationAgreement,
    },
    RequestUpdated {
        request: CollaborationRequest,
    },
    RequestCancelled {
        request_id: Uuid,
    },
    AgreementCreated {
        agreement: CollaborationAgreement,
    },
    AgreementUpdated {
        agreement: CollaborationAgreement,
    },
    Inbox {
        direction: Direction,
        items: Vec<EnrichedRequest>,
        #[serde(skip_serializing_if = "Option::is_none")]
        next_cursor: Option<InboxCursor>,
    },
    /// Something the user can see changed; refetch
    CollaborationsChanged,
    /// Error occurred
    Error {
        code: ErrorKind,
        message: String,
        refetch: bool,
    },
}

impl ServerMessage {
    pub fn from_error(error: &AppError) -> Self {
        match error {
            AppError::Transport(_) | AppError::Internal(_) => {
                tracing::error!("Request failed: {}", error)
            }
            _ => tracing::debug!("Request rejected: {}", error),
        }

        ServerMessage::Error {
            code: error.kind(),
            message: error.user_message(),
            refetch: error.should_refetch(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_parsing() {
        let raw = json!({
            "type": "create_request",
            "receiver_id": Uuid::nil(),
            "message": "Let's work together",
            "payment_amount": 200,
            "currency": "USD"
        });
        let msg: ClientMessage = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::CreateRequest {
                payment_amount: Some(200),
                ..
            }
        ));

        let raw = json!({"type": "respond_to_request", "request_id": Uuid::nil(), "decision": "decline"});
        let msg: ClientMessage = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::RespondToRequest {
                decision: Decision::Decline,
                ..
            }
        ));

        let raw = json!({"type": "list_inbox", "direction": "sent"});
        let msg: ClientMessage = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::ListInbox {
                direction: Direction::Sent,
                cursor: None,
                limit: None
            }
        ));
    }

    #[test]
    fn test_error_message_shape() {
        let msg = ServerMessage::from_error(&AppError::InvalidState("already accepted".into()));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "invalid_state_error");
        assert_eq!(value["message"], "This request has already been resolved");
        assert_eq!(value["refetch"], true);
    }

    #[test]
    fn test_change_signal_shape() {
        let value = serde_json::to_value(&ServerMessage::CollaborationsChanged).unwrap();
        assert_eq!(value, json!({"type": "collaborations_changed"}));
    }
}

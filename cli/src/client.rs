//! WebSocket client for the Reelcollab server

use anyhow::{anyhow, Result};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

use crate::messages::{
    Agreement, ClientMessage, Decision, Direction, InboxCursor, InboxEntry, Profile, Request,
    ServerMessage,
};

/// An error reported by the server
#[derive(Debug, Error)]
#[error("{message} ({code})")]
pub struct ServerError {
    pub code: String,
    pub message: String,
    /// The data shown may be stale
    pub refetch: bool,
}

/// WebSocket client for Reelcollab
pub struct ReelClient {
    tx: mpsc::Sender<Message>,
    rx: mpsc::Receiver<ServerMessage>,
    #[allow(dead_code)]
    handle: tokio::task::JoinHandle<()>,
}

impl ReelClient {
    /// Connect to a Reelcollab server
    pub async fn connect(url: &str) -> Result<Self> {
        tracing::info!("Connecting to {}", url);

        let (ws_stream, _) = connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();

        // Channel for outgoing messages
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(32);

        // Channel for incoming parsed messages
        let (in_tx, in_rx) = mpsc::channel::<ServerMessage>(32);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(msg) = out_rx.recv() => {
                        if write.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Some(result) = read.next() => {
                        match result {
                            Ok(Message::Text(text)) => {
                                match serde_json::from_str::<ServerMessage>(&text) {
                                    Ok(msg) => {
                                        if in_tx.send(msg).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!("Failed to parse message: {} - {}", e, text);
                                    }
                                }
                            }
                            Ok(Message::Close(_)) => break,
                            Err(e) => {
                                tracing::error!("WebSocket error: {}", e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    else => break,
                }
            }
        });

        tracing::debug!("Connected");

        Ok(Self {
            tx: out_tx,
            rx: in_rx,
            handle,
        })
    }

    async fn send(&self, msg: ClientMessage) -> Result<()> {
        let json = serde_json::to_string(&msg)?;
        self.tx
            .send(Message::Text(json))
            .await
            .map_err(|e| anyhow!("Failed to send message: {}", e))
    }

    /// Send one message and wait for its reply. Change signals that arrive
    /// in between are skipped.
    async fn call(&mut self, msg: ClientMessage) -> Result<ServerMessage> {
        self.send(msg).await?;

        while let Some(reply) = self.rx.recv().await {
            match reply {
                ServerMessage::CollaborationsChanged => continue,
                ServerMessage::Error {
                    code,
                    message,
                    refetch,
                } => {
                    return Err(ServerError {
                        code,
                        message,
                        refetch,
                    }
                    .into())
                }
                other => return Ok(other),
            }
        }

        Err(anyhow!("Connection closed"))
    }

    pub async fn identify(&mut self, user_id: Uuid) -> Result<()> {
        match self.call(ClientMessage::Identify { user_id }).await? {
            ServerMessage::Identified { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn save_profile(
        &mut self,
        username: String,
        avatar_url: Option<String>,
        specialty: Option<String>,
    ) -> Result<Profile> {
        match self
            .call(ClientMessage::SaveProfile {
                username,
                avatar_url,
                specialty,
            })
            .await?
        {
            ServerMessage::ProfileSaved { profile } => Ok(profile),
            other => Err(unexpected(other)),
        }
    }

    pub async fn send_request(
        &mut self,
        receiver_id: Uuid,
        message: Option<String>,
        payment_amount: Option<i64>,
        currency: Option<String>,
    ) -> Result<(Request, Agreement)> {
        match self
            .call(ClientMessage::CreateRequest {
                receiver_id,
                message,
                payment_amount,
                currency,
            })
            .await?
        {
            ServerMessage::RequestCreated { request, agreement } => Ok((request, agreement)),
            other => Err(unexpected(other)),
        }
    }

    pub async fn respond(&mut self, request_id: Uuid, decision: Decision) -> Result<Request> {
        match self
            .call(ClientMessage::RespondToRequest {
                request_id,
                decision,
            })
            .await?
        {
            ServerMessage::RequestUpdated { request } => Ok(request),
            other => Err(unexpected(other)),
        }
    }

    pub async fn cancel(&mut self, request_id: Uuid) -> Result<()> {
        match self.call(ClientMessage::CancelRequest { request_id }).await? {
            ServerMessage::RequestCancelled { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn propose_terms(
        &mut self,
        request_id: Uuid,
        payment_amount: i64,
        currency: String,
    ) -> Result<Agreement> {
        match self
            .call(ClientMessage::CreateAgreement {
                request_id,
                payment_amount,
                currency,
            })
            .await?
        {
            ServerMessage::AgreementCreated { agreement } => Ok(agreement),
            other => Err(unexpected(other)),
        }
    }

    pub async fn respond_to_terms(
        &mut self,
        request_id: Uuid,
        decision: Decision,
    ) -> Result<Agreement> {
        match self
            .call(ClientMessage::RespondToAgreement {
                request_id,
                decision,
            })
            .await?
        {
            ServerMessage::AgreementUpdated { agreement } => Ok(agreement),
            other => Err(unexpected(other)),
        }
    }

    /// One side of the inbox; `limit` pages it
    pub async fn inbox(
        &mut self,
        direction: Direction,
        cursor: Option<InboxCursor>,
        limit: Option<usize>,
    ) -> Result<(Vec<InboxEntry>, Option<InboxCursor>)> {
        match self
            .call(ClientMessage::ListInbox {
                direction,
                cursor,
                limit,
            })
            .await?
        {
            ServerMessage::Inbox {
                items, next_cursor, ..
            } => Ok((items, next_cursor)),
            other => Err(unexpected(other)),
        }
    }

    /// Wait for the next change signal; `false` once the connection is gone
    pub async fn changed(&mut self) -> bool {
        while let Some(msg) = self.rx.recv().await {
            if matches!(msg, ServerMessage::CollaborationsChanged) {
                return true;
            }
        }
        false
    }
}

fn unexpected(msg: ServerMessage) -> anyhow::Error {
    anyhow!("Unexpected reply from server: {:?}", msg)
}

//! WebSocket message types for the Reelcollab protocol
//!
//! These types mirror the server's protocol. Some fields may not be used
//! directly by the CLI but are part of the complete protocol.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A collaboration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    #[serde(default)]
    pub message: Option<String>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

/// Payment terms attached to a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agreement {
    pub id: Uuid,
    pub request_id: Uuid,
    pub payment_amount: u32,
    pub currency: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

/// Status shared by requests and agreements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Accepted,
    Declined,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Accepted => "accepted",
            Status::Declined => "declined",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
}

/// A request with both parties and its terms
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxEntry {
    pub request: Request,
    pub sender: Profile,
    pub receiver: Profile,
    #[serde(default)]
    pub agreement: Option<Agreement>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InboxCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Decline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Received,
    Sent,
}

/// Messages from client to server
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Identify {
        user_id: Uuid,
    },
    SaveProfile {
        username: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        avatar_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        specialty: Option<String>,
    },
    CreateRequest {
        receiver_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        payment_amount: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        currency: Option<String>,
    },
    RespondToRequest {
        request_id: Uuid,
        decision: Decision,
    },
    CancelRequest {
        request_id: Uuid,
    },
    CreateAgreement {
        request_id: Uuid,
        payment_amount: i64,
        currency: String,
    },
    RespondToAgreement {
        request_id: Uuid,
        decision: Decision,
    },
    ListInbox {
        direction: Direction,
        #[serde(skip_serializing_if = "Option::is_none")]
        cursor: Option<InboxCursor>,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
}

/// Messages from server to client
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Identified {
        user_id: Uuid,
    },
    ProfileSaved {
        profile: Profile,
    },
    RequestCreated {
        request: Request,
        agreement: Agreement,
    },
    RequestUpdated {
        request: Request,
    },
    RequestCancelled {
        request_id: Uuid,
    },
    AgreementCreated {
        agreement: Agreement,
    },
    AgreementUpdated {
        agreement: Agreement,
    },
    Inbox {
        direction: Direction,
        items: Vec<InboxEntry>,
        #[serde(default)]
        next_cursor: Option<InboxCursor>,
    },
    CollaborationsChanged,
    Error {
        code: String,
        message: String,
        #[serde(default)]
        refetch: bool,
    },
}

//! Data models for collaboration requests and payment agreements

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// A proposal from one user to collaborate with another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationRequest {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

impl CollaborationRequest {
    /// Create a new pending request. Blank messages are dropped.
    pub fn new(sender_id: Uuid, receiver_id: Uuid, message: Option<String>) -> Self {
        let message = message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());

        Self {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            message,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Check whether a user is the sender or the receiver
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }

    /// Position of this request in the newest-first ordering
    pub fn cursor(&self) -> InboxCursor {
        InboxCursor {
            created_at: self.created_at,
            id: self.id,
        }
    }
}

/// Status of a collaboration request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Declined => "declined",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "declined" => Ok(RequestStatus::Declined),
            _ => Err(format!("Invalid request status: {}", s)),
        }
    }
}

/// Payment terms attached to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationAgreement {
    pub id: Uuid,
    pub request_id: Uuid,
    pub payment_amount: PaymentAmount,
    pub currency: Currency,
    pub status: AgreementStatus,
    pub created_at: DateTime<Utc>,
}

impl CollaborationAgreement {
    /// Create new pending terms for a request
    pub fn new(request_id: Uuid, terms: Terms) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            payment_amount: terms.payment_amount,
            currency: terms.currency,
            status: AgreementStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// Status of a payment agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementStatus {
    Pending,
    Accepted,
    Declined,
}

impl AgreementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgreementStatus::Pending => "pending",
            AgreementStatus::Accepted => "accepted",
            AgreementStatus::Declined => "declined",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AgreementStatus::Pending)
    }
}

impl std::str::FromStr for AgreementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AgreementStatus::Pending),
            "accepted" => Ok(AgreementStatus::Accepted),
            "declined" => Ok(AgreementStatus::Declined),
            _ => Err(format!("Invalid agreement status: {}", s)),
        }
    }
}

/// A response to a request or to its terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Decline,
}

impl Decision {
    pub fn request_status(&self) -> RequestStatus {
        match self {
            Decision::Accept => RequestStatus::Accepted,
            Decision::Decline => RequestStatus::Declined,
        }
    }

    pub fn agreement_status(&self) -> AgreementStatus {
        match self {
            Decision::Accept => AgreementStatus::Accepted,
            Decision::Decline => AgreementStatus::Declined,
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(Decision::Accept),
            "decline" => Ok(Decision::Decline),
            _ => Err(format!("Invalid decision: {}", s)),
        }
    }
}

/// Supported payment currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "EUR")]
    Eur,
    #[serde(rename = "GBP")]
    Gbp,
    #[serde(rename = "INR")]
    Inr,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Inr => "INR",
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            "INR" => Ok(Currency::Inr),
            _ => Err(format!("Unsupported currency: {}", s)),
        }
    }
}

/// A payment amount in whole currency units, always within
/// [`PaymentAmount::MIN`, `PaymentAmount::MAX`] and a multiple of `STEP`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct PaymentAmount(u32);

impl PaymentAmount {
    pub const MIN: u32 = 50;
    pub const MAX: u32 = 10_000;
    pub const STEP: u32 = 50;

    pub fn new(amount: i64) -> Result<Self, String> {
        if amount < i64::from(Self::MIN) || amount > i64::from(Self::MAX) {
            return Err(format!(
                "Payment amount must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                amount
            ));
        }
        if amount % i64::from(Self::STEP) != 0 {
            return Err(format!(
                "Payment amount must be a multiple of {}, got {}",
                Self::STEP,
                amount
            ));
        }
        Ok(Self(amount as u32))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for PaymentAmount {
    type Error = String;

    fn try_from(amount: i64) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<PaymentAmount> for u32 {
    fn from(amount: PaymentAmount) -> Self {
        amount.0
    }
}

/// Amount and currency proposed by the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terms {
    pub payment_amount: PaymentAmount,
    pub currency: Currency,
}

impl Terms {
    /// Validate raw form input into terms
    pub fn parse(payment_amount: i64, currency: &str) -> crate::error::Result<Self> {
        Ok(Self {
            payment_amount: PaymentAmount::new(payment_amount).map_err(AppError::Validation)?,
            currency: currency.parse().map_err(AppError::Validation)?,
        })
    }
}

impl Default for Terms {
    fn default() -> Self {
        Self {
            payment_amount: PaymentAmount(PaymentAmount::MIN),
            currency: Currency::Usd,
        }
    }
}

/// Display-ready summary of a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: Uuid,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Craft the user offers, e.g. "cinematography"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
}

impl ProfileSummary {
    pub fn new(id: Uuid, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            avatar_url: None,
            specialty: None,
        }
    }

    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    pub fn with_specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialty = Some(specialty.into());
        self
    }

    /// Placeholder for an id the profile directory cannot resolve
    pub fn unknown(id: Uuid) -> Self {
        Self::new(id, "unknown user")
    }
}

/// Which side of the inbox is being viewed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Received,
    Sent,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Received => "received",
            Direction::Sent => "sent",
        }
    }

    /// Check whether a request belongs on this side of the viewer's inbox
    pub fn matches(&self, request: &CollaborationRequest, viewer_id: Uuid) -> bool {
        match self {
            Direction::Received => request.receiver_id == viewer_id,
            Direction::Sent => request.sender_id == viewer_id,
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(Direction::Received),
            "sent" => Ok(Direction::Sent),
            _ => Err(format!("Invalid direction: {}", s)),
        }
    }
}

/// A request with both parties resolved and its terms attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRequest {
    pub request: CollaborationRequest,
    pub sender: ProfileSummary,
    pub receiver: ProfileSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement: Option<CollaborationAgreement>,
}

/// Position in the newest-first request ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl InboxCursor {
    /// True when `request` sorts strictly after this cursor (i.e. is older)
    pub fn precedes(&self, request: &CollaborationRequest) -> bool {
        (request.created_at, request.id) < (self.created_at, self.id)
    }
}

/// One page of an inbox projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxPage {
    pub items: Vec<EnrichedRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<InboxCursor>,
}

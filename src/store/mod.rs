//! Persistence collaborators for the collaboration workflow
//!
//! The managers never talk to a database directly; they receive a
//! [`CollaborationStore`] and a [`ProfileDirectory`] and rely on their
//! conditional updates (affected-row counts) to detect lost races.

mod memory;
mod sqlite;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    AgreementStatus, CollaborationAgreement, CollaborationRequest, Direction, InboxCursor,
    ProfileSummary, RequestStatus,
};

/// Storage for requests and their agreements
#[async_trait]
pub trait CollaborationStore: Send + Sync {
    /// Insert a request, and its agreement if given, as one unit
    async fn insert_request(
        &self,
        request: &CollaborationRequest,
        agreement: Option<&CollaborationAgreement>,
    ) -> Result<()>;

    async fn get_request(&self, id: Uuid) -> Result<Option<CollaborationRequest>>;

    /// All requests the viewer sent or received, newest first
    async fn list_requests(&self, viewer_id: Uuid) -> Result<Vec<CollaborationRequest>>;

    /// One side of the viewer's inbox, newest first, strictly older than
    /// `cursor` and at most `limit` long
    async fn list_inbox(
        &self,
        viewer_id: Uuid,
        direction: Direction,
        cursor: Option<InboxCursor>,
        limit: Option<usize>,
    ) -> Result<Vec<CollaborationRequest>>;

    /// Set `to` only if the request is currently `from`; returns affected rows
    async fn update_request_status(
        &self,
        id: Uuid,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<u64>;

    /// Delete a still-pending request owned by `sender_id` together with its
    /// agreement; returns affected request rows
    async fn delete_pending_request(&self, id: Uuid, sender_id: Uuid) -> Result<u64>;

    async fn insert_agreement(&self, agreement: &CollaborationAgreement) -> Result<()>;

    async fn get_agreement(&self, request_id: Uuid) -> Result<Option<CollaborationAgreement>>;

    /// Agreements attached to the given requests; requests without terms
    /// are simply absent
    async fn get_agreements(&self, request_ids: &[Uuid]) -> Result<Vec<CollaborationAgreement>>;

    /// Set `to` only if the agreement is currently `from`; returns affected rows
    async fn update_agreement_status(
        &self,
        request_id: Uuid,
        from: AgreementStatus,
        to: AgreementStatus,
    ) -> Result<u64>;
}

/// Resolves user ids into display summaries
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn get_profile(&self, id: Uuid) -> Result<Option<ProfileSummary>>;

    /// Profiles for the given ids; unknown ids are simply absent
    async fn get_profiles(&self, ids: &[Uuid]) -> Result<Vec<ProfileSummary>>;
}

//! Store wrapper for tests that need another client's write to land between
//! a manager's read and its own write

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CollaborationStore, MemoryStore};
use crate::error::Result;
use crate::models::{
    AgreementStatus, CollaborationAgreement, CollaborationRequest, Direction, InboxCursor,
    RequestStatus,
};

/// A write made by some other client
#[derive(Debug, Clone)]
pub enum Interference {
    CancelRequest { request_id: Uuid, sender_id: Uuid },
    InsertAgreement(CollaborationAgreement),
}

/// Delegates to a [`MemoryStore`], applying the queued interference right
/// before the next write
pub struct RacingStore {
    inner: Arc<MemoryStore>,
    pending: Mutex<Option<Interference>>,
}

impl RacingStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            pending: Mutex::new(None),
        }
    }

    pub async fn interfere(&self, interference: Interference) {
        *self.pending.lock().await = Some(interference);
    }

    async fn apply_pending(&self) -> Result<()> {
        let pending = self.pending.lock().await.take();
        match pending {
            Some(Interference::CancelRequest {
                request_id,
                sender_id,
            }) => {
                self.inner
                    .delete_pending_request(request_id, sender_id)
                    .await?;
            }
            Some(Interference::InsertAgreement(agreement)) => {
                self.inner.insert_agreement(&agreement).await?;
            }
            None => {}
        }
        Ok(())
    }
}

#[async_trait]
impl CollaborationStore for RacingStore {
    async fn insert_request(
        &self,
        request: &CollaborationRequest,
        agreement: Option<&CollaborationAgreement>,
    ) -> Result<()> {
        self.apply_pending().await?;
        self.inner.insert_request(request, agreement).await
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<CollaborationRequest>> {
        self.inner.get_request(id).await
    }

    async fn list_requests(&self, viewer_id: Uuid) -> Result<Vec<CollaborationRequest>> {
        self.inner.list_requests(viewer_id).await
    }

    async fn list_inbox(
        &self,
        viewer_id: Uuid,
        direction: Direction,
        cursor: Option<InboxCursor>,
        limit: Option<usize>,
    ) -> Result<Vec<CollaborationRequest>> {
        self.inner
            .list_inbox(viewer_id, direction, cursor, limit)
            .await
    }

    async fn update_request_status(
        &self,
        id: Uuid,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<u64> {
        self.apply_pending().await?;
        self.inner.update_request_status(id, from, to).await
    }

    async fn delete_pending_request(&self, id: Uuid, sender_id: Uuid) -> Result<u64> {
        self.apply_pending().await?;
        self.inner.delete_pending_request(id, sender_id).await
    }

    async fn insert_agreement(&self, agreement: &CollaborationAgreement) -> Result<()> {
        self.apply_pending().await?;
        self.inner.insert_agreement(agreement).await
    }

    async fn get_agreement(&self, request_id: Uuid) -> Result<Option<CollaborationAgreement>> {
        self.inner.get_agreement(request_id).await
    }

    async fn get_agreements(&self, request_ids: &[Uuid]) -> Result<Vec<CollaborationAgreement>> {
        self.inner.get_agreements(request_ids).await
    }

    async fn update_agreement_status(
        &self,
        request_id: Uuid,
        from: AgreementStatus,
        to: AgreementStatus,
    ) -> Result<u64> {
        self.apply_pending().await?;
        self.inner
            .update_agreement_status(request_id, from, to)
            .await
    }
}

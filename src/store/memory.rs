//! In-process store, used by tests and for running without a database

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CollaborationStore, ProfileDirectory};
use crate::error::{AppError, Result};
use crate::models::{
    AgreementStatus, CollaborationAgreement, CollaborationRequest, Direction, InboxCursor,
    ProfileSummary, RequestStatus,
};

/// Store holding every record in memory
#[derive(Default)]
pub struct MemoryStore {
    requests: RwLock<HashMap<Uuid, CollaborationRequest>>,
    /// Agreements keyed by their owning request
    agreements: RwLock<HashMap<Uuid, CollaborationAgreement>>,
    profiles: RwLock<HashMap<Uuid, ProfileSummary>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a profile summary
    pub async fn add_profile(&self, profile: ProfileSummary) {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.id, profile);
    }

    /// Number of agreements currently held
    pub async fn agreement_count(&self) -> usize {
        self.agreements.read().await.len()
    }
}

#[async_trait]
impl CollaborationStore for MemoryStore {
    async fn insert_request(
        &self,
        request: &CollaborationRequest,
        agreement: Option<&CollaborationAgreement>,
    ) -> Result<()> {
        let mut requests = self.requests.write().await;
        let mut agreements = self.agreements.write().await;

        if requests.contains_key(&request.id) {
            return Err(AppError::Internal(format!(
                "Request {} already exists",
                request.id
            )));
        }
        if let Some(agreement) = agreement {
            if agreement.request_id != request.id {
                return Err(AppError::Internal(
                    "Agreement does not belong to the inserted request".to_string(),
                ));
            }
            agreements.insert(request.id, agreement.clone());
        }
        requests.insert(request.id, request.clone());

        Ok(())
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<CollaborationRequest>> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id).cloned())
    }

    async fn list_requests(&self, viewer_id: Uuid) -> Result<Vec<CollaborationRequest>> {
        let requests = self.requests.read().await;
        let mut listed: Vec<CollaborationRequest> = requests
            .values()
            .filter(|r| r.involves(viewer_id))
            .cloned()
            .collect();
        listed.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(listed)
    }

    async fn list_inbox(
        &self,
        viewer_id: Uuid,
        direction: Direction,
        cursor: Option<InboxCursor>,
        limit: Option<usize>,
    ) -> Result<Vec<CollaborationRequest>> {
        let requests = self.requests.read().await;
        let mut listed: Vec<CollaborationRequest> = requests
            .values()
            .filter(|r| direction.matches(r, viewer_id))
            .filter(|r| cursor.map_or(true, |c| c.precedes(r)))
            .cloned()
            .collect();
        listed.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        if let Some(limit) = limit {
            listed.truncate(limit);
        }
        Ok(listed)
    }

    async fn update_request_status(
        &self,
        id: Uuid,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<u64> {
        let mut requests = self.requests.write().await;
        match requests.get_mut(&id) {
            Some(request) if request.status == from => {
                request.status = to;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn delete_pending_request(&self, id: Uuid, sender_id: Uuid) -> Result<u64> {
        let mut requests = self.requests.write().await;
        let mut agreements = self.agreements.write().await;

        let deletable = requests
            .get(&id)
            .is_some_and(|r| r.sender_id == sender_id && r.status == RequestStatus::Pending);
        if !deletable {
            return Ok(0);
        }

        requests.remove(&id);
        agreements.remove(&id);
        Ok(1)
    }

    async fn insert_agreement(&self, agreement: &CollaborationAgreement) -> Result<()> {
        let requests = self.requests.read().await;
        let mut agreements = self.agreements.write().await;

        if !requests.contains_key(&agreement.request_id) {
            return Err(AppError::Internal(format!(
                "Agreement references missing request {}",
                agreement.request_id
            )));
        }
        if agreements.contains_key(&agreement.request_id) {
            return Err(AppError::Internal(format!(
                "Request {} already has an agreement",
                agreement.request_id
            )));
        }
        agreements.insert(agreement.request_id, agreement.clone());
        Ok(())
    }

    async fn get_agreement(&self, request_id: Uuid) -> Result<Option<CollaborationAgreement>> {
        let agreements = self.agreements.read().await;
        Ok(agreements.get(&request_id).cloned())
    }

    async fn get_agreements(&self, request_ids: &[Uuid]) -> Result<Vec<CollaborationAgreement>> {
        let agreements = self.agreements.read().await;
        Ok(request_ids
            .iter()
            .filter_map(|id| agreements.get(id).cloned())
            .collect())
    }

    async fn update_agreement_status(
        &self,
        request_id: Uuid,
        from: AgreementStatus,
        to: AgreementStatus,
    ) -> Result<u64> {
        let mut agreements = self.agreements.write().await;
        match agreements.get_mut(&request_id) {
            Some(agreement) if agreement.status == from => {
                agreement.status = to;
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

#[async_trait]
impl ProfileDirectory for MemoryStore {
    async fn get_profile(&self, id: Uuid) -> Result<Option<ProfileSummary>> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(&id).cloned())
    }

    async fn get_profiles(&self, ids: &[Uuid]) -> Result<Vec<ProfileSummary>> {
        let profiles = self.profiles.read().await;
        Ok(ids.iter().filter_map(|id| profiles.get(id).cloned()).collect())
    }
}

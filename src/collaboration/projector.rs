//! Inbox projection: requests joined with both parties and their terms

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    CollaborationAgreement, CollaborationRequest, Direction, EnrichedRequest, InboxCursor,
    InboxPage, ProfileSummary,
};
use crate::retry::RetryPolicy;
use crate::store::{CollaborationStore, ProfileDirectory};

/// Upper bound on a single inbox page
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Clone)]
pub struct ViewProjector {
    store: Arc<dyn CollaborationStore>,
    profiles: Arc<dyn ProfileDirectory>,
    retry: RetryPolicy,
}

impl ViewProjector {
    pub fn new(
        store: Arc<dyn CollaborationStore>,
        profiles: Arc<dyn ProfileDirectory>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            profiles,
            retry,
        }
    }

    /// The whole received or sent side of a viewer's inbox, newest first
    pub async fn project_inbox(
        &self,
        viewer_id: Uuid,
        direction: Direction,
    ) -> Result<Vec<EnrichedRequest>> {
        let requests = self.load_inbox(viewer_id, direction, None, None).await?;
        self.enrich(requests).await
    }

    /// One page of the inbox, starting strictly after `cursor`.
    ///
    /// `limit` is clamped to `1..=MAX_PAGE_SIZE`. `next_cursor` is set only
    /// when older entries remain.
    pub async fn project_inbox_page(
        &self,
        viewer_id: Uuid,
        direction: Direction,
        cursor: Option<InboxCursor>,
        limit: usize,
    ) -> Result<InboxPage> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);

        // One extra row tells us whether another page exists
        let mut requests = self
            .load_inbox(viewer_id, direction, cursor, Some(limit + 1))
            .await?;

        let next_cursor = if requests.len() > limit {
            requests.truncate(limit);
            requests.last().map(CollaborationRequest::cursor)
        } else {
            None
        };

        let items = self.enrich(requests).await?;
        Ok(InboxPage { items, next_cursor })
    }

    async fn load_inbox(
        &self,
        viewer_id: Uuid,
        direction: Direction,
        cursor: Option<InboxCursor>,
        limit: Option<usize>,
    ) -> Result<Vec<CollaborationRequest>> {
        let store = &self.store;
        self.retry
            .run("list_inbox", move || {
                store.list_inbox(viewer_id, direction, cursor, limit)
            })
            .await
    }

    async fn enrich(&self, requests: Vec<CollaborationRequest>) -> Result<Vec<EnrichedRequest>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let request_ids: Vec<Uuid> = requests.iter().map(|r| r.id).collect();
        let store = &self.store;
        let request_ids = &request_ids;
        let mut agreements: HashMap<Uuid, CollaborationAgreement> = self
            .retry
            .run("get_agreements", move || store.get_agreements(request_ids))
            .await?
            .into_iter()
            .map(|a| (a.request_id, a))
            .collect();

        let mut ids: Vec<Uuid> = requests
            .iter()
            .flat_map(|r| [r.sender_id, r.receiver_id])
            .collect();
        ids.sort();
        ids.dedup();

        let profiles = &self.profiles;
        let ids = &ids;
        let profiles: HashMap<Uuid, ProfileSummary> = self
            .retry
            .run("get_profiles", move || profiles.get_profiles(ids))
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let summary = |id: Uuid| {
            profiles
                .get(&id)
                .cloned()
                .unwrap_or_else(|| ProfileSummary::unknown(id))
        };

        Ok(requests
            .into_iter()
            .map(|request| EnrichedRequest {
                sender: summary(request.sender_id),
                receiver: summary(request.receiver_id),
                agreement: agreements.remove(&request.id),
                request,
            })
            .collect())
    }
}

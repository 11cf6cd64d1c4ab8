//! Collaboration workflow
//!
//! Requests between filmmakers, the payment terms attached to them, and the
//! inbox views built from both. Every mutation announces itself on a shared
//! [`ChangeFeed`] so open views can refetch.

mod agreement_manager;
mod projector;
mod request_manager;

pub use agreement_manager::AgreementManager;
pub use projector::{ViewProjector, MAX_PAGE_SIZE};
pub use request_manager::RequestManager;

use std::sync::Arc;

use uuid::Uuid;

use crate::changes::{ChangeFeed, ChangeFilter, Subscription};
use crate::retry::RetryPolicy;
use crate::store::{CollaborationStore, ProfileDirectory};

/// The managers wired to one store and one feed
#[derive(Clone)]
pub struct CollaborationService {
    pub requests: RequestManager,
    pub agreements: AgreementManager,
    pub inbox: ViewProjector,
    feed: ChangeFeed,
}

impl CollaborationService {
    pub fn new(
        store: Arc<dyn CollaborationStore>,
        profiles: Arc<dyn ProfileDirectory>,
        feed: ChangeFeed,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            requests: RequestManager::new(store.clone(), profiles.clone(), feed.clone(), retry),
            agreements: AgreementManager::new(store.clone(), feed.clone(), retry),
            inbox: ViewProjector::new(store, profiles, retry),
            feed,
        }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Changes to any request or agreement the user is a party to
    pub fn subscribe(&self, user_id: Uuid) -> Subscription {
        self.feed.subscribe(ChangeFilter::for_participant(user_id))
    }
}

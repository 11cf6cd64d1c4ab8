//! Request manager: creating, listing, answering and cancelling requests
//!
//! A request moves `pending -> accepted | declined` exactly once, at the hand
//! of its receiver, or is deleted by its sender while still pending. Status
//! writes are conditional on the row still being `pending`, so a response
//! that loses a race with another response or a cancellation is reported as
//! `InvalidState` or `NotFound` instead of silently overwriting.

use std::sync::Arc;

use uuid::Uuid;

use crate::changes::{ChangeEvent, ChangeFeed, ChangeOp, Table};
use crate::error::{AppError, Result};
use crate::models::{
    CollaborationAgreement, CollaborationRequest, Decision, RequestStatus, Terms,
};
use crate::retry::RetryPolicy;
use crate::store::{CollaborationStore, ProfileDirectory};

/// Manager for collaboration requests
#[derive(Clone)]
pub struct RequestManager {
    store: Arc<dyn CollaborationStore>,
    profiles: Arc<dyn ProfileDirectory>,
    feed: ChangeFeed,
    retry: RetryPolicy,
}

impl RequestManager {
    pub fn new(
        store: Arc<dyn CollaborationStore>,
        profiles: Arc<dyn ProfileDirectory>,
        feed: ChangeFeed,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            profiles,
            feed,
            retry,
        }
    }

    /// Send a request with the default terms
    pub async fn create_request(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        message: Option<String>,
    ) -> Result<(CollaborationRequest, CollaborationAgreement)> {
        self.create_request_with_terms(sender_id, receiver_id, message, Terms::default())
            .await
    }

    /// Send a request together with its proposed terms.
    ///
    /// Both records are written in one store call; nothing is persisted when
    /// validation fails.
    pub async fn create_request_with_terms(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        message: Option<String>,
        terms: Terms,
    ) -> Result<(CollaborationRequest, CollaborationAgreement)> {
        if sender_id == receiver_id {
            return Err(AppError::Validation(
                "You cannot send a collaboration request to yourself".to_string(),
            ));
        }

        if self.profiles.get_profile(receiver_id).await?.is_none() {
            return Err(AppError::Validation(format!(
                "User {} does not exist",
                receiver_id
            )));
        }

        let request = CollaborationRequest::new(sender_id, receiver_id, message);
        let agreement = CollaborationAgreement::new(request.id, terms);

        self.store
            .insert_request(&request, Some(&agreement))
            .await?;

        tracing::info!(
            request_id = %request.id,
            sender_id = %sender_id,
            receiver_id = %receiver_id,
            amount = agreement.payment_amount.value(),
            currency = agreement.currency.as_str(),
            "collaboration request created"
        );

        self.feed.publish(ChangeEvent::for_request(
            Table::CollaborationRequests,
            ChangeOp::Insert,
            request.id,
            &request,
        ));
        self.feed.publish(ChangeEvent::for_request(
            Table::CollaborationAgreements,
            ChangeOp::Insert,
            agreement.id,
            &request,
        ));

        Ok((request, agreement))
    }

    /// Every request the viewer sent or received, newest first
    pub async fn list_requests(&self, viewer_id: Uuid) -> Result<Vec<CollaborationRequest>> {
        let store = &self.store;
        self.retry
            .run("list_requests", move || store.list_requests(viewer_id))
            .await
    }

    /// Fetch one request the viewer is a party to
    pub async fn get_request(
        &self,
        request_id: Uuid,
        viewer_id: Uuid,
    ) -> Result<CollaborationRequest> {
        let store = &self.store;
        let request = self
            .retry
            .run("get_request", move || store.get_request(request_id))
            .await?
            .filter(|r| r.involves(viewer_id))
            .ok_or_else(|| not_found(request_id))?;

        Ok(request)
    }

    /// Accept or decline a request. Only its receiver may do this, and only
    /// while it is pending.
    pub async fn respond_to_request(
        &self,
        request_id: Uuid,
        actor_id: Uuid,
        decision: Decision,
    ) -> Result<CollaborationRequest> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| not_found(request_id))?;

        if request.receiver_id != actor_id {
            tracing::warn!(
                request_id = %request_id,
                actor_id = %actor_id,
                "respond_to_request denied: actor is not the receiver"
            );
            return Err(AppError::Authorization(
                "Only the receiver can respond to a collaboration request".to_string(),
            ));
        }

        if request.status != RequestStatus::Pending {
            return Err(already_resolved(&request));
        }

        let target = decision.request_status();
        let affected = self
            .store
            .update_request_status(request_id, RequestStatus::Pending, target)
            .await?;

        if affected == 0 {
            return Err(self.lost_race(request_id).await);
        }

        tracing::info!(
            request_id = %request_id,
            actor_id = %actor_id,
            status = target.as_str(),
            "collaboration request answered"
        );

        self.feed.publish(ChangeEvent::for_request(
            Table::CollaborationRequests,
            ChangeOp::Update,
            request_id,
            &request,
        ));

        Ok(CollaborationRequest {
            status: target,
            ..request
        })
    }

    /// Withdraw a pending request, together with its agreement. Only its
    /// sender may do this.
    pub async fn cancel_request(&self, request_id: Uuid, actor_id: Uuid) -> Result<()> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| not_found(request_id))?;

        if request.sender_id != actor_id {
            tracing::warn!(
                request_id = %request_id,
                actor_id = %actor_id,
                "cancel_request denied: actor is not the sender"
            );
            return Err(AppError::Authorization(
                "Only the sender can cancel a collaboration request".to_string(),
            ));
        }

        if request.status != RequestStatus::Pending {
            return Err(already_resolved(&request));
        }

        let affected = self
            .store
            .delete_pending_request(request_id, actor_id)
            .await?;

        if affected == 0 {
            return Err(self.lost_race(request_id).await);
        }

        tracing::info!(
            request_id = %request_id,
            sender_id = %actor_id,
            "collaboration request cancelled"
        );

        self.feed.publish(ChangeEvent::for_request(
            Table::CollaborationRequests,
            ChangeOp::Delete,
            request_id,
            &request,
        ));

        Ok(())
    }

    /// Explain why a conditional write touched nothing
    async fn lost_race(&self, request_id: Uuid) -> AppError {
        match self.store.get_request(request_id).await {
            Ok(Some(current)) => already_resolved(&current),
            Ok(None) => not_found(request_id),
            Err(e) => e,
        }
    }
}

fn not_found(request_id: Uuid) -> AppError {
    AppError::NotFound(format!("Collaboration request {} not found", request_id))
}

fn already_resolved(request: &CollaborationRequest) -> AppError {
    AppError::InvalidState(format!(
        "Collaboration request {} is already {}",
        request.id,
        request.status.as_str()
    ))
}

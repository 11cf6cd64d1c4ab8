//! Agreement manager: payment terms attached to a request
//!
//! Terms are answered by the request's receiver, and only once the request
//! itself has been accepted.

use std::sync::Arc;

use uuid::Uuid;

use crate::changes::{ChangeEvent, ChangeFeed, ChangeOp, Table};
use crate::error::{AppError, Result};
use crate::models::{
    AgreementStatus, CollaborationAgreement, CollaborationRequest, Decision, RequestStatus,
    Terms,
};
use crate::retry::RetryPolicy;
use crate::store::CollaborationStore;

/// Manager for payment agreements
#[derive(Clone)]
pub struct AgreementManager {
    store: Arc<dyn CollaborationStore>,
    feed: ChangeFeed,
    retry: RetryPolicy,
}

impl AgreementManager {
    pub fn new(store: Arc<dyn CollaborationStore>, feed: ChangeFeed, retry: RetryPolicy) -> Self {
        Self { store, feed, retry }
    }

    /// Attach terms to a request that has none yet
    pub async fn create_agreement(
        &self,
        request_id: Uuid,
        payment_amount: i64,
        currency: &str,
    ) -> Result<CollaborationAgreement> {
        let terms = Terms::parse(payment_amount, currency)?;
        let request = self.load_request(request_id).await?;
        self.insert_for(&request, terms).await
    }

    /// Attach terms on behalf of the request's sender
    pub async fn propose_terms(
        &self,
        request_id: Uuid,
        actor_id: Uuid,
        payment_amount: i64,
        currency: &str,
    ) -> Result<CollaborationAgreement> {
        let terms = Terms::parse(payment_amount, currency)?;
        let request = self.load_request(request_id).await?;

        if request.sender_id != actor_id {
            tracing::warn!(
                request_id = %request_id,
                actor_id = %actor_id,
                "propose_terms denied: actor is not the sender"
            );
            return Err(AppError::Authorization(
                "Only the sender can propose payment terms".to_string(),
            ));
        }

        self.insert_for(&request, terms).await
    }

    /// Terms attached to a request
    pub async fn get_agreement(&self, request_id: Uuid) -> Result<CollaborationAgreement> {
        let store = &self.store;
        self.retry
            .run("get_agreement", move || store.get_agreement(request_id))
            .await?
            .ok_or_else(|| agreement_not_found(request_id))
    }

    /// Accept or decline the terms of an accepted request
    pub async fn respond_to_agreement(
        &self,
        request_id: Uuid,
        actor_id: Uuid,
        decision: Decision,
    ) -> Result<CollaborationAgreement> {
        let request = self.load_request(request_id).await?;
        let agreement = self
            .store
            .get_agreement(request_id)
            .await?
            .ok_or_else(|| agreement_not_found(request_id))?;

        if request.receiver_id != actor_id {
            tracing::warn!(
                request_id = %request_id,
                actor_id = %actor_id,
                "respond_to_agreement denied: actor is not the receiver"
            );
            return Err(AppError::Authorization(
                "Only the receiver can respond to the payment terms".to_string(),
            ));
        }

        if request.status != RequestStatus::Accepted {
            return Err(AppError::InvalidState(format!(
                "Collaboration request {} is {}; terms can only be answered once it is accepted",
                request_id,
                request.status.as_str()
            )));
        }

        if agreement.status != AgreementStatus::Pending {
            return Err(terms_resolved(&agreement));
        }

        let target = decision.agreement_status();
        let affected = self
            .store
            .update_agreement_status(request_id, AgreementStatus::Pending, target)
            .await?;

        if affected == 0 {
            return Err(match self.store.get_agreement(request_id).await? {
                Some(current) => terms_resolved(&current),
                None => agreement_not_found(request_id),
            });
        }

        tracing::info!(
            request_id = %request_id,
            agreement_id = %agreement.id,
            actor_id = %actor_id,
            status = target.as_str(),
            "payment terms answered"
        );

        self.feed.publish(ChangeEvent::for_request(
            Table::CollaborationAgreements,
            ChangeOp::Update,
            agreement.id,
            &request,
        ));

        Ok(CollaborationAgreement {
            status: target,
            ..agreement
        })
    }

    async fn load_request(&self, request_id: Uuid) -> Result<CollaborationRequest> {
        self.store.get_request(request_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Collaboration request {} not found", request_id))
        })
    }

    async fn insert_for(
        &self,
        request: &CollaborationRequest,
        terms: Terms,
    ) -> Result<CollaborationAgreement> {
        if self.store.get_agreement(request.id).await?.is_some() {
            return Err(AppError::InvalidState(format!(
                "Collaboration request {} already has payment terms",
                request.id
            )));
        }

        let agreement = CollaborationAgreement::new(request.id, terms);
        if let Err(e) = self.store.insert_agreement(&agreement).await {
            return Err(self.failed_insert(request.id, e).await);
        }

        tracing::info!(
            request_id = %request.id,
            agreement_id = %agreement.id,
            amount = agreement.payment_amount.value(),
            currency = agreement.currency.as_str(),
            "payment terms attached"
        );

        self.feed.publish(ChangeEvent::for_request(
            Table::CollaborationAgreements,
            ChangeOp::Insert,
            agreement.id,
            request,
        ));

        Ok(agreement)
    }

    /// Explain an insert that lost a race with another insert or with a
    /// cancellation; anything else keeps its original error
    async fn failed_insert(&self, request_id: Uuid, error: AppError) -> AppError {
        match self.store.get_request(request_id).await {
            Ok(None) => {
                return AppError::NotFound(format!(
                    "Collaboration request {} not found",
                    request_id
                ))
            }
            Ok(Some(_)) => {}
            Err(_) => return error,
        }

        match self.store.get_agreement(request_id).await {
            Ok(Some(_)) => AppError::InvalidState(format!(
                "Collaboration request {} already has payment terms",
                request_id
            )),
            _ => error,
        }
    }
}

fn agreement_not_found(request_id: Uuid) -> AppError {
    AppError::NotFound(format!(
        "No payment terms for collaboration request {}",
        request_id
    ))
}

fn terms_resolved(agreement: &CollaborationAgreement) -> AppError {
    AppError::InvalidState(format!(
        "Payment terms {} are already {}",
        agreement.id,
        agreement.status.as_str()
    ))
}

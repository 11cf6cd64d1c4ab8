//! Change feed for collaboration records
//!
//! Every successful mutation publishes a [`ChangeEvent`]. Subscribers treat
//! events purely as "something you can see changed" and re-query; the event
//! fields exist only so a subscription can filter by table and participant.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::models::CollaborationRequest;

/// Tables whose rows are announced on the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    CollaborationRequests,
    CollaborationAgreements,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::CollaborationRequests => "collaboration_requests",
            Table::CollaborationAgreements => "collaboration_agreements",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// A row changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: Table,
    pub op: ChangeOp,
    pub record_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
}

impl ChangeEvent {
    /// Event for a change to a request or to the agreement owned by it
    pub fn for_request(
        table: Table,
        op: ChangeOp,
        record_id: Uuid,
        request: &CollaborationRequest,
    ) -> Self {
        Self {
            table,
            op,
            record_id,
            sender_id: request.sender_id,
            receiver_id: request.receiver_id,
        }
    }
}

/// Which events a subscription cares about
#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
    table: Option<Table>,
    participant: Option<Uuid>,
}

impl ChangeFilter {
    /// Everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Changes where the user is sender or receiver, on any table
    pub fn for_participant(user_id: Uuid) -> Self {
        Self {
            table: None,
            participant: Some(user_id),
        }
    }

    /// Restrict to a single table
    pub fn table(mut self, table: Table) -> Self {
        self.table = Some(table);
        self
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        let table_ok = self.table.map_or(true, |t| t == event.table);
        let participant_ok = self
            .participant
            .map_or(true, |p| event.sender_id == p || event.receiver_id == p);
        table_ok && participant_ok
    }
}

/// Broadcast hub for change events
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Announce a change. Having no subscribers is fine.
    pub fn publish(&self, event: ChangeEvent) {
        tracing::trace!(
            table = event.table.as_str(),
            op = ?event.op,
            record_id = %event.record_id,
            "publishing change"
        );
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self, filter: ChangeFilter) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

/// A filtered view of the feed; dropping it unsubscribes
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
    filter: ChangeFilter,
}

impl Subscription {
    /// Wait until something matching the filter changed.
    ///
    /// Falling behind counts as a change, since the missed events may have
    /// matched. Returns `None` once the feed is gone.
    pub async fn changed(&mut self) -> Option<()> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(()),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "change subscription lagged");
                    return Some(());
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Convert into a stream yielding one item per matching change
    pub fn into_stream(self) -> Pin<Box<dyn Stream<Item = ()> + Send>> {
        let filter = self.filter;
        let stream = BroadcastStream::new(self.rx).filter_map(move |item| match item {
            Ok(event) if filter.matches(&event) => Some(()),
            Ok(_) => None,
            // Lagged: missed events may have been relevant
            Err(_) => Some(()),
        });
        Box::pin(stream)
    }
}

//! SQLite-backed store for requests, agreements and profiles

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{CollaborationStore, ProfileDirectory};
use crate::error::{AppError, Result};
use crate::models::{
    AgreementStatus, CollaborationAgreement, CollaborationRequest, Direction, InboxCursor,
    PaymentAmount, ProfileSummary, RequestStatus,
};

/// Database store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply the bundled migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // Profile operations

    /// Insert or replace the display summary for a user
    pub async fn upsert_profile(&self, profile: &ProfileSummary) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO profiles (id, username, avatar_url, specialty, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                avatar_url = excluded.avatar_url,
                specialty = excluded.specialty,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(profile.id.to_string())
        .bind(&profile.username)
        .bind(profile.avatar_url.as_deref())
        .bind(profile.specialty.as_deref())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CollaborationStore for SqliteStore {
    async fn insert_request(
        &self,
        request: &CollaborationRequest,
        agreement: Option<&CollaborationAgreement>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO collaboration_requests (id, sender_id, receiver_id, message, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.id.to_string())
        .bind(request.sender_id.to_string())
        .bind(request.receiver_id.to_string())
        .bind(request.message.as_deref())
        .bind(request.status.as_str())
        .bind(request.created_at)
        .execute(&mut *tx)
        .await?;

        if let Some(agreement) = agreement {
            insert_agreement_row(&mut tx, agreement).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<CollaborationRequest>> {
        let row = sqlx::query_as::<_, RequestRow>(
            r#"
            SELECT id, sender_id, receiver_id, message, status, created_at
            FROM collaboration_requests
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(CollaborationRequest::try_from).transpose()
    }

    async fn list_requests(&self, viewer_id: Uuid) -> Result<Vec<CollaborationRequest>> {
        let rows = sqlx::query_as::<_, RequestRow>(
            r#"
            SELECT id, sender_id, receiver_id, message, status, created_at
            FROM collaboration_requests
            WHERE sender_id = ? OR receiver_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(viewer_id.to_string())
        .bind(viewer_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn list_inbox(
        &self,
        viewer_id: Uuid,
        direction: Direction,
        cursor: Option<InboxCursor>,
        limit: Option<usize>,
    ) -> Result<Vec<CollaborationRequest>> {
        let column = match direction {
            Direction::Received => "receiver_id",
            Direction::Sent => "sender_id",
        };

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, sender_id, receiver_id, message, status, created_at \
             FROM collaboration_requests WHERE ",
        );
        query.push(column).push(" = ").push_bind(viewer_id.to_string());

        if let Some(cursor) = cursor {
            query
                .push(" AND (created_at < ")
                .push_bind(cursor.created_at)
                .push(" OR (created_at = ")
                .push_bind(cursor.created_at)
                .push(" AND id < ")
                .push_bind(cursor.id.to_string())
                .push("))");
        }

        query.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = limit {
            query.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = query
            .build_query_as::<RequestRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn update_request_status(
        &self,
        id: Uuid,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE collaboration_requests SET status = ? WHERE id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_pending_request(&self, id: Uuid, sender_id: Uuid) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM collaboration_agreements
            WHERE request_id IN (
                SELECT id FROM collaboration_requests
                WHERE id = ? AND sender_id = ? AND status = 'pending'
            )
            "#,
        )
        .bind(id.to_string())
        .bind(sender_id.to_string())
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            DELETE FROM collaboration_requests
            WHERE id = ? AND sender_id = ? AND status = 'pending'
            "#,
        )
        .bind(id.to_string())
        .bind(sender_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn insert_agreement(&self, agreement: &CollaborationAgreement) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_agreement_row(&mut tx, agreement).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_agreement(&self, request_id: Uuid) -> Result<Option<CollaborationAgreement>> {
        let row = sqlx::query_as::<_, AgreementRow>(
            r#"
            SELECT id, request_id, payment_amount, currency, status, created_at
            FROM collaboration_agreements
            WHERE request_id = ?
            "#,
        )
        .bind(request_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(CollaborationAgreement::try_from).transpose()
    }

    async fn get_agreements(&self, request_ids: &[Uuid]) -> Result<Vec<CollaborationAgreement>> {
        if request_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, request_id, payment_amount, currency, status, created_at \
             FROM collaboration_agreements WHERE request_id IN (",
        );
        let mut separated = query.separated(", ");
        for id in request_ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");

        let rows = query
            .build_query_as::<AgreementRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn update_agreement_status(
        &self,
        request_id: Uuid,
        from: AgreementStatus,
        to: AgreementStatus,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE collaboration_agreements SET status = ? WHERE request_id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(request_id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ProfileDirectory for SqliteStore {
    async fn get_profile(&self, id: Uuid) -> Result<Option<ProfileSummary>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT id, username, avatar_url, specialty FROM profiles WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProfileSummary::try_from).transpose()
    }

    async fn get_profiles(&self, ids: &[Uuid]) -> Result<Vec<ProfileSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, username, avatar_url, specialty FROM profiles WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");

        let rows = query
            .build_query_as::<ProfileRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }
}

async fn insert_agreement_row(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    agreement: &CollaborationAgreement,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO collaboration_agreements (id, request_id, payment_amount, currency, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(agreement.id.to_string())
    .bind(agreement.request_id.to_string())
    .bind(i64::from(agreement.payment_amount.value()))
    .bind(agreement.currency.as_str())
    .bind(agreement.status.as_str())
    .bind(agreement.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn parse_uuid(value: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| AppError::Internal(format!("Invalid {} UUID: {}", field, e)))
}

// Internal row types for sqlx

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: String,
    sender_id: String,
    receiver_id: String,
    message: Option<String>,
    status: String,
    created_at: chrono::DateTime<Utc>,
}

impl TryFrom<RequestRow> for CollaborationRequest {
    type Error = AppError;

    fn try_from(row: RequestRow) -> Result<Self> {
        Ok(CollaborationRequest {
            id: parse_uuid(&row.id, "id")?,
            sender_id: parse_uuid(&row.sender_id, "sender_id")?,
            receiver_id: parse_uuid(&row.receiver_id, "receiver_id")?,
            message: row.message,
            status: row
                .status
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid status: {}", e)))?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AgreementRow {
    id: String,
    request_id: String,
    payment_amount: i64,
    currency: String,
    status: String,
    created_at: chrono::DateTime<Utc>,
}

impl TryFrom<AgreementRow> for CollaborationAgreement {
    type Error = AppError;

    fn try_from(row: AgreementRow) -> Result<Self> {
        Ok(CollaborationAgreement {
            id: parse_uuid(&row.id, "id")?,
            request_id: parse_uuid(&row.request_id, "request_id")?,
            payment_amount: PaymentAmount::new(row.payment_amount)
                .map_err(|e| AppError::Internal(format!("Invalid payment amount: {}", e)))?,
            currency: row
                .currency
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid currency: {}", e)))?,
            status: row
                .status
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid status: {}", e)))?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: String,
    username: String,
    avatar_url: Option<String>,
    specialty: Option<String>,
}

impl TryFrom<ProfileRow> for ProfileSummary {
    type Error = AppError;

    fn try_from(row: ProfileRow) -> Result<Self> {
        Ok(ProfileSummary {
            id: parse_uuid(&row.id, "id")?,
            username: row.username,
            avatar_url: row.avatar_url,
            specialty: row.specialty,
        })
    }
}

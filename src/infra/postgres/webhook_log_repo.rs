use {
    crate::domain::{
        error::PipelineError,
        metadata::Metadata,
        webhook_log::{LoggedAttempt, NewWebhookLogEntry, WebhookLogRecord, WebhookLogStatus},
    },
    chrono::{DateTime, Utc},
    sqlx::{PgPool, types::Json},
    uuid::Uuid,
};

/// Append an entry. The attempt number counts prior non-pending entries in
/// the same (payment, event type) stream; the error count includes this one.
pub async fn insert(
    pool: &PgPool,
    entry: &NewWebhookLogEntry,
) -> Result<LoggedAttempt, PipelineError> {
    let (attempt, error_count): (i32, i64) = sqlx::query_as(
        r#"
        WITH prior AS (
            SELECT COUNT(*) FILTER (WHERE status <> 'pending') AS attempts,
                   COUNT(*) FILTER (WHERE status = 'error') AS errors
            FROM webhook_logs
            WHERE payment_ref = $2 AND event_type = $4
        ),
        ins AS (
            INSERT INTO webhook_logs
                (id, payment_ref, provider_session_id, event_type, offer_id, lander_id,
                 status, message, attempt, metadata)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, (prior.attempts + 1)::int, $9
            FROM prior
            RETURNING attempt
        )
        SELECT ins.attempt,
               prior.errors + CASE WHEN $7 = 'error' THEN 1 ELSE 0 END
        FROM ins, prior
        "#,
    )
    .bind(entry.id)
    .bind(&entry.payment_ref)
    .bind(entry.provider_session_id.as_deref())
    .bind(&entry.event_type)
    .bind(entry.offer_id.as_deref())
    .bind(entry.lander_id.as_deref())
    .bind(entry.status.as_str())
    .bind(entry.message.as_deref())
    .bind(Json(&entry.metadata))
    .fetch_one(pool)
    .await?;

    Ok(LoggedAttempt {
        attempt,
        error_count,
    })
}

#[derive(sqlx::FromRow)]
struct LogRow {
    id: Uuid,
    payment_ref: String,
    provider_session_id: Option<String>,
    event_type: String,
    offer_id: Option<String>,
    lander_id: Option<String>,
    status: String,
    message: Option<String>,
    attempt: i32,
    metadata: Json<Metadata>,
    created_at: DateTime<Utc>,
}

pub async fn list_for_payment(
    pool: &PgPool,
    payment_ref: &str,
) -> Result<Vec<WebhookLogRecord>, PipelineError> {
    let rows: Vec<LogRow> = sqlx::query_as(
        r#"
        SELECT id, payment_ref, provider_session_id, event_type, offer_id, lander_id,
               status, message, attempt, metadata, created_at
        FROM webhook_logs
        WHERE payment_ref = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(payment_ref)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(WebhookLogRecord {
                id: row.id,
                payment_ref: row.payment_ref,
                provider_session_id: row.provider_session_id,
                event_type: row.event_type,
                offer_id: row.offer_id,
                lander_id: row.lander_id,
                status: WebhookLogStatus::try_from(row.status.as_str())?,
                message: row.message,
                attempt: row.attempt,
                metadata: row.metadata.0,
                created_at: row.created_at,
            })
        })
        .collect()
}

use {
    crate::domain::{
        checkout::{
            CheckoutSessionRecord, CheckoutSessionUpsert, CheckoutSource, CheckoutStatus,
            SessionUpdate,
        },
        error::PipelineError,
        metadata::Metadata,
    },
    chrono::{DateTime, Utc},
    sqlx::{PgPool, types::Json},
    std::time::Duration,
    uuid::Uuid,
};

const SESSION_COLUMNS: &str = "id, provider_session_id, payment_intent_id, offer_id, lander_id, \
     customer_email, metadata, status, source, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    provider_session_id: String,
    payment_intent_id: Option<String>,
    offer_id: Option<String>,
    lander_id: Option<String>,
    customer_email: Option<String>,
    metadata: Json<Metadata>,
    status: String,
    source: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for CheckoutSessionRecord {
    type Error = PipelineError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            provider_session_id: row.provider_session_id,
            payment_intent_id: row.payment_intent_id,
            offer_id: row.offer_id,
            lander_id: row.lander_id,
            customer_email: row.customer_email,
            metadata: row.metadata.0,
            status: CheckoutStatus::try_from(row.status.as_str())?,
            source: CheckoutSource::try_from(row.source.as_str())?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Single-statement upsert. Status moves forward only (ranked in SQL),
/// scalars are COALESCEd, incoming metadata keys overwrite stored keys.
pub async fn upsert(
    pool: &PgPool,
    session: &CheckoutSessionUpsert,
) -> Result<CheckoutSessionRecord, PipelineError> {
    let sql = format!(
        r#"
        INSERT INTO checkout_sessions
            (id, provider_session_id, payment_intent_id, offer_id, lander_id,
             customer_email, metadata, status, source)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (provider_session_id) DO UPDATE SET
            payment_intent_id = COALESCE(EXCLUDED.payment_intent_id, checkout_sessions.payment_intent_id),
            offer_id = COALESCE(EXCLUDED.offer_id, checkout_sessions.offer_id),
            lander_id = COALESCE(EXCLUDED.lander_id, checkout_sessions.lander_id),
            customer_email = COALESCE(EXCLUDED.customer_email, checkout_sessions.customer_email),
            metadata = checkout_sessions.metadata || EXCLUDED.metadata,
            status = CASE
                WHEN checkout_status_rank(EXCLUDED.status) > checkout_status_rank(checkout_sessions.status)
                THEN EXCLUDED.status
                ELSE checkout_sessions.status
            END,
            updated_at = now()
        RETURNING {SESSION_COLUMNS}
        "#
    );

    let row: SessionRow = sqlx::query_as(&sql)
        .bind(Uuid::now_v7())
        .bind(&session.provider_session_id)
        .bind(session.payment_intent_id.as_deref())
        .bind(session.offer_id.as_deref())
        .bind(session.lander_id.as_deref())
        .bind(session.customer_email.as_deref())
        .bind(Json(&session.metadata))
        .bind(session.status.as_str())
        .bind(session.source.as_str())
        .fetch_one(pool)
        .await?;

    row.try_into()
}

pub enum SessionKey<'a> {
    ProviderSessionId(&'a str),
    /// Latest session carrying this payment intent.
    PaymentIntentId(&'a str),
}

pub async fn update(
    pool: &PgPool,
    key: SessionKey<'_>,
    update: &SessionUpdate,
) -> Result<Option<CheckoutSessionRecord>, PipelineError> {
    let (predicate, key_value) = match key {
        SessionKey::ProviderSessionId(id) => ("provider_session_id = $1", id),
        SessionKey::PaymentIntentId(id) => (
            "id = (SELECT id FROM checkout_sessions WHERE payment_intent_id = $1 \
             ORDER BY created_at DESC LIMIT 1)",
            id,
        ),
    };

    let sql = format!(
        r#"
        UPDATE checkout_sessions SET
            status = CASE
                WHEN $2::text IS NOT NULL
                     AND checkout_status_rank($2::text) > checkout_status_rank(status)
                THEN $2::text
                ELSE status
            END,
            payment_intent_id = COALESCE($3, payment_intent_id),
            customer_email = COALESCE($4, customer_email),
            metadata = metadata || $5,
            updated_at = now()
        WHERE {predicate}
        RETURNING {SESSION_COLUMNS}
        "#
    );

    let row: Option<SessionRow> = sqlx::query_as(&sql)
        .bind(key_value)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.payment_intent_id.as_deref())
        .bind(update.customer_email.as_deref())
        .bind(Json(&update.metadata))
        .fetch_optional(pool)
        .await?;

    row.map(TryInto::try_into).transpose()
}

pub async fn find(
    pool: &PgPool,
    provider_session_id: &str,
) -> Result<Option<CheckoutSessionRecord>, PipelineError> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM checkout_sessions WHERE provider_session_id = $1"
    );
    let row: Option<SessionRow> = sqlx::query_as(&sql)
        .bind(provider_session_id)
        .fetch_optional(pool)
        .await?;

    row.map(TryInto::try_into).transpose()
}

/// `pending` sessions older than `ttl` become `abandoned`. The status guard
/// keeps this safe next to concurrent completions.
pub async fn mark_stale(pool: &PgPool, ttl: Duration) -> Result<u64, PipelineError> {
    let result = sqlx::query(
        r#"
        UPDATE checkout_sessions
        SET status = 'abandoned', updated_at = now()
        WHERE status = 'pending'
          AND created_at < now() - make_interval(secs => $1)
        "#,
    )
    .bind(ttl.as_secs_f64())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

use {
    crate::domain::{
        checkout::CheckoutSource,
        error::PipelineError,
        metadata::Metadata,
        order::{OrderRecord, OrderUpsert},
    },
    chrono::{DateTime, Utc},
    sqlx::{PgPool, types::Json},
    uuid::Uuid,
};

const ORDER_COLUMNS: &str = "id, payment_ref, checkout_session_id, provider_session_id, offer_id, \
     lander_id, customer_email, customer_name, amount_total, currency, payment_status, \
     payment_method, metadata, source, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    payment_ref: String,
    checkout_session_id: Option<Uuid>,
    provider_session_id: Option<String>,
    offer_id: Option<String>,
    lander_id: Option<String>,
    customer_email: Option<String>,
    customer_name: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
    payment_status: Option<String>,
    payment_method: Option<String>,
    metadata: Json<Metadata>,
    source: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for OrderRecord {
    type Error = PipelineError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            payment_ref: row.payment_ref,
            checkout_session_id: row.checkout_session_id,
            provider_session_id: row.provider_session_id,
            offer_id: row.offer_id,
            lander_id: row.lander_id,
            customer_email: row.customer_email,
            customer_name: row.customer_name,
            amount_total: row.amount_total,
            currency: row.currency,
            payment_status: row.payment_status,
            payment_method: row.payment_method,
            metadata: row.metadata.0,
            source: CheckoutSource::try_from(row.source.as_str())?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Idempotency anchor: one row per payment reference. A later event with
/// null scalars cannot erase earlier values, and stored metadata keys win
/// over incoming ones.
pub async fn upsert(pool: &PgPool, order: &OrderUpsert) -> Result<OrderRecord, PipelineError> {
    let sql = format!(
        r#"
        INSERT INTO orders
            (id, payment_ref, checkout_session_id, provider_session_id, offer_id, lander_id,
             customer_email, customer_name, amount_total, currency, payment_status,
             payment_method, metadata, source)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (payment_ref) DO UPDATE SET
            checkout_session_id = COALESCE(EXCLUDED.checkout_session_id, orders.checkout_session_id),
            provider_session_id = COALESCE(EXCLUDED.provider_session_id, orders.provider_session_id),
            offer_id = COALESCE(EXCLUDED.offer_id, orders.offer_id),
            lander_id = COALESCE(EXCLUDED.lander_id, orders.lander_id),
            customer_email = COALESCE(EXCLUDED.customer_email, orders.customer_email),
            customer_name = COALESCE(EXCLUDED.customer_name, orders.customer_name),
            amount_total = COALESCE(EXCLUDED.amount_total, orders.amount_total),
            currency = COALESCE(EXCLUDED.currency, orders.currency),
            payment_status = COALESCE(EXCLUDED.payment_status, orders.payment_status),
            payment_method = COALESCE(EXCLUDED.payment_method, orders.payment_method),
            metadata = EXCLUDED.metadata || orders.metadata,
            updated_at = now()
        RETURNING {ORDER_COLUMNS}
        "#
    );

    let row: OrderRow = sqlx::query_as(&sql)
        .bind(Uuid::now_v7())
        .bind(&order.payment_ref)
        .bind(order.checkout_session_id)
        .bind(order.provider_session_id.as_deref())
        .bind(order.offer_id.as_deref())
        .bind(order.lander_id.as_deref())
        .bind(order.customer_email.as_deref())
        .bind(order.customer_name.as_deref())
        .bind(order.amount_total)
        .bind(order.currency.as_deref())
        .bind(order.payment_status.as_deref())
        .bind(order.payment_method.as_deref())
        .bind(Json(&order.metadata))
        .bind(order.source.unwrap_or(CheckoutSource::Stripe).as_str())
        .fetch_one(pool)
        .await?;

    row.try_into()
}

/// Explicit overwrite of the patch's keys; other keys are untouched.
pub async fn merge_metadata(
    pool: &PgPool,
    payment_ref: &str,
    patch: &Metadata,
) -> Result<bool, PipelineError> {
    let result = sqlx::query(
        "UPDATE orders SET metadata = metadata || $2, updated_at = now() WHERE payment_ref = $1",
    )
    .bind(payment_ref)
    .bind(Json(patch))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn find(pool: &PgPool, payment_ref: &str) -> Result<Option<OrderRecord>, PipelineError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE payment_ref = $1");
    let row: Option<OrderRow> = sqlx::query_as(&sql)
        .bind(payment_ref)
        .fetch_optional(pool)
        .await?;

    row.map(TryInto::try_into).transpose()
}

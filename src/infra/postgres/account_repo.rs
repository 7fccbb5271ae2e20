use {crate::domain::error::PipelineError, sqlx::PgPool, uuid::Uuid};

/// Upsert by lower-cased email; an existing name is never replaced.
pub async fn ensure_account(
    pool: &PgPool,
    email: &str,
    name: Option<&str>,
) -> Result<Uuid, PipelineError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(PipelineError::Validation("account email is empty".into()));
    }

    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO accounts (id, email, name)
        VALUES ($1, $2, NULLIF(btrim($3), ''))
        ON CONFLICT (email) DO UPDATE
        SET name = COALESCE(accounts.name, EXCLUDED.name),
            updated_at = now()
        RETURNING id
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(&email)
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

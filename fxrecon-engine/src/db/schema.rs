//! Database schema bootstrap

use sqlx::SqlitePool;

/// Create all tables and indexes if they do not exist.
pub async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tenants (
            id                  TEXT PRIMARY KEY,
            name                TEXT NOT NULL,
            confirmation_email  TEXT NOT NULL,
            language            TEXT NOT NULL DEFAULT 'es',
            automation_config   TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tenants_confirmation_email
         ON tenants(confirmation_email)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trades (
            id                          TEXT PRIMARY KEY,
            tenant_id                   TEXT NOT NULL,
            trade_number                TEXT NOT NULL,
            counterparty_name           TEXT NOT NULL,
            product_type                TEXT NOT NULL,
            direction                   TEXT NOT NULL,
            currency1                   TEXT NOT NULL,
            currency2                   TEXT NOT NULL,
            quantity_currency1          TEXT NOT NULL,
            price                       TEXT NOT NULL,
            trade_date                  TEXT NOT NULL,
            value_date                  TEXT,
            maturity_date               TEXT,
            payment_date                TEXT,
            settlement_type             TEXT,
            settlement_currency         TEXT,
            fixing_reference            TEXT,
            our_payment_method          TEXT,
            counterparty_payment_method TEXT,
            status                      TEXT NOT NULL DEFAULT 'unmatched',
            created_at                  TEXT NOT NULL,
            UNIQUE(tenant_id, trade_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_trades_tenant_status
         ON trades(tenant_id, status)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS emails (
            id                 TEXT PRIMARY KEY,
            tenant_id          TEXT NOT NULL,
            sender_email       TEXT,
            subject            TEXT,
            email_date         TEXT,
            email_time         TEXT,
            body               TEXT,
            source_file        TEXT,
            llm_payload        TEXT NOT NULL,
            has_duplicates     INTEGER NOT NULL DEFAULT 0,
            duplicate_info     TEXT NOT NULL DEFAULT '[]',
            extraction_failed  INTEGER NOT NULL DEFAULT 0,
            created_at         TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_emails_tenant
         ON emails(tenant_id, created_at)",
    )
    .execute(pool)
    .await?;

    // UNIQUE(trade_id): a matched trade has exactly one match record.
    // UNIQUE(email_id, extracted_trade_index): one match per extracted trade.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS matches (
            match_id               TEXT PRIMARY KEY,
            tenant_id              TEXT NOT NULL,
            trade_id               TEXT NOT NULL UNIQUE,
            email_id               TEXT NOT NULL,
            extracted_trade_index  INTEGER NOT NULL,
            confidence_score       INTEGER NOT NULL,
            status                 TEXT NOT NULL,
            match_reasons          TEXT NOT NULL DEFAULT '[]',
            discrepancies          TEXT NOT NULL DEFAULT '[]',
            created_at             TEXT NOT NULL,
            UNIQUE(email_id, extracted_trade_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS upload_sessions (
            id                 TEXT PRIMARY KEY,
            tenant_id          TEXT NOT NULL,
            file_name          TEXT NOT NULL,
            file_type          TEXT NOT NULL,
            records_processed  INTEGER NOT NULL DEFAULT 0,
            records_failed     INTEGER NOT NULL DEFAULT 0,
            status             TEXT NOT NULL,
            started_at         TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

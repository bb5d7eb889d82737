//! Tenant lookup and automation configuration

use super::{StoreError, StoreResult};
use fxrecon_common::model::{Tenant, TenantAutomationConfig};
use sqlx::{Row, SqlitePool};

pub async fn insert_tenant(pool: &SqlitePool, tenant: &Tenant) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO tenants (id, name, confirmation_email, language) VALUES (?, ?, ?, ?)",
    )
    .bind(&tenant.id)
    .bind(&tenant.name)
    .bind(tenant.confirmation_email.to_lowercase())
    .bind(&tenant.language)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_tenant(pool: &SqlitePool, tenant_id: &str) -> StoreResult<Tenant> {
    let row = sqlx::query("SELECT id, name, confirmation_email, language FROM tenants WHERE id = ?")
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("tenant {tenant_id}")))?;

    Ok(tenant_from_row(&row))
}

/// Resolve the owning tenant from the recipient addresses of a
/// mailbox-sourced message. Monitoring addresses never resolve; the
/// first recipient registered as a tenant confirmation address wins.
pub async fn find_by_confirmation_email(
    pool: &SqlitePool,
    addresses: &[String],
) -> StoreResult<Option<Tenant>> {
    for address in addresses {
        let row = sqlx::query(
            "SELECT id, name, confirmation_email, language FROM tenants WHERE confirmation_email = ?",
        )
        .bind(address.trim().to_lowercase())
        .fetch_optional(pool)
        .await?;
        if let Some(row) = row {
            return Ok(Some(tenant_from_row(&row)));
        }
    }
    Ok(None)
}

/// Load the tenant's automation config; missing config means all
/// automation disabled.
pub async fn automation_config(
    pool: &SqlitePool,
    tenant_id: &str,
) -> StoreResult<TenantAutomationConfig> {
    let row = sqlx::query("SELECT automation_config FROM tenants WHERE id = ?")
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("tenant {tenant_id}")))?;

    let raw: Option<String> = row.get("automation_config");
    match raw {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| StoreError::Fatal(format!("corrupt automation config: {e}"))),
        None => Ok(TenantAutomationConfig::default()),
    }
}

/// Replace the tenant's automation config (configuration surface is
/// external; this exists for bootstrap and tests).
pub async fn set_automation_config(
    pool: &SqlitePool,
    tenant_id: &str,
    config: &TenantAutomationConfig,
) -> StoreResult<()> {
    let json = serde_json::to_string(config)
        .map_err(|e| StoreError::Fatal(format!("failed to serialize automation config: {e}")))?;

    let result = sqlx::query("UPDATE tenants SET automation_config = ? WHERE id = ?")
        .bind(json)
        .bind(tenant_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("tenant {tenant_id}")));
    }
    Ok(())
}

fn tenant_from_row(row: &sqlx::sqlite::SqliteRow) -> Tenant {
    Tenant {
        id: row.get("id"),
        name: row.get("name"),
        confirmation_email: row.get("confirmation_email"),
        language: row.get("language"),
    }
}

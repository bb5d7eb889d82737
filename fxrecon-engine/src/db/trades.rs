//! Client trade queries

use super::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use fxrecon_common::model::{Direction, ProductType, SettlementType, Trade, TradeStatus};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

/// Insert a client trade (CSV import and test fixtures).
pub async fn insert_trade(pool: &SqlitePool, trade: &Trade) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO trades (
            id, tenant_id, trade_number, counterparty_name, product_type,
            direction, currency1, currency2, quantity_currency1, price,
            trade_date, value_date, maturity_date, payment_date,
            settlement_type, settlement_currency, fixing_reference,
            our_payment_method, counterparty_payment_method, status, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(trade.id.to_string())
    .bind(&trade.tenant_id)
    .bind(&trade.trade_number)
    .bind(&trade.counterparty_name)
    .bind(trade.product_type.to_string())
    .bind(trade.direction.to_string())
    .bind(&trade.currency1)
    .bind(&trade.currency2)
    .bind(trade.quantity_currency1.to_string())
    .bind(trade.price.to_string())
    .bind(&trade.trade_date)
    .bind(&trade.value_date)
    .bind(&trade.maturity_date)
    .bind(&trade.payment_date)
    .bind(trade.settlement_type.map(|s| s.to_string()))
    .bind(&trade.settlement_currency)
    .bind(&trade.fixing_reference)
    .bind(&trade.our_payment_method)
    .bind(&trade.counterparty_payment_method)
    .bind(trade.status.as_str())
    .bind(trade.created_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

/// All trades of a tenant still awaiting a bank confirmation.
///
/// Ordered by insertion time with trade number as a total tie-break,
/// which makes the matching engine's first-wins selection stable.
pub async fn get_unmatched_trades(pool: &SqlitePool, tenant_id: &str) -> StoreResult<Vec<Trade>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM trades
        WHERE tenant_id = ? AND status = 'unmatched'
        ORDER BY created_at, trade_number
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(trade_from_row).collect()
}

/// Trades already flipped to `matched`, in the same stable order.
///
/// The matching engine scans these when no unmatched candidate clears
/// the score threshold, to classify repeated confirmations as
/// duplicates rather than unrecognized.
pub async fn get_matched_trades(pool: &SqlitePool, tenant_id: &str) -> StoreResult<Vec<Trade>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM trades
        WHERE tenant_id = ? AND status = 'matched'
        ORDER BY created_at, trade_number
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(trade_from_row).collect()
}

/// Single trade lookup, scoped to the tenant.
pub async fn get_trade(pool: &SqlitePool, tenant_id: &str, trade_id: Uuid) -> StoreResult<Trade> {
    let row = sqlx::query("SELECT * FROM trades WHERE tenant_id = ? AND id = ?")
        .bind(tenant_id)
        .bind(trade_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("trade {trade_id}")))?;

    trade_from_row(&row)
}

pub(crate) fn trade_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Trade> {
    let id: String = row.get("id");
    let product_type: String = row.get("product_type");
    let direction: String = row.get("direction");
    let quantity: String = row.get("quantity_currency1");
    let price: String = row.get("price");
    let status: String = row.get("status");
    let settlement_type: Option<String> = row.get("settlement_type");
    let created_at: String = row.get("created_at");

    Ok(Trade {
        id: Uuid::parse_str(&id).map_err(|e| StoreError::Fatal(format!("bad trade id: {e}")))?,
        tenant_id: row.get("tenant_id"),
        trade_number: row.get("trade_number"),
        counterparty_name: row.get("counterparty_name"),
        product_type: parse_product_type(&product_type)?,
        direction: parse_direction(&direction)?,
        currency1: row.get("currency1"),
        currency2: row.get("currency2"),
        quantity_currency1: parse_decimal_column(&quantity, "quantity_currency1")?,
        price: parse_decimal_column(&price, "price")?,
        trade_date: row.get("trade_date"),
        value_date: row.get("value_date"),
        maturity_date: row.get("maturity_date"),
        payment_date: row.get("payment_date"),
        settlement_type: settlement_type.as_deref().map(parse_settlement_type).transpose()?,
        settlement_currency: row.get("settlement_currency"),
        fixing_reference: row.get("fixing_reference"),
        our_payment_method: row.get("our_payment_method"),
        counterparty_payment_method: row.get("counterparty_payment_method"),
        status: parse_trade_status(&status)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn parse_product_type(raw: &str) -> StoreResult<ProductType> {
    match raw {
        "Spot" => Ok(ProductType::Spot),
        "Forward" => Ok(ProductType::Forward),
        other => Err(StoreError::Fatal(format!("unknown product type: {other}"))),
    }
}

fn parse_direction(raw: &str) -> StoreResult<Direction> {
    match raw {
        "Buy" => Ok(Direction::Buy),
        "Sell" => Ok(Direction::Sell),
        other => Err(StoreError::Fatal(format!("unknown direction: {other}"))),
    }
}

fn parse_settlement_type(raw: &str) -> StoreResult<SettlementType> {
    match raw {
        "Compensación" => Ok(SettlementType::Compensacion),
        "Entrega Física" => Ok(SettlementType::EntregaFisica),
        other => Err(StoreError::Fatal(format!("unknown settlement type: {other}"))),
    }
}

fn parse_trade_status(raw: &str) -> StoreResult<TradeStatus> {
    match raw {
        "unmatched" => Ok(TradeStatus::Unmatched),
        "matched" => Ok(TradeStatus::Matched),
        "confirmed_via_portal" => Ok(TradeStatus::ConfirmedViaPortal),
        other => Err(StoreError::Fatal(format!("unknown trade status: {other}"))),
    }
}

fn parse_decimal_column(raw: &str, column: &str) -> StoreResult<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| StoreError::Fatal(format!("bad decimal in {column}: {e}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Fatal(format!("bad timestamp: {e}")))
}

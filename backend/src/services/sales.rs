//! POS checkout and refunds
//!
//! Checkout and refund both post their stock movements through the ledger
//! inside the same transaction that writes the sale, so a failed line leaves
//! neither stock nor sale behind.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::services::stock_ledger::StockLedger;
use shared::{
    CartItem, DomainError, Payment, PaymentInput, PaymentMethod, Refund, Sale, SaleEvent, SaleLine,
    SaleStatus, SaleTotals, StockMovementType,
};

/// Sale transaction processor
#[derive(Clone)]
pub struct SaleTransactionProcessor {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

/// Checkout request from a terminal
#[derive(Debug, Deserialize)]
pub struct CheckoutInput {
    pub items: Vec<CartItem>,
    pub payments: Vec<PaymentInput>,
    pub customer_id: Option<i64>,
}

/// Refund request
#[derive(Debug, Default, Deserialize)]
pub struct RefundInput {
    pub reason: Option<String>,
}

#[derive(Debug, FromRow)]
struct SaleRow {
    id: i64,
    reference: String,
    status: String,
    customer_id: Option<i64>,
    total: Decimal,
    paid: Decimal,
    change_amount: Decimal,
    cashier_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SaleRow {
    fn status(&self) -> AppResult<SaleStatus> {
        self.status
            .parse()
            .map_err(|e: DomainError| AppError::Internal(e.to_string()))
    }

    fn into_sale(self, lines: Vec<SaleLine>, payments: Vec<Payment>) -> AppResult<Sale> {
        Ok(Sale {
            status: self.status()?,
            id: self.id,
            reference: self.reference,
            customer_id: self.customer_id,
            total: self.total,
            paid: self.paid,
            change: self.change_amount,
            lines,
            payments,
            cashier_id: self.cashier_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SaleLineRow {
    id: i64,
    variant_id: i64,
    quantity: i32,
    unit_price: Decimal,
    subtotal: Decimal,
}

impl From<SaleLineRow> for SaleLine {
    fn from(row: SaleLineRow) -> Self {
        SaleLine {
            id: row.id,
            variant_id: row.variant_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            subtotal: row.subtotal,
        }
    }
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: i64,
    method: String,
    amount: Decimal,
    reference: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = AppError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let method = row
            .method
            .parse::<PaymentMethod>()
            .map_err(|e| AppError::Internal(e.to_string()))?;

        Ok(Payment {
            id: row.id,
            method,
            amount: row.amount,
            reference: row.reference,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RefundRow {
    id: i64,
    sale_id: i64,
    amount: Decimal,
    reason: Option<String>,
    refunded_by: i64,
    created_at: DateTime<Utc>,
}

impl From<RefundRow> for Refund {
    fn from(row: RefundRow) -> Self {
        Refund {
            id: row.id,
            sale_id: row.sale_id,
            amount: row.amount,
            reason: row.reason,
            refunded_by: row.refunded_by,
            created_at: row.created_at,
        }
    }
}

const SALE_COLUMNS: &str = "id, reference, status, customer_id, total, paid, change_amount, \
                            cashier_id, created_at, updated_at";

const REFUND_COLUMNS: &str = "id, sale_id, amount, reason, refunded_by, created_at";

impl SaleTransactionProcessor {
    /// Create a new SaleTransactionProcessor instance
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Sell the cart. Any line short on stock aborts the whole checkout.
    pub async fn checkout(&self, input: CheckoutInput, cashier: i64) -> AppResult<Sale> {
        shared::validate_cart(&input.items)?;
        let now = self.clock.now();

        let mut tx = self.db.begin().await?;

        let variant_ids: Vec<i64> = input.items.iter().map(|i| i.variant_id).collect();
        StockLedger::lock_quantities(&mut *tx, &variant_ids).await?;

        let prices: HashMap<i64, Decimal> = sqlx::query_as::<_, (i64, Decimal)>(
            "SELECT id, price FROM product_variants WHERE id = ANY($1)",
        )
        .bind(&variant_ids)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        let totals = SaleTotals::compute(&input.items, &input.payments, |id| {
            prices.get(&id).copied()
        })?;

        let status = SaleStatus::Pending.transition(SaleEvent::Pay)?;
        let reference = format!("S-{}", Uuid::new_v4().simple());
        let sale = sqlx::query_as::<_, SaleRow>(&format!(
            r#"
            INSERT INTO sales (reference, status, customer_id, total, paid, change_amount, cashier_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {}
            "#,
            SALE_COLUMNS
        ))
        .bind(&reference)
        .bind(status.as_str())
        .bind(input.customer_id)
        .bind(totals.total)
        .bind(totals.paid)
        .bind(totals.change)
        .bind(cashier)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let note = format!("Sale {}", reference);
        StockLedger::post_batch(
            &mut *tx,
            &totals.stock_changes(),
            StockMovementType::Sale,
            Some(&note),
            Some(cashier),
            now,
        )
        .await?;

        let mut lines: Vec<SaleLine> = Vec::with_capacity(totals.lines.len());
        for line in &totals.lines {
            let row = sqlx::query_as::<_, SaleLineRow>(
                r#"
                INSERT INTO sale_items (sale_id, variant_id, quantity, unit_price, subtotal)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, variant_id, quantity, unit_price, subtotal
                "#,
            )
            .bind(sale.id)
            .bind(line.variant_id)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.subtotal)
            .fetch_one(&mut *tx)
            .await?;
            lines.push(row.into());
        }

        let mut payments: Vec<Payment> = Vec::with_capacity(input.payments.len());
        for payment in &input.payments {
            let row = sqlx::query_as::<_, PaymentRow>(
                r#"
                INSERT INTO sale_payments (sale_id, method, amount, reference, created_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, method, amount, reference, created_at
                "#,
            )
            .bind(sale.id)
            .bind(payment.method.as_str())
            .bind(payment.amount)
            .bind(&payment.reference)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            payments.push(Payment::try_from(row)?);
        }

        tx.commit().await?;

        tracing::info!(
            sale_id = sale.id,
            reference = %reference,
            total = %totals.total,
            lines = lines.len(),
            cashier,
            "Checkout completed"
        );

        sale.into_sale(lines, payments)
    }

    /// Refund a paid sale in full and put its items back on the shelf
    pub async fn refund(&self, sale_id: i64, input: RefundInput, actor: i64) -> AppResult<Refund> {
        let reason = shared::optional_note("reason", input.reason.as_deref())?;
        let now = self.clock.now();

        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {} FROM sales WHERE id = $1 FOR UPDATE",
            SALE_COLUMNS
        ))
        .bind(sale_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Sale".to_string()))?;

        let next = row.status()?.transition(SaleEvent::Refund)?;
        let lines = Self::load_lines(&mut *tx, sale_id).await?;
        let total = row.total;
        let sale = row.into_sale(lines, Vec::new())?;

        let note = reason
            .clone()
            .unwrap_or_else(|| format!("Refund of sale {}", sale.reference));
        StockLedger::post_batch(
            &mut *tx,
            &sale.restock_changes(),
            StockMovementType::Refund,
            Some(&note),
            Some(actor),
            now,
        )
        .await?;

        sqlx::query("UPDATE sales SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(next.as_str())
            .bind(now)
            .bind(sale_id)
            .execute(&mut *tx)
            .await?;

        let refund = sqlx::query_as::<_, RefundRow>(&format!(
            r#"
            INSERT INTO refunds (sale_id, amount, reason, refunded_by, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            REFUND_COLUMNS
        ))
        .bind(sale_id)
        .bind(total)
        .bind(&reason)
        .bind(actor)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(sale_id, actor, amount = %total, "Sale refunded");

        Ok(refund.into())
    }

    /// Get a sale with its lines and payments
    pub async fn get(&self, sale_id: i64) -> AppResult<Sale> {
        let row = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {} FROM sales WHERE id = $1",
            SALE_COLUMNS
        ))
        .bind(sale_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Sale".to_string()))?;

        let mut conn = self.db.acquire().await?;
        let lines = Self::load_lines(&mut *conn, sale_id).await?;

        let payments = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, method, amount, reference, created_at
            FROM sale_payments
            WHERE sale_id = $1
            ORDER BY id
            "#,
        )
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(Payment::try_from)
        .collect::<AppResult<Vec<_>>>()?;

        row.into_sale(lines, payments)
    }

    /// Refunds recorded against a sale
    pub async fn refunds(&self, sale_id: i64) -> AppResult<Vec<Refund>> {
        let rows = sqlx::query_as::<_, RefundRow>(&format!(
            "SELECT {} FROM refunds WHERE sale_id = $1 ORDER BY created_at DESC, id DESC",
            REFUND_COLUMNS
        ))
        .bind(sale_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Refund::from).collect())
    }

    async fn load_lines(conn: &mut PgConnection, sale_id: i64) -> AppResult<Vec<SaleLine>> {
        let rows = sqlx::query_as::<_, SaleLineRow>(
            r#"
            SELECT id, variant_id, quantity, unit_price, subtotal
            FROM sale_items
            WHERE sale_id = $1
            ORDER BY id
            "#,
        )
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(SaleLine::from).collect())
    }
}

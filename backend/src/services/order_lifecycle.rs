//! Purchase order and reorder lifecycle
//!
//! Status changes go through `OrderStatus::transition` while the order row is
//! locked, so two concurrent decisions on one order cannot both win. Supplier
//! decisions are authorized by a confirmation token, staff actions by the
//! authenticated actor.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use validator::Validate;

use crate::clock::Clock;
use crate::config::ConfirmationConfig;
use crate::error::{AppError, AppResult};
use crate::services::confirmation::{confirmation_url, ConfirmationTokenService};
use crate::services::stock_ledger::StockLedger;
use shared::{
    DomainError, LineReceipt, NewOrderLine, Order, OrderEvent, OrderKind, OrderLine, OrderStatus,
};

/// Order lifecycle service
#[derive(Clone)]
pub struct OrderLifecycle {
    db: PgPool,
    clock: Arc<dyn Clock>,
    tokens: ConfirmationTokenService,
    confirmation: ConfirmationConfig,
}

/// Input for creating an order
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderInput {
    #[serde(rename = "type")]
    pub kind: OrderKind,
    pub supplier_id: i64,
    pub expected_at: DateTime<Utc>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    pub items: Vec<NewOrderLine>,
}

/// Supplier acceptance
#[derive(Debug, Deserialize)]
pub struct AcceptOrderInput {
    pub acceptance_notes: Option<String>,
}

/// Supplier rejection
#[derive(Debug, Deserialize)]
pub struct RejectOrderInput {
    pub rejection_reason: Option<String>,
}

/// Staff cancellation
#[derive(Debug, Deserialize)]
pub struct CancelOrderInput {
    pub cancellation_reason: Option<String>,
}

/// Goods received; omit `items` to receive everything outstanding
#[derive(Debug, Default, Deserialize)]
pub struct ReceiveOrderInput {
    pub items: Option<Vec<LineReceipt>>,
    pub notes: Option<String>,
}

/// Filter for listing orders
#[derive(Debug, Default, Deserialize)]
pub struct OrderFilter {
    #[serde(rename = "type")]
    pub kind: Option<OrderKind>,
    pub status: Option<OrderStatus>,
}

/// Link handed to the mailer when an order is sent to its supplier
#[derive(Debug, Clone, Serialize)]
pub struct DispatchedOrder {
    pub order_id: i64,
    pub supplier_id: i64,
    #[serde(rename = "type")]
    pub kind: OrderKind,
    pub token: String,
    pub confirmation_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    kind: String,
    supplier_id: i64,
    status: String,
    expected_at: DateTime<Utc>,
    received_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    acceptance_notes: Option<String>,
    rejection_reason: Option<String>,
    cancellation_reason: Option<String>,
    created_by: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn status(&self) -> AppResult<OrderStatus> {
        self.status
            .parse()
            .map_err(|e: DomainError| AppError::Internal(e.to_string()))
    }

    fn kind(&self) -> AppResult<OrderKind> {
        self.kind
            .parse()
            .map_err(|e: DomainError| AppError::Internal(e.to_string()))
    }

    fn into_order(self, lines: Vec<OrderLine>) -> AppResult<Order> {
        Ok(Order {
            kind: self.kind()?,
            status: self.status()?,
            id: self.id,
            supplier_id: self.supplier_id,
            lines,
            expected_at: self.expected_at,
            received_at: self.received_at,
            notes: self.notes,
            acceptance_notes: self.acceptance_notes,
            rejection_reason: self.rejection_reason,
            cancellation_reason: self.cancellation_reason,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LineRow {
    id: i64,
    order_id: i64,
    variant_id: i64,
    quantity: i32,
    unit_cost: Decimal,
    received_quantity: i32,
}

impl From<LineRow> for OrderLine {
    fn from(row: LineRow) -> Self {
        OrderLine {
            id: row.id,
            variant_id: row.variant_id,
            quantity: row.quantity,
            unit_cost: row.unit_cost,
            received_quantity: row.received_quantity,
        }
    }
}

const ORDER_COLUMNS: &str = "id, kind, supplier_id, status, expected_at, received_at, notes, \
                             acceptance_notes, rejection_reason, cancellation_reason, created_by, \
                             created_at, updated_at";

impl OrderLifecycle {
    /// Create a new OrderLifecycle instance
    pub fn new(
        db: PgPool,
        clock: Arc<dyn Clock>,
        tokens: ConfirmationTokenService,
        confirmation: ConfirmationConfig,
    ) -> Self {
        Self {
            db,
            clock,
            tokens,
            confirmation,
        }
    }

    /// Create a pending order
    pub async fn create(&self, input: CreateOrderInput, actor: i64) -> AppResult<Order> {
        shared::validate_order_lines(input.kind, &input.items)?;
        let notes = shared::optional_note("notes", input.notes.as_deref())?;

        let supplier_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM suppliers WHERE id = $1)",
        )
        .bind(input.supplier_id)
        .fetch_one(&self.db)
        .await?;

        if !supplier_exists {
            return Err(AppError::NotFound("Supplier".to_string()));
        }

        let variant_ids: Vec<i64> = input.items.iter().map(|l| l.variant_id).collect();
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM product_variants WHERE id = ANY($1)",
        )
        .bind(&variant_ids)
        .fetch_one(&self.db)
        .await?;

        if found != variant_ids.len() as i64 {
            return Err(AppError::NotFound("Product variant".to_string()));
        }

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            INSERT INTO supplier_orders (kind, supplier_id, status, expected_at, notes, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(input.kind.as_str())
        .bind(input.supplier_id)
        .bind(OrderStatus::Pending.as_str())
        .bind(input.expected_at)
        .bind(&notes)
        .bind(actor)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let mut lines: Vec<OrderLine> = Vec::with_capacity(input.items.len());
        for item in &input.items {
            let line = sqlx::query_as::<_, LineRow>(
                r#"
                INSERT INTO supplier_order_items (order_id, variant_id, quantity, unit_cost, received_quantity)
                VALUES ($1, $2, $3, $4, 0)
                RETURNING id, order_id, variant_id, quantity, unit_cost, received_quantity
                "#,
            )
            .bind(row.id)
            .bind(item.variant_id)
            .bind(item.quantity)
            .bind(item.unit_cost)
            .fetch_one(&mut *tx)
            .await?;
            lines.push(line.into());
        }

        tx.commit().await?;

        tracing::info!(order_id = row.id, kind = %input.kind, supplier_id = input.supplier_id, "Order created");

        row.into_order(lines)
    }

    /// Issue the supplier confirmation link for a pending order
    pub async fn dispatch(&self, order_id: i64) -> AppResult<DispatchedOrder> {
        let order = self.get(order_id).await?;

        if order.status != OrderStatus::Pending {
            return Err(AppError::InvalidStateTransition(format!(
                "Only pending orders can be sent to the supplier, this order is {}",
                order.status
            )));
        }

        let issued = self.tokens.issue_token(
            order.id,
            order.supplier_id,
            order.kind,
            self.confirmation.ttl_days,
        )?;
        let url = confirmation_url(&self.confirmation.base_url, order.kind, order.id, &issued.token);
        let expires_at = DateTime::from_timestamp(issued.payload.expires_at, 0)
            .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?;

        tracing::info!(order_id, supplier_id = order.supplier_id, "Confirmation link issued");

        Ok(DispatchedOrder {
            order_id: order.id,
            supplier_id: order.supplier_id,
            kind: order.kind,
            token: issued.token,
            confirmation_url: url,
            expires_at,
        })
    }

    /// Order as shown to a supplier holding a valid link
    pub async fn supplier_view(&self, kind: OrderKind, order_id: i64, token: &str) -> AppResult<Order> {
        let claim = self.tokens.validate_for(token, kind, order_id)?;
        let order = self.get(order_id).await?;
        Self::check_supplier_binding(&claim, order.id, order.supplier_id, order.kind)?;
        Ok(order)
    }

    /// Supplier accepts a pending order
    pub async fn accept(
        &self,
        kind: OrderKind,
        order_id: i64,
        token: &str,
        input: AcceptOrderInput,
    ) -> AppResult<Order> {
        let claim = self.tokens.validate_for(token, kind, order_id)?;
        let notes = shared::require_reason("acceptance_notes", input.acceptance_notes.as_deref())?;

        self.supplier_decision(&claim, OrderEvent::Accept, "acceptance_notes", &notes)
            .await
    }

    /// Supplier rejects a pending order
    pub async fn reject(
        &self,
        kind: OrderKind,
        order_id: i64,
        token: &str,
        input: RejectOrderInput,
    ) -> AppResult<Order> {
        let claim = self.tokens.validate_for(token, kind, order_id)?;
        let reason = shared::require_reason("rejection_reason", input.rejection_reason.as_deref())?;

        self.supplier_decision(&claim, OrderEvent::Reject, "rejection_reason", &reason)
            .await
    }

    /// Staff cancels a pending or accepted order
    pub async fn cancel(&self, order_id: i64, input: CancelOrderInput, actor: i64) -> AppResult<Order> {
        let reason = shared::require_reason(
            "cancellation_reason",
            input.cancellation_reason.as_deref(),
        )?;

        let mut tx = self.db.begin().await?;
        let row = Self::lock_order(&mut *tx, order_id).await?;
        let next = row.status()?.transition(OrderEvent::Cancel)?;

        sqlx::query(
            "UPDATE supplier_orders SET status = $1, cancellation_reason = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(next.as_str())
        .bind(&reason)
        .bind(self.clock.now())
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(order_id, actor, "Order cancelled");

        self.get(order_id).await
    }

    /// Book received goods into stock. Posts one ledger entry per line received.
    pub async fn receive(&self, order_id: i64, input: ReceiveOrderInput, actor: i64) -> AppResult<Order> {
        let notes = shared::optional_note("notes", input.notes.as_deref())?;
        let now = self.clock.now();

        let mut tx = self.db.begin().await?;
        let row = Self::lock_order(&mut *tx, order_id).await?;
        let kind = row.kind()?;
        let status = row.status()?;
        let lines = Self::load_lines(&mut *tx, &[order_id])
            .await?
            .remove(&order_id)
            .unwrap_or_default();

        let plan = shared::plan_receipt(status, &lines, input.items.as_deref())?;

        let note = notes.unwrap_or_else(|| format!("Received {} #{}", kind, order_id));
        StockLedger::post_batch(
            &mut *tx,
            &plan.stock_changes(),
            kind.receipt_movement(),
            Some(&note),
            Some(actor),
            now,
        )
        .await?;

        for receipt in &plan.receipts {
            sqlx::query("UPDATE supplier_order_items SET received_quantity = $1 WHERE id = $2")
                .bind(receipt.received_after)
                .bind(receipt.line_id)
                .execute(&mut *tx)
                .await?;
        }

        let received_at = (plan.next_status == OrderStatus::Received).then_some(now);
        sqlx::query(
            "UPDATE supplier_orders SET status = $1, received_at = COALESCE($2, received_at), updated_at = $3 WHERE id = $4",
        )
        .bind(plan.next_status.as_str())
        .bind(received_at)
        .bind(now)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id,
            actor,
            lines = plan.receipts.len(),
            status = %plan.next_status,
            "Order goods received"
        );

        self.get(order_id).await
    }

    /// Get an order with its lines
    pub async fn get(&self, order_id: i64) -> AppResult<Order> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM supplier_orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let mut conn = self.db.acquire().await?;
        let lines = Self::load_lines(&mut *conn, &[order_id])
            .await?
            .remove(&order_id)
            .unwrap_or_default();

        row.into_order(lines)
    }

    /// List orders, newest first
    pub async fn list(&self, filter: OrderFilter) -> AppResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {}
            FROM supplier_orders
            WHERE ($1::VARCHAR IS NULL OR kind = $1)
              AND ($2::VARCHAR IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            "#,
            ORDER_COLUMNS
        ))
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut conn = self.db.acquire().await?;
        let mut lines = Self::load_lines(&mut *conn, &ids).await?;

        rows.into_iter()
            .map(|row| {
                let order_lines = lines.remove(&row.id).unwrap_or_default();
                row.into_order(order_lines)
            })
            .collect()
    }

    async fn supplier_decision(
        &self,
        claim: &shared::ConfirmationPayload,
        event: OrderEvent,
        column: &'static str,
        text: &str,
    ) -> AppResult<Order> {
        let order_id = claim.order_id;

        let mut tx = self.db.begin().await?;
        let row = Self::lock_order(&mut *tx, order_id).await?;
        Self::check_supplier_binding(claim, row.id, row.supplier_id, row.kind()?)?;
        let next = row.status()?.transition(event)?;

        // column is one of two fixed names chosen by the caller
        sqlx::query(&format!(
            "UPDATE supplier_orders SET status = $1, {} = $2, updated_at = $3 WHERE id = $4",
            column
        ))
        .bind(next.as_str())
        .bind(text)
        .bind(self.clock.now())
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(order_id, supplier_id = claim.supplier_id, status = %next, "Supplier decision recorded");

        self.get(order_id).await
    }

    fn check_supplier_binding(
        claim: &shared::ConfirmationPayload,
        order_id: i64,
        supplier_id: i64,
        kind: OrderKind,
    ) -> AppResult<()> {
        if !claim.matches(order_id, supplier_id, kind) {
            tracing::warn!(order_id, token_supplier = claim.supplier_id, "Token does not match order");
            return Err(DomainError::invalid_token("token does not match order").into());
        }
        Ok(())
    }

    async fn lock_order(conn: &mut PgConnection, order_id: i64) -> AppResult<OrderRow> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM supplier_orders WHERE id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))
    }

    async fn load_lines(
        conn: &mut PgConnection,
        order_ids: &[i64],
    ) -> AppResult<HashMap<i64, Vec<OrderLine>>> {
        let rows = sqlx::query_as::<_, LineRow>(
            r#"
            SELECT id, order_id, variant_id, quantity, unit_cost, received_quantity
            FROM supplier_order_items
            WHERE order_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(order_ids)
        .fetch_all(&mut *conn)
        .await?;

        let mut grouped: HashMap<i64, Vec<OrderLine>> = HashMap::new();
        for row in rows {
            grouped.entry(row.order_id).or_default().push(row.into());
        }
        Ok(grouped)
    }
}

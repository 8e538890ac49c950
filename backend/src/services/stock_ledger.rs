//! Stock ledger: the single path through which variant quantities change
//!
//! Every mutation locks the variant row (`FOR UPDATE`), re-reads the current
//! quantity, refuses to go below zero, updates the quantity and appends one
//! history entry, all inside one transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgConnection, PgPool};
use validator::Validate;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use shared::{
    AuditReconciliation, DomainError, LowStockItem, PaginatedResponse, Pagination, Posting,
    ProductVariant, StockAudit, StockChange, StockHistoryEntry, StockMovementType, StockSnapshot,
};

/// Stock ledger service
#[derive(Clone)]
pub struct StockLedger {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

/// Input for a manual stock change
#[derive(Debug, Deserialize, Validate)]
pub struct ApplyChangeInput {
    #[serde(rename = "type")]
    pub movement_type: StockMovementType,
    pub quantity_change: i32,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Input for recording a physical count
#[derive(Debug, Deserialize, Validate)]
pub struct RecordAuditInput {
    #[validate(range(min = 0))]
    pub counted_quantity: i32,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, FromRow)]
struct VariantRow {
    id: i64,
    product_id: i64,
    sku: String,
    name: String,
    price: Decimal,
    quantity: i32,
    min_stock_level: i32,
    supplier_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<VariantRow> for ProductVariant {
    fn from(row: VariantRow) -> Self {
        ProductVariant {
            id: row.id,
            product_id: row.product_id,
            sku: row.sku,
            name: row.name,
            price: row.price,
            quantity: row.quantity,
            min_stock_level: row.min_stock_level,
            supplier_id: row.supplier_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    id: i64,
    variant_id: i64,
    movement_type: String,
    quantity_before: i32,
    quantity_change: i32,
    quantity_after: i32,
    notes: Option<String>,
    performed_by: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for StockHistoryEntry {
    type Error = AppError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let movement_type = row
            .movement_type
            .parse::<StockMovementType>()
            .map_err(|e| AppError::Internal(e.to_string()))?;

        Ok(StockHistoryEntry {
            id: row.id,
            variant_id: row.variant_id,
            movement_type,
            quantity_before: row.quantity_before,
            quantity_change: row.quantity_change,
            quantity_after: row.quantity_after,
            notes: row.notes,
            performed_by: row.performed_by,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AuditRow {
    id: i64,
    variant_id: i64,
    system_quantity: i32,
    counted_quantity: i32,
    difference: i32,
    notes: Option<String>,
    auditor: i64,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for StockAudit {
    fn from(row: AuditRow) -> Self {
        StockAudit {
            id: row.id,
            variant_id: row.variant_id,
            system_quantity: row.system_quantity,
            counted_quantity: row.counted_quantity,
            difference: row.difference,
            notes: row.notes,
            auditor: row.auditor,
            created_at: row.created_at,
        }
    }
}

const VARIANT_COLUMNS: &str = "id, product_id, sku, name, price, quantity, min_stock_level, \
                               supplier_id, created_at, updated_at";

const HISTORY_COLUMNS: &str = "id, variant_id, movement_type, quantity_before, quantity_change, \
                               quantity_after, notes, performed_by, created_at";

impl StockLedger {
    /// Create a new StockLedger instance
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Apply a signed quantity change to one variant and record it
    pub async fn apply_change(
        &self,
        variant_id: i64,
        movement_type: StockMovementType,
        delta: i32,
        notes: Option<&str>,
        actor: Option<i64>,
    ) -> AppResult<StockHistoryEntry> {
        shared::validate_quantity_change(delta)?;
        if !movement_type.permits(delta) {
            return Err(AppError::Validation {
                field: "quantity_change".to_string(),
                message: format!("A {} cannot change stock by {}", movement_type, delta),
            });
        }
        let notes = shared::optional_note("notes", notes)?;

        let mut tx = self.db.begin().await?;
        let mut entries = Self::post_batch(
            &mut *tx,
            &[StockChange { variant_id, delta }],
            movement_type,
            notes.as_deref(),
            actor,
            self.clock.now(),
        )
        .await?;
        tx.commit().await?;

        entries
            .pop()
            .ok_or_else(|| AppError::Internal("Ledger posting produced no entry".to_string()))
    }

    /// Record a physical count. A non-zero difference posts one adjustment.
    pub async fn record_audit(
        &self,
        variant_id: i64,
        counted_quantity: i32,
        notes: Option<&str>,
        auditor: i64,
    ) -> AppResult<StockAudit> {
        let notes = shared::optional_note("notes", notes)?;
        let now = self.clock.now();

        let mut tx = self.db.begin().await?;

        let snapshot = Self::lock_quantities(&mut *tx, &[variant_id]).await?;
        let system_quantity = snapshot
            .quantity(variant_id)
            .ok_or_else(|| AppError::NotFound("Product variant".to_string()))?;

        let reconciliation = AuditReconciliation::reconcile(variant_id, system_quantity, counted_quantity)?;

        if let Some(posting) = reconciliation.adjustment {
            let note = notes
                .clone()
                .unwrap_or_else(|| "Stock audit adjustment".to_string());
            Self::write_posting(
                &mut *tx,
                &posting,
                StockMovementType::Adjustment,
                Some(&note),
                Some(auditor),
                now,
            )
            .await?;
        }

        let row = sqlx::query_as::<_, AuditRow>(
            r#"
            INSERT INTO stock_audits (variant_id, system_quantity, counted_quantity, difference, notes, auditor, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, variant_id, system_quantity, counted_quantity, difference, notes, auditor, created_at
            "#,
        )
        .bind(variant_id)
        .bind(reconciliation.system_quantity)
        .bind(reconciliation.counted_quantity)
        .bind(reconciliation.difference)
        .bind(&notes)
        .bind(auditor)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            variant_id,
            system_quantity,
            counted_quantity,
            difference = reconciliation.difference,
            "Stock audit recorded"
        );

        Ok(row.into())
    }

    /// Full history for a variant, newest first
    pub async fn history(&self, variant_id: i64) -> AppResult<Vec<StockHistoryEntry>> {
        self.ensure_variant(variant_id).await?;

        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {} FROM stock_histories WHERE variant_id = $1 ORDER BY id DESC",
            HISTORY_COLUMNS
        ))
        .bind(variant_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(StockHistoryEntry::try_from).collect()
    }

    /// One page of history for a variant, newest first
    pub async fn history_page(
        &self,
        variant_id: i64,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<StockHistoryEntry>> {
        self.ensure_variant(variant_id).await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM stock_histories WHERE variant_id = $1",
        )
        .bind(variant_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {} FROM stock_histories WHERE variant_id = $1 \
             ORDER BY id DESC LIMIT $2 OFFSET $3",
            HISTORY_COLUMNS
        ))
        .bind(variant_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let entries = rows
            .into_iter()
            .map(StockHistoryEntry::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse::new(entries, pagination, total.max(0) as u64))
    }

    /// Audits for a variant, newest first
    pub async fn audits(&self, variant_id: i64) -> AppResult<Vec<StockAudit>> {
        self.ensure_variant(variant_id).await?;

        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, variant_id, system_quantity, counted_quantity, difference, notes, auditor, created_at
            FROM stock_audits
            WHERE variant_id = $1
            ORDER BY id DESC
            "#,
        )
        .bind(variant_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(StockAudit::from).collect())
    }

    /// Get a variant with its current quantity
    pub async fn variant(&self, variant_id: i64) -> AppResult<ProductVariant> {
        let row = sqlx::query_as::<_, VariantRow>(&format!(
            "SELECT {} FROM product_variants WHERE id = $1",
            VARIANT_COLUMNS
        ))
        .bind(variant_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product variant".to_string()))?;

        Ok(row.into())
    }

    /// Variants at or below their reorder threshold
    pub async fn low_stock(&self) -> AppResult<Vec<LowStockItem>> {
        let rows = sqlx::query_as::<_, VariantRow>(&format!(
            "SELECT {} FROM product_variants ORDER BY id",
            VARIANT_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        let mut items: Vec<LowStockItem> = rows
            .into_iter()
            .map(ProductVariant::from)
            .filter(ProductVariant::is_low_stock)
            .map(|v| LowStockItem {
                suggested_quantity: shared::suggested_reorder_quantity(v.quantity, v.min_stock_level),
                variant_id: v.id,
                sku: v.sku,
                name: v.name,
                quantity: v.quantity,
                min_stock_level: v.min_stock_level,
                supplier_id: v.supplier_id,
            })
            .collect();

        items.sort_by_key(|i| (i.quantity - i.min_stock_level, i.variant_id));
        Ok(items)
    }

    async fn ensure_variant(&self, variant_id: i64) -> AppResult<()> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM product_variants WHERE id = $1)",
        )
        .bind(variant_id)
        .fetch_one(&self.db)
        .await?;

        if !exists {
            return Err(AppError::NotFound("Product variant".to_string()));
        }
        Ok(())
    }

    /// Lock the given variants (in id order) and read their quantities
    pub(crate) async fn lock_quantities(
        conn: &mut PgConnection,
        variant_ids: &[i64],
    ) -> AppResult<StockSnapshot> {
        let mut ids = variant_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let rows = sqlx::query_as::<_, (i64, i32)>(
            "SELECT id, quantity FROM product_variants WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;

        if rows.len() != ids.len() {
            let missing = ids
                .iter()
                .find(|id| !rows.iter().any(|(found, _)| found == *id))
                .copied()
                .unwrap_or_default();
            return Err(AppError::NotFound(format!("Product variant {}", missing)));
        }

        Ok(rows.into_iter().collect())
    }

    /// Post a batch of changes inside the caller's transaction. Either every
    /// change is written or none is.
    pub(crate) async fn post_batch(
        conn: &mut PgConnection,
        changes: &[StockChange],
        movement_type: StockMovementType,
        notes: Option<&str>,
        actor: Option<i64>,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<StockHistoryEntry>> {
        let ids: Vec<i64> = changes.iter().map(|c| c.variant_id).collect();
        let mut snapshot = Self::lock_quantities(conn, &ids).await?;

        let postings = snapshot.apply_all(changes).map_err(|e| {
            if let DomainError::InsufficientStock { variant_id, available, requested } = &e {
                tracing::warn!(
                    variant_id,
                    available,
                    requested,
                    movement = %movement_type,
                    "Rejected stock change"
                );
            }
            AppError::from(e)
        })?;

        let mut entries = Vec::with_capacity(postings.len());
        for posting in &postings {
            entries.push(Self::write_posting(conn, posting, movement_type, notes, actor, at).await?);
        }
        Ok(entries)
    }

    async fn write_posting(
        conn: &mut PgConnection,
        posting: &Posting,
        movement_type: StockMovementType,
        notes: Option<&str>,
        actor: Option<i64>,
        at: DateTime<Utc>,
    ) -> AppResult<StockHistoryEntry> {
        sqlx::query("UPDATE product_variants SET quantity = $1, updated_at = $2 WHERE id = $3")
            .bind(posting.quantity_after)
            .bind(at)
            .bind(posting.variant_id)
            .execute(&mut *conn)
            .await?;

        let row = sqlx::query_as::<_, HistoryRow>(&format!(
            r#"
            INSERT INTO stock_histories (variant_id, movement_type, quantity_before, quantity_change,
                                         quantity_after, notes, performed_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            HISTORY_COLUMNS
        ))
        .bind(posting.variant_id)
        .bind(movement_type.as_str())
        .bind(posting.quantity_before)
        .bind(posting.quantity_change)
        .bind(posting.quantity_after)
        .bind(notes)
        .bind(actor)
        .bind(at)
        .fetch_one(&mut *conn)
        .await?;

        tracing::info!(
            variant_id = posting.variant_id,
            movement = %movement_type,
            before = posting.quantity_before,
            change = posting.quantity_change,
            after = posting.quantity_after,
            "Stock posted"
        );

        row.try_into()
    }
}

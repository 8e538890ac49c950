//! HTTP handlers for variant stock endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{INVENTORY_ADJUST, INVENTORY_AUDIT, INVENTORY_READ};
use crate::middleware::{check_permission, CurrentUser};
use crate::services::stock_ledger::{ApplyChangeInput, RecordAuditInput};
use crate::services::StockLedger;
use crate::AppState;
use shared::{
    LowStockItem, PaginatedResponse, Pagination, ProductVariant, StockAudit, StockHistoryEntry,
};

/// Get a variant with its current quantity
pub async fn get_variant(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(variant_id): Path<i64>,
) -> AppResult<Json<ProductVariant>> {
    check_permission(&current_user.0, INVENTORY_READ)?;
    let ledger = StockLedger::new(state.db, state.clock);
    Ok(Json(ledger.variant(variant_id).await?))
}

/// List variants at or below their reorder threshold
pub async fn list_low_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<LowStockItem>>> {
    check_permission(&current_user.0, INVENTORY_READ)?;
    let ledger = StockLedger::new(state.db, state.clock);
    Ok(Json(ledger.low_stock().await?))
}

/// Stock history for a variant, newest first
pub async fn get_history(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(variant_id): Path<i64>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<StockHistoryEntry>>> {
    check_permission(&current_user.0, INVENTORY_READ)?;
    let ledger = StockLedger::new(state.db, state.clock);
    let page = ledger
        .history_page(variant_id, pagination.normalized())
        .await?;
    Ok(Json(page))
}

/// Apply a manual stock change
pub async fn apply_adjustment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(variant_id): Path<i64>,
    Json(input): Json<ApplyChangeInput>,
) -> AppResult<(StatusCode, Json<StockHistoryEntry>)> {
    check_permission(&current_user.0, INVENTORY_ADJUST)?;
    input.validate()?;
    if !input.movement_type.is_direct_adjustment() {
        return Err(AppError::Validation {
            field: "type".to_string(),
            message: format!(
                "{} entries are posted by their own workflow, use adjustment or manual",
                input.movement_type
            ),
        });
    }

    let ledger = StockLedger::new(state.db, state.clock);
    let entry = ledger
        .apply_change(
            variant_id,
            input.movement_type,
            input.quantity_change,
            input.notes.as_deref(),
            Some(current_user.0.user_id),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// List audits for a variant
pub async fn list_audits(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(variant_id): Path<i64>,
) -> AppResult<Json<Vec<StockAudit>>> {
    check_permission(&current_user.0, INVENTORY_READ)?;
    let ledger = StockLedger::new(state.db, state.clock);
    Ok(Json(ledger.audits(variant_id).await?))
}

/// Record a physical count for a variant
pub async fn record_audit(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(variant_id): Path<i64>,
    Json(input): Json<RecordAuditInput>,
) -> AppResult<(StatusCode, Json<StockAudit>)> {
    check_permission(&current_user.0, INVENTORY_AUDIT)?;
    input.validate()?;

    let ledger = StockLedger::new(state.db, state.clock);
    let audit = ledger
        .record_audit(
            variant_id,
            input.counted_quantity,
            input.notes.as_deref(),
            current_user.0.user_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(audit)))
}

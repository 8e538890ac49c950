//! HTTP handlers for POS checkout and refunds

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::error::AppResult;
use crate::middleware::auth::{SALES_CHECKOUT, SALES_REFUND};
use crate::middleware::{check_permission, CurrentUser};
use crate::services::sales::{CheckoutInput, RefundInput};
use crate::services::SaleTransactionProcessor;
use crate::AppState;
use shared::{Refund, Sale};

/// Check out a cart
pub async fn checkout(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CheckoutInput>,
) -> AppResult<(StatusCode, Json<Sale>)> {
    check_permission(&current_user.0, SALES_CHECKOUT)?;
    let processor = SaleTransactionProcessor::new(state.db, state.clock);
    let sale = processor.checkout(input, current_user.0.user_id).await?;
    Ok((StatusCode::CREATED, Json(sale)))
}

/// Get a sale with lines and payments
pub async fn get_sale(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(sale_id): Path<i64>,
) -> AppResult<Json<Sale>> {
    check_permission(&current_user.0, SALES_CHECKOUT)?;
    let processor = SaleTransactionProcessor::new(state.db, state.clock);
    Ok(Json(processor.get(sale_id).await?))
}

/// Refund a paid sale in full
pub async fn refund_sale(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(sale_id): Path<i64>,
    Json(input): Json<RefundInput>,
) -> AppResult<(StatusCode, Json<Refund>)> {
    check_permission(&current_user.0, SALES_REFUND)?;
    let processor = SaleTransactionProcessor::new(state.db, state.clock);
    let refund = processor
        .refund(sale_id, input, current_user.0.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(refund)))
}

/// Refunds recorded against a sale
pub async fn list_refunds(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(sale_id): Path<i64>,
) -> AppResult<Json<Vec<Refund>>> {
    check_permission(&current_user.0, SALES_REFUND)?;
    let processor = SaleTransactionProcessor::new(state.db, state.clock);
    Ok(Json(processor.refunds(sale_id).await?))
}

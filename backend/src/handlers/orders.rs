//! HTTP handlers for staff-side purchase order and reorder endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::auth::{ORDERS_MANAGE, ORDERS_RECEIVE};
use crate::middleware::{check_permission, CurrentUser};
use crate::services::order_lifecycle::{
    CancelOrderInput, CreateOrderInput, DispatchedOrder, OrderFilter, ReceiveOrderInput,
};
use crate::services::OrderLifecycle;
use crate::AppState;
use shared::Order;

pub(crate) fn lifecycle(state: AppState) -> OrderLifecycle {
    OrderLifecycle::new(
        state.db,
        state.clock,
        state.tokens,
        state.config.confirmation.clone(),
    )
}

/// Create a pending order
pub async fn create_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateOrderInput>,
) -> AppResult<(StatusCode, Json<Order>)> {
    check_permission(&current_user.0, ORDERS_MANAGE)?;
    input.validate()?;

    let order = lifecycle(state).create(input, current_user.0.user_id).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// List orders, optionally filtered by type and status
pub async fn list_orders(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filter): Query<OrderFilter>,
) -> AppResult<Json<Vec<Order>>> {
    check_permission(&current_user.0, ORDERS_MANAGE)?;
    Ok(Json(lifecycle(state).list(filter).await?))
}

/// Get an order with its lines
pub async fn get_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<i64>,
) -> AppResult<Json<Order>> {
    check_permission(&current_user.0, ORDERS_MANAGE)?;
    Ok(Json(lifecycle(state).get(order_id).await?))
}

/// Issue the supplier confirmation link
pub async fn dispatch_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<i64>,
) -> AppResult<Json<DispatchedOrder>> {
    check_permission(&current_user.0, ORDERS_MANAGE)?;
    Ok(Json(lifecycle(state).dispatch(order_id).await?))
}

/// Cancel a pending or accepted order
pub async fn cancel_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<i64>,
    Json(input): Json<CancelOrderInput>,
) -> AppResult<Json<Order>> {
    check_permission(&current_user.0, ORDERS_MANAGE)?;
    let order = lifecycle(state)
        .cancel(order_id, input, current_user.0.user_id)
        .await?;
    Ok(Json(order))
}

/// Book delivered goods into stock
pub async fn receive_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<i64>,
    Json(input): Json<ReceiveOrderInput>,
) -> AppResult<Json<Order>> {
    check_permission(&current_user.0, ORDERS_RECEIVE)?;
    let order = lifecycle(state)
        .receive(order_id, input, current_user.0.user_id)
        .await?;
    Ok(Json(order))
}

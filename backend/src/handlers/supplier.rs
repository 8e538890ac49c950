//! Public supplier endpoints reached through emailed confirmation links
//!
//! These routes carry no session; the `token` query parameter is the only
//! credential and is checked before anything else is read.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::handlers::orders::lifecycle;
use crate::services::order_lifecycle::{AcceptOrderInput, RejectOrderInput};
use crate::AppState;
use shared::{DomainError, Order, OrderKind};

/// Query string of a confirmation link
#[derive(Debug, Deserialize)]
pub struct ConfirmationQuery {
    pub token: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<OrderKind>,
}

impl ConfirmationQuery {
    /// Resolve the order kind from the path and make sure the query agrees
    fn resolve(&self, type_path: &str) -> AppResult<(OrderKind, &str)> {
        let kind = OrderKind::from_path_segment(type_path)
            .ok_or_else(|| AppError::NotFound("Order type".to_string()))?;

        if matches!(self.kind, Some(k) if k != kind) {
            return Err(DomainError::OrderTypeMismatch.into());
        }

        let token = self
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DomainError::invalid_token("missing token"))?;

        Ok((kind, token))
    }
}

/// Show an order to the supplier holding the link
pub async fn view_order(
    State(state): State<AppState>,
    Path((type_path, order_id)): Path<(String, i64)>,
    Query(query): Query<ConfirmationQuery>,
) -> AppResult<Json<Order>> {
    let (kind, token) = query.resolve(&type_path)?;
    let order = lifecycle(state).supplier_view(kind, order_id, token).await?;
    Ok(Json(order))
}

/// Supplier accepts the order
pub async fn accept_order(
    State(state): State<AppState>,
    Path((type_path, order_id)): Path<(String, i64)>,
    Query(query): Query<ConfirmationQuery>,
    Json(input): Json<AcceptOrderInput>,
) -> AppResult<Json<Order>> {
    let (kind, token) = query.resolve(&type_path)?;
    let order = lifecycle(state).accept(kind, order_id, token, input).await?;
    Ok(Json(order))
}

/// Supplier rejects the order
pub async fn reject_order(
    State(state): State<AppState>,
    Path((type_path, order_id)): Path<(String, i64)>,
    Query(query): Query<ConfirmationQuery>,
    Json(input): Json<RejectOrderInput>,
) -> AppResult<Json<Order>> {
    let (kind, token) = query.resolve(&type_path)?;
    let order = lifecycle(state).reject(kind, order_id, token, input).await?;
    Ok(Json(order))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(token: Option<&str>, kind: Option<OrderKind>) -> ConfirmationQuery {
        ConfirmationQuery {
            token: token.map(str::to_string),
            kind,
        }
    }

    #[test]
    fn path_and_query_type_must_agree() {
        let q = query(Some("abc.def"), Some(OrderKind::PurchaseOrder));
        assert!(matches!(q.resolve("reorders"), Err(AppError::InvalidToken)));

        let (kind, token) = q.resolve("purchase-orders").unwrap();
        assert_eq!(kind, OrderKind::PurchaseOrder);
        assert_eq!(token, "abc.def");
    }

    #[test]
    fn missing_token_is_invalid() {
        assert!(matches!(
            query(None, None).resolve("reorders"),
            Err(AppError::InvalidToken)
        ));
        assert!(matches!(
            query(Some(""), None).resolve("reorders"),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn unknown_type_path_is_not_found() {
        assert!(matches!(
            query(Some("t"), None).resolve("invoices"),
            Err(AppError::NotFound(_))
        ));
    }
}

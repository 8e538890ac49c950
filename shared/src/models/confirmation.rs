//! Supplier confirmation token payload

use serde::{Deserialize, Serialize};

use super::OrderKind;

/// The only action a confirmation token currently authorizes
pub const ORDER_VERIFICATION: &str = "order_verification";

/// Default lifetime of a confirmation link
pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 3;

/// Decoded, verified token contents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfirmationPayload {
    pub order_id: i64,
    pub supplier_id: i64,
    #[serde(rename = "type")]
    pub kind: OrderKind,
    /// Unix timestamp, seconds
    pub expires_at: i64,
    pub action: String,
}

impl ConfirmationPayload {
    pub fn matches(&self, order_id: i64, supplier_id: i64, kind: OrderKind) -> bool {
        self.order_id == order_id && self.supplier_id == supplier_id && self.kind == kind
    }
}

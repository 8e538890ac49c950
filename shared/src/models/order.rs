//! Purchase order and reorder models with their shared lifecycle

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::models::stock::{StockChange, StockMovementType};

/// Which kind of replenishment request an order is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderKind {
    PurchaseOrder,
    Reorder,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::PurchaseOrder => "purchase-order",
            OrderKind::Reorder => "reorder",
        }
    }

    /// Path segment used in supplier-facing confirmation URLs
    pub fn path_segment(&self) -> &'static str {
        match self {
            OrderKind::PurchaseOrder => "purchase-orders",
            OrderKind::Reorder => "reorders",
        }
    }

    pub fn from_path_segment(segment: &str) -> Option<Self> {
        match segment {
            "purchase-orders" => Some(OrderKind::PurchaseOrder),
            "reorders" => Some(OrderKind::Reorder),
            _ => None,
        }
    }

    /// Ledger movement type posted when goods for this kind are received
    pub fn receipt_movement(&self) -> StockMovementType {
        match self {
            OrderKind::PurchaseOrder => StockMovementType::Purchase,
            OrderKind::Reorder => StockMovementType::Reorder,
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase-order" => Ok(OrderKind::PurchaseOrder),
            "reorder" => Ok(OrderKind::Reorder),
            other => Err(DomainError::validation("type", format!("Unknown order type: {}", other))),
        }
    }
}

/// Lifecycle state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Accepted,
    Rejected,
    Partial,
    Received,
    Cancelled,
}

/// Something that happens to an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    Accept,
    Reject,
    Cancel,
    ReceivePartial,
    ReceiveFull,
}

impl OrderEvent {
    pub const ALL: [OrderEvent; 5] = [
        OrderEvent::Accept,
        OrderEvent::Reject,
        OrderEvent::Cancel,
        OrderEvent::ReceivePartial,
        OrderEvent::ReceiveFull,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderEvent::Accept => "accept",
            OrderEvent::Reject => "reject",
            OrderEvent::Cancel => "cancel",
            OrderEvent::ReceivePartial => "partially receive",
            OrderEvent::ReceiveFull => "receive",
        }
    }
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Accepted,
        OrderStatus::Rejected,
        OrderStatus::Partial,
        OrderStatus::Received,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Partial => "partial",
            OrderStatus::Received => "received",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Rejected | OrderStatus::Received | OrderStatus::Cancelled
        )
    }

    /// The complete transition table. Anything not listed here is illegal.
    pub fn next(self, event: OrderEvent) -> Option<OrderStatus> {
        use OrderEvent::*;
        use OrderStatus::*;

        match (self, event) {
            (Pending, Accept) => Some(Accepted),
            (Pending, Reject) => Some(Rejected),
            (Pending, Cancel) | (Accepted, Cancel) => Some(Cancelled),
            (Accepted, ReceiveFull) => Some(Received),
            (Accepted, ReceivePartial) => Some(Partial),
            (Partial, ReceiveFull) => Some(Received),
            _ => None,
        }
    }

    pub fn transition(self, event: OrderEvent) -> DomainResult<OrderStatus> {
        self.next(event).ok_or_else(|| DomainError::InvalidStateTransition {
            entity: "order",
            from: self.as_str().to_string(),
            event: event.as_str().to_string(),
        })
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| DomainError::validation("status", format!("Unknown order status: {}", s)))
    }
}

/// An order line; `received_quantity` tracks what has already been booked in
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLine {
    pub id: i64,
    pub variant_id: i64,
    pub quantity: i32,
    pub unit_cost: Decimal,
    pub received_quantity: i32,
}

impl OrderLine {
    pub fn outstanding(&self) -> i32 {
        self.quantity - self.received_quantity
    }
}

/// A purchase order or reorder issued to a supplier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: OrderKind,
    pub supplier_id: i64,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub expected_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub acceptance_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line to place on a new order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewOrderLine {
    pub variant_id: i64,
    pub quantity: i32,
    pub unit_cost: Decimal,
}

/// Check the shape of an order before it is created
pub fn validate_order_lines(kind: OrderKind, lines: &[NewOrderLine]) -> DomainResult<()> {
    match kind {
        OrderKind::Reorder if lines.len() != 1 => {
            return Err(DomainError::validation(
                "items",
                "A reorder covers exactly one variant",
            ));
        }
        OrderKind::PurchaseOrder if lines.is_empty() => {
            return Err(DomainError::validation(
                "items",
                "A purchase order needs at least one item",
            ));
        }
        _ => {}
    }

    for (i, line) in lines.iter().enumerate() {
        if line.quantity <= 0 {
            return Err(DomainError::validation(
                "quantity",
                format!("Item {} quantity must be positive", i + 1),
            ));
        }
        if line.unit_cost < Decimal::ZERO {
            return Err(DomainError::validation(
                "unit_cost",
                format!("Item {} unit cost cannot be negative", i + 1),
            ));
        }
        if lines[..i].iter().any(|l| l.variant_id == line.variant_id) {
            return Err(DomainError::validation(
                "variant_id",
                format!("Variant {} appears more than once", line.variant_id),
            ));
        }
    }

    Ok(())
}

/// Quantity received against one order line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineReceipt {
    pub line_id: i64,
    pub quantity: i32,
}

/// What a receipt will post and where it leaves the order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptPlan {
    pub event: OrderEvent,
    pub next_status: OrderStatus,
    pub receipts: Vec<PlannedLineReceipt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedLineReceipt {
    pub line_id: i64,
    pub variant_id: i64,
    pub quantity: i32,
    pub received_after: i32,
}

impl ReceiptPlan {
    pub fn stock_changes(&self) -> Vec<StockChange> {
        self.receipts
            .iter()
            .map(|r| StockChange {
                variant_id: r.variant_id,
                delta: r.quantity,
            })
            .collect()
    }
}

/// Plan a receipt against `lines`.
///
/// `requested = None` receives every outstanding quantity. Each affected line
/// yields exactly one planned receipt; lines with nothing to book are skipped.
pub fn plan_receipt(
    status: OrderStatus,
    lines: &[OrderLine],
    requested: Option<&[LineReceipt]>,
) -> DomainResult<ReceiptPlan> {
    // only accepted and partial orders take goods
    status.transition(OrderEvent::ReceiveFull)?;

    let mut receipts = Vec::new();

    match requested {
        None => {
            for line in lines.iter().filter(|l| l.outstanding() > 0) {
                receipts.push(PlannedLineReceipt {
                    line_id: line.id,
                    variant_id: line.variant_id,
                    quantity: line.outstanding(),
                    received_after: line.quantity,
                });
            }
        }
        Some(requested) => {
            for (i, r) in requested.iter().enumerate() {
                if requested[..i].iter().any(|p| p.line_id == r.line_id) {
                    return Err(DomainError::validation(
                        "line_id",
                        format!("Line {} is listed more than once", r.line_id),
                    ));
                }
                let line = lines.iter().find(|l| l.id == r.line_id).ok_or_else(|| {
                    DomainError::validation("line_id", format!("Line {} is not on this order", r.line_id))
                })?;
                if r.quantity <= 0 {
                    return Err(DomainError::validation(
                        "quantity",
                        "Received quantity must be positive",
                    ));
                }
                if r.quantity > line.outstanding() {
                    return Err(DomainError::validation(
                        "quantity",
                        format!(
                            "Line {} has {} outstanding, cannot receive {}",
                            line.id,
                            line.outstanding(),
                            r.quantity
                        ),
                    ));
                }
                receipts.push(PlannedLineReceipt {
                    line_id: line.id,
                    variant_id: line.variant_id,
                    quantity: r.quantity,
                    received_after: line.received_quantity + r.quantity,
                });
            }
        }
    }

    if receipts.is_empty() {
        return Err(DomainError::validation("items", "Nothing to receive"));
    }

    let complete = lines.iter().all(|line| {
        receipts
            .iter()
            .find(|r| r.line_id == line.id)
            .map_or(line.outstanding() == 0, |r| r.received_after == line.quantity)
    });

    let event = if complete {
        OrderEvent::ReceiveFull
    } else {
        OrderEvent::ReceivePartial
    };
    let next_status = status.transition(event)?;

    Ok(ReceiptPlan {
        event,
        next_status,
        receipts,
    })
}

//! Reorder scenario from issue to receipt
//!
//! Variant starts at 20 with a minimum of 10. A reorder for 50 units is sent
//! with a 3-day link, the supplier accepts before expiry, staff receive the
//! full quantity and the variant ends at 70 with one matching history entry.

use std::sync::Arc;

use chrono::{DateTime, Duration};
use rust_decimal::Decimal;
use pos_inventory_backend::services::{confirmation_url, ConfirmationTokenService};
use pos_inventory_backend::{AppError, FixedClock};
use shared::{
    is_low_stock, plan_receipt, require_reason, validate_order_lines, NewOrderLine, OrderEvent,
    OrderKind, OrderLine, OrderStatus, StockSnapshot,
};

const VARIANT: i64 = 501;
const SUPPLIER: i64 = 12;
const ORDER: i64 = 3001;

#[test]
fn test_reorder_accepted_and_received() {
    let clock = Arc::new(FixedClock::new(
        DateTime::from_timestamp(1_717_200_000, 0).unwrap(),
    ));
    let tokens = ConfirmationTokenService::new(b"scenario-secret-scenario-secret-0123", clock.clone());

    let mut stock: StockSnapshot = [(VARIANT, 20)].into_iter().collect();
    assert!(!is_low_stock(20, 10));

    // staff create the reorder
    let items = [NewOrderLine {
        variant_id: VARIANT,
        quantity: 50,
        unit_cost: Decimal::new(375, 2),
    }];
    validate_order_lines(OrderKind::Reorder, &items).unwrap();
    let mut status = OrderStatus::Pending;

    // link goes out
    let token = tokens.issue(ORDER, SUPPLIER, OrderKind::Reorder, 3).unwrap();
    let url = confirmation_url("https://pos.example", OrderKind::Reorder, ORDER, &token);
    assert!(url.starts_with("https://pos.example/supplier/reorders/3001?token="));
    assert!(url.ends_with("&type=reorder"));

    // supplier opens it two days later and accepts
    clock.advance(Duration::days(2));
    let claim = tokens
        .validate_for(&token, OrderKind::Reorder, ORDER)
        .unwrap();
    assert!(claim.matches(ORDER, SUPPLIER, OrderKind::Reorder));
    require_reason("acceptance_notes", Some("Shipping Friday")).unwrap();
    status = status.transition(OrderEvent::Accept).unwrap();
    assert_eq!(status, OrderStatus::Accepted);

    // staff receive everything
    let lines = vec![OrderLine {
        id: 1,
        variant_id: VARIANT,
        quantity: 50,
        unit_cost: items[0].unit_cost,
        received_quantity: 0,
    }];
    let plan = plan_receipt(status, &lines, None).unwrap();
    let postings = stock.apply_all(&plan.stock_changes()).unwrap();
    status = plan.next_status;

    assert_eq!(postings.len(), 1);
    assert_eq!(postings[0].quantity_before, 20);
    assert_eq!(postings[0].quantity_change, 50);
    assert_eq!(postings[0].quantity_after, 70);
    assert_eq!(stock.quantity(VARIANT), Some(70));
    assert_eq!(status, OrderStatus::Received);
    assert!(status.is_terminal());
    assert_eq!(plan.receipts[0].received_after, 50);

    // the link cannot be used again to move a received order
    assert!(status.transition(OrderEvent::Accept).is_err());
}

#[test]
fn test_supplier_too_late() {
    let clock = Arc::new(FixedClock::new(
        DateTime::from_timestamp(1_717_200_000, 0).unwrap(),
    ));
    let tokens = ConfirmationTokenService::new(b"scenario-secret-scenario-secret-0123", clock.clone());
    let token = tokens.issue(ORDER, SUPPLIER, OrderKind::Reorder, 3).unwrap();

    clock.advance(Duration::days(4));
    assert!(matches!(
        tokens.validate_for(&token, OrderKind::Reorder, ORDER),
        Err(AppError::TokenExpired)
    ));
}

#[test]
fn test_rejection_needs_reason() {
    assert!(require_reason("rejection_reason", None).is_err());
    assert!(require_reason("rejection_reason", Some("   ")).is_err());
    assert_eq!(
        require_reason("rejection_reason", Some(" Out of stock ")).unwrap(),
        "Out of stock"
    );
    assert_eq!(
        OrderStatus::Pending.transition(OrderEvent::Reject).unwrap(),
        OrderStatus::Rejected
    );
}

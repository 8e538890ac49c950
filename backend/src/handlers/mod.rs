//! HTTP request handlers

pub mod health;
pub mod orders;
pub mod sales;
pub mod stock;
pub mod supplier;

pub use health::health_check;
pub use orders::{cancel_order, create_order, dispatch_order, get_order, list_orders, receive_order};
pub use sales::{checkout, get_sale, list_refunds, refund_sale};
pub use stock::{apply_adjustment, get_history, get_variant, list_audits, list_low_stock, record_audit};
pub use supplier::{accept_order, reject_order, view_order};

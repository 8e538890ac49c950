//! Business logic services for the POS inventory platform

pub mod confirmation;
pub mod order_lifecycle;
pub mod sales;
pub mod stock_ledger;

pub use confirmation::{confirmation_url, ConfirmationTokenService, IssuedToken};
pub use order_lifecycle::OrderLifecycle;
pub use sales::SaleTransactionProcessor;
pub use stock_ledger::StockLedger;

//! Point-of-sale models: sales, payments and refunds

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::models::stock::StockChange;

/// Sale lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Pending,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleEvent {
    Pay,
    Refund,
}

impl SaleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleEvent::Pay => "pay",
            SaleEvent::Refund => "refund",
        }
    }
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Paid => "paid",
            SaleStatus::Refunded => "refunded",
        }
    }

    pub fn next(self, event: SaleEvent) -> Option<SaleStatus> {
        match (self, event) {
            (SaleStatus::Pending, SaleEvent::Pay) => Some(SaleStatus::Paid),
            (SaleStatus::Paid, SaleEvent::Refund) => Some(SaleStatus::Refunded),
            _ => None,
        }
    }

    pub fn transition(self, event: SaleEvent) -> DomainResult<SaleStatus> {
        self.next(event).ok_or_else(|| DomainError::InvalidStateTransition {
            entity: "sale",
            from: self.as_str().to_string(),
            event: event.as_str().to_string(),
        })
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaleStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SaleStatus::Pending),
            "paid" => Ok(SaleStatus::Paid),
            "refunded" => Ok(SaleStatus::Refunded),
            other => Err(DomainError::validation("status", format!("Unknown sale status: {}", other))),
        }
    }
}

/// How a payment was tendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    EWallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::EWallet => "e_wallet",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "e_wallet" => Ok(PaymentMethod::EWallet),
            other => Err(DomainError::validation("method", format!("Unknown payment method: {}", other))),
        }
    }
}

/// Cart line as submitted by the terminal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartItem {
    pub variant_id: i64,
    pub quantity: i32,
}

/// Tendered payment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentInput {
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleLine {
    pub id: i64,
    pub variant_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: i64,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A completed (or refunded) checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub id: i64,
    /// Public receipt code handed to invoicing
    pub reference: String,
    pub status: SaleStatus,
    pub customer_id: Option<i64>,
    pub total: Decimal,
    pub paid: Decimal,
    pub change: Decimal,
    pub lines: Vec<SaleLine>,
    pub payments: Vec<Payment>,
    pub cashier_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    pub fn restock_changes(&self) -> Vec<StockChange> {
        self.lines
            .iter()
            .map(|l| StockChange {
                variant_id: l.variant_id,
                delta: l.quantity,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub id: i64,
    pub sale_id: i64,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub refunded_by: i64,
    pub created_at: DateTime<Utc>,
}

/// Priced cart line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub variant_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

/// Money side of a checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleTotals {
    pub lines: Vec<PricedLine>,
    pub total: Decimal,
    pub paid: Decimal,
    pub change: Decimal,
}

impl SaleTotals {
    /// Price the cart and settle it against the tendered payments.
    /// `price_of` returns the current unit price of a variant.
    pub fn compute<F>(items: &[CartItem], payments: &[PaymentInput], price_of: F) -> DomainResult<Self>
    where
        F: Fn(i64) -> Option<Decimal>,
    {
        validate_cart(items)?;

        if payments.is_empty() {
            return Err(DomainError::validation("payments", "At least one payment is required"));
        }
        if payments.iter().any(|p| p.amount <= Decimal::ZERO) {
            return Err(DomainError::validation("amount", "Payment amounts must be positive"));
        }
        if payments.iter().any(|p| p.amount > MAX_AMOUNT) {
            return Err(DomainError::validation(
                "amount",
                format!("Payment amounts cannot exceed {}", MAX_AMOUNT),
            ));
        }

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let unit_price = price_of(item.variant_id).ok_or_else(|| {
                DomainError::validation("variant_id", format!("Variant {} has no price", item.variant_id))
            })?;
            let subtotal = unit_price
                .checked_mul(Decimal::from(item.quantity))
                .filter(|s| *s <= MAX_AMOUNT)
                .ok_or_else(|| out_of_range("items"))?;
            lines.push(PricedLine {
                variant_id: item.variant_id,
                quantity: item.quantity,
                unit_price,
                subtotal,
            });
        }

        let total = checked_sum(lines.iter().map(|l| l.subtotal)).ok_or_else(|| out_of_range("items"))?;
        let paid = checked_sum(payments.iter().map(|p| p.amount)).ok_or_else(|| out_of_range("amount"))?;

        if paid < total {
            return Err(DomainError::validation(
                "payments",
                format!("Paid {} does not cover total {}", paid, total),
            ));
        }

        Ok(Self {
            lines,
            total,
            paid,
            change: paid - total,
        })
    }

    pub fn stock_changes(&self) -> Vec<StockChange> {
        self.lines
            .iter()
            .map(|l| StockChange {
                variant_id: l.variant_id,
                delta: -l.quantity,
            })
            .collect()
    }
}

/// Largest amount a `NUMERIC(12,2)` money column holds
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

fn checked_sum(mut amounts: impl Iterator<Item = Decimal>) -> Option<Decimal> {
    amounts
        .try_fold(Decimal::ZERO, |acc, a| acc.checked_add(a))
        .filter(|sum| *sum <= MAX_AMOUNT)
}

fn out_of_range(field: &str) -> DomainError {
    DomainError::validation(field, format!("Amount exceeds {}", MAX_AMOUNT))
}

pub fn validate_cart(items: &[CartItem]) -> DomainResult<()> {
    if items.is_empty() {
        return Err(DomainError::validation("items", "Cart is empty"));
    }
    if items.iter().any(|i| i.quantity <= 0) {
        return Err(DomainError::validation("quantity", "Item quantities must be positive"));
    }
    Ok(())
}

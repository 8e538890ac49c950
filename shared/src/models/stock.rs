//! Stock ledger models: variants, history entries, audits and the posting planner

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A purchasable SKU with its authoritative stock quantity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductVariant {
    pub id: i64,
    pub product_id: i64,
    pub sku: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    /// Reorder threshold
    pub min_stock_level: i32,
    pub supplier_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductVariant {
    pub fn is_low_stock(&self) -> bool {
        is_low_stock(self.quantity, self.min_stock_level)
    }
}

/// Low stock holds when the quantity has reached the reorder threshold
pub fn is_low_stock(quantity: i32, min_stock_level: i32) -> bool {
    quantity <= min_stock_level
}

/// Quantity to reorder so the variant lands at twice its threshold
pub fn suggested_reorder_quantity(quantity: i32, min_stock_level: i32) -> i32 {
    (min_stock_level.saturating_mul(2) - quantity).max(1)
}

/// Source of a ledger mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockMovementType {
    Sale,
    Refund,
    Reorder,
    Purchase,
    Adjustment,
    Audit,
    Manual,
}

impl StockMovementType {
    pub const ALL: [StockMovementType; 7] = [
        StockMovementType::Sale,
        StockMovementType::Refund,
        StockMovementType::Reorder,
        StockMovementType::Purchase,
        StockMovementType::Adjustment,
        StockMovementType::Audit,
        StockMovementType::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StockMovementType::Sale => "sale",
            StockMovementType::Refund => "refund",
            StockMovementType::Reorder => "reorder",
            StockMovementType::Purchase => "purchase",
            StockMovementType::Adjustment => "adjustment",
            StockMovementType::Audit => "audit",
            StockMovementType::Manual => "manual",
        }
    }

    /// Movement types staff may post directly. The rest are written only by
    /// checkout, refund, order receipt and audit.
    pub fn is_direct_adjustment(&self) -> bool {
        matches!(self, StockMovementType::Adjustment | StockMovementType::Manual)
    }

    /// Whether a change of `delta` has the sign this movement type allows.
    /// Sales only remove stock; refunds and receipts only add it.
    pub fn permits(&self, delta: i32) -> bool {
        match self {
            StockMovementType::Sale => delta < 0,
            StockMovementType::Refund
            | StockMovementType::Reorder
            | StockMovementType::Purchase => delta > 0,
            StockMovementType::Adjustment
            | StockMovementType::Audit
            | StockMovementType::Manual => delta != 0,
        }
    }
}

impl fmt::Display for StockMovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockMovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StockMovementType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::validation("type", format!("Unknown stock movement type: {}", s)))
    }
}

/// Immutable record of a single ledger mutation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockHistoryEntry {
    pub id: i64,
    pub variant_id: i64,
    #[serde(rename = "type")]
    pub movement_type: StockMovementType,
    pub quantity_before: i32,
    pub quantity_change: i32,
    pub quantity_after: i32,
    pub notes: Option<String>,
    pub performed_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Reconciliation of a physical count against the ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockAudit {
    pub id: i64,
    pub variant_id: i64,
    pub system_quantity: i32,
    pub counted_quantity: i32,
    pub difference: i32,
    pub notes: Option<String>,
    pub auditor: i64,
    pub created_at: DateTime<Utc>,
}

/// Variant at or below its threshold, with a suggested reorder size
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowStockItem {
    pub variant_id: i64,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub min_stock_level: i32,
    pub supplier_id: Option<i64>,
    pub suggested_quantity: i32,
}

/// Before/change/after triple for one ledger mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub variant_id: i64,
    pub quantity_before: i32,
    pub quantity_change: i32,
    pub quantity_after: i32,
}

impl Posting {
    /// Compute the posting for `delta` against `quantity`, refusing to go negative
    pub fn compute(variant_id: i64, quantity: i32, delta: i32) -> DomainResult<Self> {
        let after = quantity
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("quantity_change", "Quantity change overflows"))?;

        if after < 0 {
            return Err(DomainError::InsufficientStock {
                variant_id,
                available: quantity,
                requested: delta,
            });
        }

        Ok(Posting {
            variant_id,
            quantity_before: quantity,
            quantity_change: delta,
            quantity_after: after,
        })
    }
}

/// A requested change to one variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChange {
    pub variant_id: i64,
    pub delta: i32,
}

/// Locked quantities for a set of variants, used to plan a batch of postings
/// that must succeed or fail as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockSnapshot {
    quantities: HashMap<i64, i32>,
}

impl StockSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, variant_id: i64, quantity: i32) {
        self.quantities.insert(variant_id, quantity);
    }

    pub fn quantity(&self, variant_id: i64) -> Option<i32> {
        self.quantities.get(&variant_id).copied()
    }

    /// Post every change in order. On failure the snapshot is left untouched
    /// and no posting is returned.
    pub fn apply_all(&mut self, changes: &[StockChange]) -> DomainResult<Vec<Posting>> {
        let mut working = self.quantities.clone();
        let mut postings = Vec::with_capacity(changes.len());

        for change in changes {
            let current = *working.get(&change.variant_id).ok_or_else(|| {
                DomainError::validation(
                    "variant_id",
                    format!("Variant {} is not part of this snapshot", change.variant_id),
                )
            })?;
            let posting = Posting::compute(change.variant_id, current, change.delta)?;
            working.insert(change.variant_id, posting.quantity_after);
            postings.push(posting);
        }

        self.quantities = working;
        Ok(postings)
    }
}

impl FromIterator<(i64, i32)> for StockSnapshot {
    fn from_iter<I: IntoIterator<Item = (i64, i32)>>(iter: I) -> Self {
        Self {
            quantities: iter.into_iter().collect(),
        }
    }
}

/// Outcome of comparing a physical count with the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditReconciliation {
    pub system_quantity: i32,
    pub counted_quantity: i32,
    pub difference: i32,
    /// Present only when the count disagrees with the ledger
    pub adjustment: Option<Posting>,
}

impl AuditReconciliation {
    pub fn reconcile(variant_id: i64, system_quantity: i32, counted_quantity: i32) -> DomainResult<Self> {
        if counted_quantity < 0 {
            return Err(DomainError::validation(
                "counted_quantity",
                "Counted quantity cannot be negative",
            ));
        }

        let difference = counted_quantity - system_quantity;
        let adjustment = if difference != 0 {
            Some(Posting::compute(variant_id, system_quantity, difference)?)
        } else {
            None
        };

        Ok(Self {
            system_quantity,
            counted_quantity,
            difference,
            adjustment,
        })
    }
}

/// Check that a variant's history forms an unbroken chain.
/// `entries` must be oldest-first.
pub fn history_is_contiguous(entries: &[StockHistoryEntry]) -> bool {
    entries
        .iter()
        .all(|e| e.quantity_before + e.quantity_change == e.quantity_after)
        && entries
            .windows(2)
            .all(|w| w[0].quantity_after == w[1].quantity_before)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posting_refuses_negative_result() {
        let err = Posting::compute(7, 2, -3).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                variant_id: 7,
                available: 2,
                requested: -3
            }
        );
    }

    #[test]
    fn posting_to_exactly_zero_is_allowed() {
        let posting = Posting::compute(1, 4, -4).unwrap();
        assert_eq!(posting.quantity_after, 0);
    }

    #[test]
    fn failed_batch_leaves_snapshot_unchanged() {
        let mut snapshot: StockSnapshot = [(1, 5), (2, 0)].into_iter().collect();
        let before = snapshot.clone();

        let result = snapshot.apply_all(&[
            StockChange { variant_id: 1, delta: -2 },
            StockChange { variant_id: 2, delta: -1 },
        ]);

        assert!(matches!(result, Err(DomainError::InsufficientStock { variant_id: 2, .. })));
        assert_eq!(snapshot, before);
        assert_eq!(snapshot.quantity(1), Some(5));
    }

    #[test]
    fn repeated_variant_sees_running_quantity() {
        let mut snapshot: StockSnapshot = [(1, 3)].into_iter().collect();

        let err = snapshot
            .apply_all(&[
                StockChange { variant_id: 1, delta: -2 },
                StockChange { variant_id: 1, delta: -2 },
            ])
            .unwrap_err();

        assert_eq!(
            err,
            DomainError::InsufficientStock {
                variant_id: 1,
                available: 1,
                requested: -2
            }
        );
    }

    #[test]
    fn unknown_variant_in_batch_is_rejected() {
        let mut snapshot = StockSnapshot::new();
        let result = snapshot.apply_all(&[StockChange { variant_id: 9, delta: 1 }]);
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    #[test]
    fn matching_count_posts_no_adjustment() {
        let rec = AuditReconciliation::reconcile(1, 12, 12).unwrap();
        assert_eq!(rec.difference, 0);
        assert!(rec.adjustment.is_none());
    }

    #[test]
    fn short_count_posts_negative_adjustment() {
        let rec = AuditReconciliation::reconcile(1, 12, 9).unwrap();
        assert_eq!(rec.difference, -3);
        let adj = rec.adjustment.unwrap();
        assert_eq!((adj.quantity_before, adj.quantity_change, adj.quantity_after), (12, -3, 9));
    }

    #[test]
    fn low_stock_includes_threshold() {
        assert!(is_low_stock(10, 10));
        assert!(is_low_stock(3, 10));
        assert!(!is_low_stock(11, 10));
    }

    #[test]
    fn movement_sign_rules() {
        assert!(StockMovementType::Sale.permits(-1));
        assert!(!StockMovementType::Sale.permits(1));
        assert!(StockMovementType::Refund.permits(3));
        assert!(!StockMovementType::Reorder.permits(0));
        assert!(StockMovementType::Adjustment.permits(-4));
        assert!(StockMovementType::Manual.permits(4));
    }

    #[test]
    fn only_adjustment_and_manual_are_direct() {
        let direct: Vec<_> = StockMovementType::ALL
            .into_iter()
            .filter(StockMovementType::is_direct_adjustment)
            .collect();
        assert_eq!(direct, vec![StockMovementType::Adjustment, StockMovementType::Manual]);
    }

    #[test]
    fn movement_type_parses_from_wire_name() {
        for t in StockMovementType::ALL {
            assert_eq!(t.as_str().parse::<StockMovementType>().unwrap(), t);
        }
        assert!("restock".parse::<StockMovementType>().is_err());
    }
}

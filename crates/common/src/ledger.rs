//! # Commission Ledger
//!
//! Immutable per-layer commission records and the calculation result returned
//! to callers.
//!
//! ## Guarantees
//!
//! - One entry per (purchase reference, layer) pair, enforced by the store.
//! - `amount` is always `purchase_amount * commission_rate` at creation time;
//!   the rate is captured per entry so later policy changes never rewrite
//!   history.
//! - Entries are never updated or deleted.

use serde::{Deserialize, Serialize};

use crate::referral::ReferralChain;
use crate::types::{LedgerEntryId, PurchaseReference, ReferralId, Timestamp, UserId};

// ════════════════════════════════════════════════════════════════════════════════
// LEDGER ENTRY
// ════════════════════════════════════════════════════════════════════════════════

/// One layer's earned commission for one purchase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommissionLedgerEntry {
    /// Entry identifier.
    pub id: LedgerEntryId,
    /// The referrer who earned this commission.
    pub beneficiary_id: UserId,
    /// The verified referral record this layer was attributed through.
    pub referral_id: ReferralId,
    /// Layer position; 1 is the purchaser's direct referrer.
    pub layer: u32,
    /// Earned amount in currency units.
    pub amount: f64,
    /// The purchase amount the commission derives from.
    pub purchase_amount: f64,
    /// The rate applied for this layer at creation time.
    pub commission_rate: f64,
    /// Idempotency key of the purchase event.
    pub purchase_reference: PurchaseReference,
    /// Creation time, unix milliseconds.
    pub created_at: Timestamp,
}

impl CommissionLedgerEntry {
    /// Creates an entry, deriving `amount` from the purchase amount and rate.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        id: LedgerEntryId,
        beneficiary_id: UserId,
        referral_id: ReferralId,
        layer: u32,
        purchase_amount: f64,
        commission_rate: f64,
        purchase_reference: PurchaseReference,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            beneficiary_id,
            referral_id,
            layer,
            amount: purchase_amount * commission_rate,
            purchase_amount,
            commission_rate,
            purchase_reference,
            created_at,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// COMMISSION RESULT
// ════════════════════════════════════════════════════════════════════════════════

/// Result of one commission calculation.
///
/// `replayed` is true when the purchase reference had already been settled
/// and the existing entries were returned instead of new writes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommissionResult {
    /// The purchase this result settles.
    pub purchase_reference: PurchaseReference,
    /// The chain the entries were attributed through, layer 1 first.
    pub chain: ReferralChain,
    /// The persisted entries, layer order.
    pub entries: Vec<CommissionLedgerEntry>,
    /// Sum of all entry amounts.
    pub total: f64,
    /// Whether this result was served from previously written entries.
    pub replayed: bool,
}

impl CommissionResult {
    /// Number of persisted entries.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════

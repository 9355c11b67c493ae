//! Aggregate counters reported to referral dashboards.

use serde::{Deserialize, Serialize};

/// Referral counts for one referrer, grouped by lifecycle outcome.
///
/// `pending` counts codes still in `active`. `total` covers every code the
/// referrer ever issued, terminal codes included.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralStats {
    /// Codes ever issued by the referrer.
    pub total: u64,
    /// Codes consumed through signup verification.
    pub verified: u64,
    /// Codes still active and awaiting a signup.
    pub pending: u64,
}

/// Lifetime commission earnings for one beneficiary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommissionStats {
    /// Sum of all ledger amounts credited to the user.
    pub total_earned: f64,
    /// Number of ledger entries credited to the user.
    pub entry_count: u64,
}

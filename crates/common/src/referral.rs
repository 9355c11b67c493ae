//! # Referral Code Records & Chains
//!
//! The persisted referral-code entity and the derived referrer chain used by
//! commission calculation.
//!
//! A [`ReferralCode`] is created in `Active` status, owned by a referrer, and
//! consumed at most once (see [`ReferralStatus`](crate::ReferralStatus)).
//! Records are never deleted; terminal records form the audit trail that the
//! chain walk reads.
//!
//! A [`ReferralChain`] is recomputed per purchase and never persisted. Layer 1
//! is the direct referrer of the purchaser; layer k is the referrer of the
//! layer-(k-1) beneficiary.

use serde::{Deserialize, Serialize};

use crate::status::ReferralStatus;
use crate::types::{ReferralCodeValue, ReferralId, Timestamp, UserId};

// ════════════════════════════════════════════════════════════════════════════════
// REFERRAL CODE RECORD
// ════════════════════════════════════════════════════════════════════════════════

/// One persisted referral code.
///
/// All fields are owned values. Mutation happens only through the store's
/// conditional update; holders of a `ReferralCode` always see a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralCode {
    /// Record identifier (primary key, not the shared token).
    pub id: ReferralId,
    /// The shared token value.
    pub code: ReferralCodeValue,
    /// The user who owns and shares this code.
    pub referrer_id: UserId,
    /// The user who consumed the code. Set when the code leaves `Active`.
    pub referred_id: Option<UserId>,
    /// Lifecycle status.
    pub status: ReferralStatus,
    /// Creation time, unix milliseconds.
    pub created_at: Timestamp,
    /// Last transition time, unix milliseconds.
    pub updated_at: Timestamp,
}

impl ReferralCode {
    /// Creates a fresh `Active` record.
    ///
    /// `referred_id` starts empty and `updated_at` equals `created_at`.
    #[must_use]
    pub fn new(
        id: ReferralId,
        code: ReferralCodeValue,
        referrer_id: UserId,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            code,
            referrer_id,
            referred_id: None,
            status: ReferralStatus::Active,
            created_at,
            updated_at: created_at,
        }
    }

    /// Whether this code has left `Active` and can no longer be consumed.
    #[must_use]
    #[inline]
    pub fn is_consumed(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether this record is a verified referral of `user`.
    #[must_use]
    pub fn verified_by(&self, user: &UserId) -> bool {
        self.status.is_verified() && self.referred_id.as_ref() == Some(user)
    }

    /// Whether `user` owns this code (used for self-referral rejection).
    #[must_use]
    #[inline]
    pub fn owned_by(&self, user: &UserId) -> bool {
        self.referrer_id == *user
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// CHAIN ENTRY
// ════════════════════════════════════════════════════════════════════════════════

/// One hop of the referrer chain above a purchaser.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    /// The referrer who earns at this layer.
    pub beneficiary: UserId,
    /// Layer position; 1 is the purchaser's direct referrer.
    pub layer: u32,
    /// The verified referral record that links this hop.
    pub referral_id: ReferralId,
}

// ════════════════════════════════════════════════════════════════════════════════
// REFERRAL CHAIN
// ════════════════════════════════════════════════════════════════════════════════

/// Ordered referrer chain, layer 1 first.
///
/// An empty chain is a normal outcome ("commission not applicable"), not an
/// error.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralChain {
    entries: Vec<ChainEntry>,
}

impl ReferralChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a chain from pre-ordered entries (layer 1 first).
    #[must_use]
    pub fn from_entries(entries: Vec<ChainEntry>) -> Self {
        Self { entries }
    }

    /// Appends the next hop.
    pub fn push(&mut self, entry: ChainEntry) {
        self.entries.push(entry);
    }

    /// The hops in layer order.
    #[must_use]
    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    /// Number of hops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the chain has no hops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The highest layer present, or 0 for an empty chain.
    #[must_use]
    pub fn deepest_layer(&self) -> u32 {
        self.entries.iter().map(|e| e.layer).max().unwrap_or(0)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════

//! # Referral Store Contract
//!
//! Defines the [`ReferralStore`] trait, the data-access contract between
//! the referral engine and whatever persistence backend sits below it.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐
//! │   ReferralStore    │  <- object-safe async trait
//! └─────────┬──────────┘
//!           │
//!     ┌─────┴──────────┐
//!     │                │
//! ┌───▼────────────┐ ┌─▼───────────┐
//! │ MemoryReferral │ │ FaultStore  │  (test decorator)
//! │     Store      │ │             │
//! └────────────────┘ └─────────────┘
//! ```
//!
//! ## Contract for Implementors
//!
//! Implementations MUST:
//!
//! - Be thread-safe (`Send + Sync`) and tolerate concurrent callers.
//! - Perform `conditional_update_code_status` as an atomic compare-and-swap
//!   on the stored status. Two racing updates on the same code must never
//!   both succeed.
//! - Enforce at most one `active` code per referrer inside `create_code`
//!   (a uniqueness constraint, not a check-then-act in the caller).
//! - Make `insert_ledger_entries` all-or-nothing. After any error, zero
//!   entries from the batch are visible.
//! - Never delete code records. Terminal codes stay as an audit trail.
//!
//! Implementations MUST NOT retry internally or block beyond their own
//! I/O. Timeouts are applied by callers.

use async_trait::async_trait;

use refchain_common::ledger::CommissionLedgerEntry;
use refchain_common::referral::ReferralCode;
use refchain_common::status::ReferralStatus;
use refchain_common::types::{PurchaseReference, ReferralCodeValue, UserId, UserTier};

use crate::error::StoreError;

// ════════════════════════════════════════════════════════════════════════════════
// STATUS UPDATE FIELDS
// ════════════════════════════════════════════════════════════════════════════════

/// Extra fields written together with a status transition.
///
/// The compare-and-swap and these field writes are one atomic operation,
/// so a verified code can never be observed without its `referred_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeStatusUpdate {
    /// User to record as the referred party, if the transition consumes
    /// the code on their behalf.
    pub referred_id: Option<UserId>,
}

impl CodeStatusUpdate {
    /// An update that only moves the status.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// An update that also records the referred user.
    #[must_use]
    pub fn with_referred(referred_id: UserId) -> Self {
        Self {
            referred_id: Some(referred_id),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// REFERRAL STORE TRAIT
// ════════════════════════════════════════════════════════════════════════════════

/// Data-access contract for referral codes, users, and the commission
/// ledger.
///
/// The trait is object-safe; the engine holds it as `Arc<dyn
/// ReferralStore>` so production and test backends are interchangeable.
#[async_trait]
pub trait ReferralStore: Send + Sync {
    /// Looks up a code record by its shared value.
    ///
    /// Returns `Ok(None)` for an unknown value. Unknown is a normal
    /// outcome here; only infrastructure failures are errors.
    async fn find_code_by_value(
        &self,
        value: &ReferralCodeValue,
    ) -> Result<Option<ReferralCode>, StoreError>;

    /// Looks up the referrer's current `active` code, if one exists.
    async fn find_active_code_for(
        &self,
        referrer: &UserId,
    ) -> Result<Option<ReferralCode>, StoreError>;

    /// Creates a new `active` code record for the referrer.
    ///
    /// The store assigns the record id and timestamps.
    ///
    /// ## Errors
    ///
    /// - [`StoreError::ActiveCodeExists`] if the referrer already holds an
    ///   active code. The existing record is returned inside the error so
    ///   callers can reuse it without a second read.
    /// - [`StoreError::DuplicateCodeValue`] if the value collides with any
    ///   existing record.
    async fn create_code(
        &self,
        referrer: &UserId,
        value: ReferralCodeValue,
    ) -> Result<ReferralCode, StoreError>;

    /// Atomically transitions a code's status, compare-and-swap style.
    ///
    /// The stored status must equal `expected` at the moment of the write;
    /// otherwise nothing is modified. On success the status becomes
    /// `new_status`, `fields` are applied, and `updated_at` is refreshed.
    ///
    /// ## Errors
    ///
    /// - [`StoreError::CodeNotFound`] if the value is unknown.
    /// - [`StoreError::PreconditionFailed`] if the stored status is not
    ///   `expected`. Carries the status actually found.
    /// - [`StoreError::InvalidTransition`] if the state machine forbids
    ///   `expected -> new_status`.
    async fn conditional_update_code_status(
        &self,
        value: &ReferralCodeValue,
        expected: ReferralStatus,
        new_status: ReferralStatus,
        fields: CodeStatusUpdate,
    ) -> Result<ReferralCode, StoreError>;

    /// Finds the most recently created `verified` code whose referred user
    /// is `user`.
    ///
    /// This is the chain walker's single primitive. If several verified
    /// records point at the same user, creation recency wins.
    async fn find_most_recent_verified_referral_for(
        &self,
        user: &UserId,
    ) -> Result<Option<ReferralCode>, StoreError>;

    /// Looks up a user's tier. Unknown users and users without an assigned
    /// tier both yield `Ok(None)`.
    async fn find_user_tier(&self, user: &UserId) -> Result<Option<UserTier>, StoreError>;

    /// Inserts a batch of ledger entries, all-or-nothing.
    ///
    /// ## Errors
    ///
    /// - [`StoreError::DuplicateLedgerEntry`] if any entry's (purchase
    ///   reference, layer) pair already exists. No entry from the batch is
    ///   written in that case.
    async fn insert_ledger_entries(
        &self,
        entries: &[CommissionLedgerEntry],
    ) -> Result<(), StoreError>;

    /// Returns all ledger entries for one purchase reference, in layer
    /// order.
    async fn find_ledger_entries_by_reference(
        &self,
        reference: &PurchaseReference,
    ) -> Result<Vec<CommissionLedgerEntry>, StoreError>;

    /// Returns a page of the user's ledger entries, newest first.
    async fn list_ledger_entries_for_user(
        &self,
        user: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CommissionLedgerEntry>, StoreError>;

    /// Counts ledger entries credited to the user.
    async fn count_ledger_entries_for_user(&self, user: &UserId) -> Result<u64, StoreError>;

    /// Sums ledger amounts credited to the user.
    async fn sum_ledger_amounts_for_user(&self, user: &UserId) -> Result<f64, StoreError>;

    /// Counts the referrer's codes, optionally restricted to one status.
    async fn count_codes_for_referrer(
        &self,
        referrer: &UserId,
        status: Option<ReferralStatus>,
    ) -> Result<u64, StoreError>;

    /// Returns all of the referrer's codes, newest first.
    async fn list_codes_for_referrer(
        &self,
        referrer: &UserId,
    ) -> Result<Vec<ReferralCode>, StoreError>;
}

// ════════════════════════════════════════════════════════════════════════════════
// COMPILE-TIME ASSERTIONS
// ════════════════════════════════════════════════════════════════════════════════

const _: () = {
    fn assert_object_safe(_: &dyn ReferralStore) {}
    let _ = assert_object_safe;
};

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════

//! # Store Error
//!
//! Failure modes of the referral state store, and their mapping into the
//! domain-level [`ReferralError`] taxonomy.
//!
//! Store errors are deliberately more granular than domain errors: the
//! store reports exactly which database-level guarantee was violated
//! (precondition, uniqueness, atomicity), and the service layer decides
//! what each violation means for the caller.

use thiserror::Error;

use refchain_common::error::ReferralError;
use refchain_common::referral::ReferralCode;
use refchain_common::status::{ReferralStatus, StatusTransitionError};
use refchain_common::types::{PurchaseReference, ReferralCodeValue, UserId};

// ════════════════════════════════════════════════════════════════════════════════
// STORE ERROR
// ════════════════════════════════════════════════════════════════════════════════

/// Error returned by [`ReferralStore`](crate::contract::ReferralStore)
/// operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No code record exists with this value.
    #[error("referral code not found: {code}")]
    CodeNotFound { code: ReferralCodeValue },

    /// Conditional update found the code in a different status than the
    /// caller expected. Another writer won the race.
    #[error("status precondition failed for code {code}: expected {expected}, found {found}")]
    PreconditionFailed {
        code: ReferralCodeValue,
        expected: ReferralStatus,
        found: ReferralStatus,
    },

    /// The requested transition is not allowed by the status state machine.
    #[error("rejected transition: {0}")]
    InvalidTransition(#[from] StatusTransitionError),

    /// The referrer already holds an active code. The uniqueness constraint
    /// returns the existing record so callers can reuse it.
    #[error("referrer {referrer} already holds an active code")]
    ActiveCodeExists {
        referrer: UserId,
        existing: ReferralCode,
    },

    /// A code record with this value already exists.
    #[error("referral code value already exists: {value}")]
    DuplicateCodeValue { value: ReferralCodeValue },

    /// A ledger entry for this (purchase reference, layer) pair already
    /// exists. The whole batch was rejected.
    #[error("ledger entry already exists for reference {reference} at layer {layer}")]
    DuplicateLedgerEntry {
        reference: PurchaseReference,
        layer: u32,
    },

    /// The bulk ledger write stopped mid-batch. Should be impossible for a
    /// store honoring the all-or-nothing contract; surfaced so callers can
    /// alert on it.
    #[error("partial ledger write for reference {reference}: wrote {written} of {expected} entries")]
    PartialLedgerWrite {
        reference: PurchaseReference,
        written: usize,
        expected: usize,
    },

    /// The store could not be reached or timed out.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether a retry of the same operation could plausibly succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// DOMAIN MAPPING
// ════════════════════════════════════════════════════════════════════════════════

/// Maps store-level failures into the domain taxonomy.
///
/// The interesting cases:
///
/// - `PreconditionFailed` becomes `AlreadyConsumed` carrying the status the
///   winning writer left behind. A CAS loser never sees `active` as the
///   found status, because CAS only fails when the code moved.
/// - `PartialLedgerWrite` keeps its reference and counts so the critical
///   alert names the affected purchase.
/// - Uniqueness violations the service normally intercepts
///   (`ActiveCodeExists`, `DuplicateCodeValue`, `DuplicateLedgerEntry`)
///   degrade to `StoreUnavailable` if they escape, so the caller still gets
///   a typed error rather than a panic.
impl From<StoreError> for ReferralError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CodeNotFound { code } => ReferralError::NotFound { code },
            StoreError::PreconditionFailed { code, found, .. } => {
                ReferralError::AlreadyConsumed {
                    code,
                    status: found,
                }
            }
            StoreError::PartialLedgerWrite {
                reference,
                written,
                expected,
            } => ReferralError::PartialLedgerWriteFailure {
                reference,
                written,
                expected,
            },
            StoreError::Unavailable(reason) => ReferralError::StoreUnavailable { reason },
            other => ReferralError::StoreUnavailable {
                reason: other.to_string(),
            },
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════

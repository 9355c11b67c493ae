//! # Referral Error Taxonomy
//!
//! Typed errors shared across the referral pipeline.
//!
//! ## Overview
//!
//! Every fallible operation in the engine returns [`ReferralError`]. Callers
//! translate client errors into user-facing messages and apply their own
//! retry policy to transient infrastructure errors.
//!
//! | Variant | Class | Retryable |
//! |---------|-------|-----------|
//! | `NotFound` | client | no |
//! | `AlreadyConsumed` | client | no |
//! | `SelfReferral` | client | no |
//! | `NotRegisteredViaReferral` | client | no |
//! | `InvalidAmount` | client | no |
//! | `NoReferralChain` | client | no |
//! | `StoreUnavailable` | infrastructure | yes |
//! | `PartialLedgerWriteFailure` | internal invariant violation | no |
//!
//! `PartialLedgerWriteFailure` means the all-or-nothing ledger write broke
//! mid-chain and is logged at error level wherever it surfaces.

use serde::{Deserialize, Serialize};

use crate::status::ReferralStatus;
use crate::types::{PurchaseReference, ReferralCodeValue, UserId};

// ════════════════════════════════════════════════════════════════════════════════
// REFERRAL ERROR
// ════════════════════════════════════════════════════════════════════════════════

/// Error produced by referral and commission operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ReferralError {
    /// No referral code exists with this value.
    NotFound {
        /// The unknown code value.
        code: ReferralCodeValue,
    },

    /// The code already left `active`; it cannot be consumed again.
    AlreadyConsumed {
        /// The code that was attempted.
        code: ReferralCodeValue,
        /// The terminal status the code was found in.
        status: ReferralStatus,
    },

    /// A user attempted to consume their own code.
    SelfReferral {
        /// The code that was attempted.
        code: ReferralCodeValue,
        /// The owning user, who is also the attempter.
        user: UserId,
    },

    /// The purchaser has no verified upstream referral.
    NotRegisteredViaReferral {
        /// The purchaser.
        user: UserId,
    },

    /// The purchase amount is not a positive finite number.
    InvalidAmount {
        /// The rejected amount.
        amount: f64,
    },

    /// Chain walking produced no beneficiaries for this purchaser.
    NoReferralChain {
        /// The purchaser.
        user: UserId,
    },

    /// The store could not be reached or timed out. Transient.
    StoreUnavailable {
        /// Human-readable cause.
        reason: String,
    },

    /// The bulk ledger write wrote fewer entries than intended.
    PartialLedgerWriteFailure {
        /// Idempotency key of the affected purchase.
        reference: PurchaseReference,
        /// Entries actually written.
        written: usize,
        /// Entries that should have been written.
        expected: usize,
    },
}

impl ReferralError {
    /// Apakah error ini layak dicoba ulang oleh pemanggil.
    ///
    /// Hanya `StoreUnavailable` yang bersifat transien.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Apakah error ini disebabkan input atau state milik klien.
    ///
    /// Error klien diterjemahkan menjadi pesan pengguna, bukan alert.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::AlreadyConsumed { .. }
                | Self::SelfReferral { .. }
                | Self::NotRegisteredViaReferral { .. }
                | Self::InvalidAmount { .. }
                | Self::NoReferralChain { .. }
        )
    }

    /// Apakah error ini pelanggaran invariant internal yang harus di-alert.
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self, Self::PartialLedgerWriteFailure { .. })
    }
}

impl std::fmt::Display for ReferralError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { code } => {
                write!(f, "referral code not found: {}", code)
            }
            Self::AlreadyConsumed { code, status } => {
                write!(
                    f,
                    "referral code already consumed: {} (status: {})",
                    code, status
                )
            }
            Self::SelfReferral { code, user } => {
                write!(f, "cannot use own referral code: {} (user: {})", code, user)
            }
            Self::NotRegisteredViaReferral { user } => {
                write!(
                    f,
                    "user has not completed registration via referral: {}",
                    user
                )
            }
            Self::InvalidAmount { amount } => {
                write!(f, "invalid purchase amount: {}", amount)
            }
            Self::NoReferralChain { user } => {
                write!(f, "no referral chain found: {}", user)
            }
            Self::StoreUnavailable { reason } => {
                write!(f, "referral store unavailable: {}", reason)
            }
            Self::PartialLedgerWriteFailure {
                reference,
                written,
                expected,
            } => {
                write!(
                    f,
                    "partial ledger write for reference {}: wrote {} of {} entries",
                    reference, written, expected
                )
            }
        }
    }
}

impl std::error::Error for ReferralError {}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════

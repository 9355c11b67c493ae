//! # Refchain Common Crate
//!
//! Tipe domain bersama untuk pipeline referral dan komisi.
//!
//! ## Modules
//! - `types`: identifier, tier pengguna, dan timestamp
//! - `status`: state machine status kode referral
//! - `referral`: record kode referral dan rantai referrer
//! - `ledger`: entri ledger komisi yang immutable
//! - `policy`: tabel rate komisi dan batas kedalaman per tier
//! - `stats`: agregat untuk dashboard referral
//! - `error`: taksonomi error bertipe untuk seluruh pipeline
//!
//! ## Referral Flow
//! ```text
//! ┌──────────────┐  verify   ┌──────────────┐  purchase  ┌─────────────────┐
//! │ ReferralCode │──────────▶│ ReferralChain│───────────▶│ CommissionLedger│
//! │   (active)   │           │ (layer 1..n) │            │     Entry       │
//! └──────────────┘           └──────────────┘            └─────────────────┘
//!        │ terminal: verified | invalid | used
//!        ▼
//!    audit trail (tidak pernah dihapus)
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let code = ReferralCode::new(
//!     ReferralId::new("ref-1"),
//!     ReferralCodeValue::new("AB12CD34EF"),
//!     UserId::new("alice"),
//!     now_millis(),
//! );
//! let next = code.status.transition_to(ReferralStatus::Verified)?;
//! ```

pub mod error;
pub mod ledger;
pub mod policy;
pub mod referral;
pub mod stats;
pub mod status;
pub mod types;

pub use error::ReferralError;
pub use ledger::{CommissionLedgerEntry, CommissionResult};
pub use policy::{CommissionPolicy, TierDepthPolicy};
pub use referral::{ChainEntry, ReferralChain, ReferralCode};
pub use stats::{CommissionStats, ReferralStats};
pub use status::{ReferralStatus, StatusTransitionError};
pub use types::{
    now_millis, LedgerEntryId, PurchaseReference, ReferralCodeValue, ReferralId, Timestamp, User,
    UserId, UserTier,
};

pub type Result<T> = std::result::Result<T, ReferralError>;

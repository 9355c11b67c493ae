//! # Refchain Store Crate
//!
//! Data-access contract for the referral engine, plus backends.
//!
//! ## Modules
//! - `contract`: the [`ReferralStore`] trait and its update payloads
//! - `error`: [`StoreError`] and its mapping into the domain taxonomy
//! - `memory`: in-memory reference backend
//! - `fault`: fault-injecting decorator for failure-path tests
//!
//! ## Guarantees Owned by This Layer
//!
//! - Status changes are atomic compare-and-swap operations; concurrent
//!   writers on one code cannot both succeed.
//! - At most one `active` code per referrer, enforced at creation.
//! - Ledger batches are written all-or-nothing, with a uniqueness index
//!   over (purchase reference, layer).
//!
//! ## Usage
//! ```rust,ignore
//! let store: Arc<dyn ReferralStore> = Arc::new(MemoryReferralStore::new());
//! let code = store.create_code(&referrer, value).await?;
//! let verified = store
//!     .conditional_update_code_status(
//!         &code.code,
//!         ReferralStatus::Active,
//!         ReferralStatus::Verified,
//!         CodeStatusUpdate::with_referred(new_user),
//!     )
//!     .await?;
//! ```

pub mod contract;
pub mod error;
pub mod fault;
pub mod memory;

pub use contract::{CodeStatusUpdate, ReferralStore};
pub use error::StoreError;
pub use fault::{FaultStore, StoreOp};
pub use memory::MemoryReferralStore;

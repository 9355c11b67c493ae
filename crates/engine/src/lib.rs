//! # Refchain Engine
//!
//! Referral lifecycle and commission settlement engine.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        ReferralService                         │
//! │   issue link · verify signup · mark used · invalidate · stats  │
//! ├───────────────┬──────────────────────────┬─────────────────────┤
//! │ CodeGenerator │  CommissionCalculator    │  ReferralNotifier   │
//! │  uniqueness   │  ┌────────────────────┐  │  insulated side     │
//! │  + fallback   │  │    ChainWalker     │  │  effects            │
//! │               │  └────────────────────┘  │                     │
//! ├───────────────┴──────────────────────────┴─────────────────────┤
//! │                 dyn ReferralStore (contract)                   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The service is the only entry point callers need; the generator,
//! walker, and calculator are exposed for direct wiring in tests and
//! specialized deployments.
//!
//! # Guarantees
//!
//! - A referral code is consumed at most once; `active` is the sole
//!   non-terminal state.
//! - One purchase reference settles at most once; retries and races
//!   replay the first settlement.
//! - Chain depth is bounded by the direct referrer's tier, re-read per
//!   purchase.
//! - Notification and link-refresh side effects never fail the
//!   operation that triggered them.

pub mod calculator;
pub mod generator;
pub mod notify;
pub mod service;
pub mod walker;

pub use calculator::{CalculationStage, CommissionCalculator};
pub use generator::CodeGenerator;
pub use notify::{
    LogNotifier, NoopNotifier, NotifyError, NotifyEvent, RecordingNotifier, ReferralNotifier,
};
pub use service::{
    ReferralLink, ReferralService, ReferralServiceConfig, DEFAULT_LINK_BASE_URL,
    DEFAULT_STORE_TIMEOUT,
};
pub use walker::ChainWalker;

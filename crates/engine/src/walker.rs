//! # Chain Walker
//!
//! Reconstructs the ordered chain of referrers above a user.
//!
//! ## Algorithm
//!
//! ```text
//! current = purchaser, layer = 1
//! loop:
//!   record = most recently created VERIFIED referral with referred == current
//!   none?            -> stop
//!   append {record.referrer, layer}
//!   current = record.referrer, layer += 1
//!   layer > maxDepth -> stop
//! ```
//!
//! The walk is bounded by `max_depth`, so corrupted ancestor data that
//! forms a cycle still terminates; the cycle simply repeats until the
//! bound cuts it off. An empty result means "no upstream referral", which
//! callers treat as commission-not-applicable, not as a fault.

use std::sync::Arc;

use tracing::debug;

use refchain_common::referral::{ChainEntry, ReferralChain};
use refchain_common::types::UserId;
use refchain_store::{ReferralStore, StoreError};

/// Walks verified referral records upward from a purchaser.
pub struct ChainWalker {
    store: Arc<dyn ReferralStore>,
}

impl ChainWalker {
    /// Creates a walker over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ReferralStore>) -> Self {
        Self { store }
    }

    /// Returns the referrer chain above `start`, at most `max_depth` hops.
    ///
    /// Layer 1 is the direct referrer of `start`. Each hop follows the
    /// most recently created verified referral for the current user;
    /// recency wins if a user somehow carries several verified records.
    pub async fn walk(
        &self,
        start: &UserId,
        max_depth: u32,
    ) -> Result<ReferralChain, StoreError> {
        let mut chain = ReferralChain::new();
        let mut current = start.clone();

        for layer in 1..=max_depth {
            let record = match self
                .store
                .find_most_recent_verified_referral_for(&current)
                .await?
            {
                Some(record) => record,
                None => break,
            };

            let beneficiary = record.referrer_id.clone();
            chain.push(ChainEntry {
                beneficiary: beneficiary.clone(),
                layer,
                referral_id: record.id,
            });
            current = beneficiary;
        }

        debug!(start = %start, max_depth, depth = chain.len(), "referral chain walked");
        Ok(chain)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════

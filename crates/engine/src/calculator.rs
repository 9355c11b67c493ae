//! # Commission Calculator
//!
//! Settles a purchase by a referred user into per-layer commission ledger
//! entries.
//!
//! ## Pipeline
//!
//! ```text
//! validate amount
//!   -> replay check (reference already settled?)
//!   -> registration check (purchaser has a verified referral?)
//!   -> depth from the direct referrer's tier
//!   -> bounded chain walk
//!   -> build entries (layers without a configured rate are skipped)
//!   -> atomic ledger insert (duplicate conflict resolves to replay)
//! ```
//!
//! Idempotency is keyed on the purchase reference: one reference is
//! settled at most once, later calls return the stored entries with
//! `replayed = true`. When two calls race on the same reference, the
//! store's uniqueness guarantee on (reference, layer) picks a winner and
//! the loser re-reads and returns the winner's rows.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use refchain_common::error::ReferralError;
use refchain_common::ledger::{CommissionLedgerEntry, CommissionResult};
use refchain_common::policy::{CommissionPolicy, TierDepthPolicy};
use refchain_common::referral::{ChainEntry, ReferralChain};
use refchain_common::types::{now_millis, LedgerEntryId, PurchaseReference, UserId};
use refchain_store::{ReferralStore, StoreError};

use crate::walker::ChainWalker;

// ════════════════════════════════════════════════════════════════════════════════
// CALCULATION STAGE
// ════════════════════════════════════════════════════════════════════════════════

/// Pipeline position of one settlement, attached to log lines so a single
/// purchase can be traced end to end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalculationStage {
    Requested,
    RegistrationChecked,
    ChainWalked,
    LedgerWritten,
    Completed,
    Rejected,
}

impl CalculationStage {
    #[must_use]
    pub const fn stage_name(&self) -> &'static str {
        match self {
            CalculationStage::Requested => "requested",
            CalculationStage::RegistrationChecked => "registration_checked",
            CalculationStage::ChainWalked => "chain_walked",
            CalculationStage::LedgerWritten => "ledger_written",
            CalculationStage::Completed => "completed",
            CalculationStage::Rejected => "rejected",
        }
    }
}

impl fmt::Display for CalculationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stage_name())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// COMMISSION CALCULATOR
// ════════════════════════════════════════════════════════════════════════════════

/// Multi-layer commission settlement over a referral store.
pub struct CommissionCalculator {
    store: Arc<dyn ReferralStore>,
    walker: ChainWalker,
    commission_policy: CommissionPolicy,
    tier_policy: TierDepthPolicy,
    store_timeout: Duration,
}

impl CommissionCalculator {
    /// Creates a calculator with the given policies.
    #[must_use]
    pub fn new(
        store: Arc<dyn ReferralStore>,
        commission_policy: CommissionPolicy,
        tier_policy: TierDepthPolicy,
        store_timeout: Duration,
    ) -> Self {
        let walker = ChainWalker::new(Arc::clone(&store));
        Self {
            store,
            walker,
            commission_policy,
            tier_policy,
            store_timeout,
        }
    }

    /// Settles one purchase into commission ledger entries.
    ///
    /// Returns the persisted entries with `replayed = false` on first
    /// settlement, or the previously persisted entries with
    /// `replayed = true` when the reference was settled before. A chain
    /// whose walked layers all lack a configured rate settles to a zero
    /// total without writing anything.
    pub async fn calculate(
        &self,
        purchaser: &UserId,
        purchase_amount: f64,
        reference: &PurchaseReference,
    ) -> Result<CommissionResult, ReferralError> {
        debug!(
            stage = %CalculationStage::Requested,
            purchaser = %purchaser,
            reference = %reference,
            amount = purchase_amount,
            "commission calculation requested"
        );

        // ── Step 1: validate the purchase amount ─────────────────────────
        if !purchase_amount.is_finite() || purchase_amount <= 0.0 {
            debug!(
                stage = %CalculationStage::Rejected,
                reference = %reference,
                "invalid purchase amount"
            );
            return Err(ReferralError::InvalidAmount {
                amount: purchase_amount,
            });
        }

        // ── Step 2: replay check ─────────────────────────────────────────
        // A reference with existing ledger rows was settled before; the
        // stored rows are returned untouched.
        let existing = self
            .store_call(self.store.find_ledger_entries_by_reference(reference))
            .await?;
        if !existing.is_empty() {
            info!(
                reference = %reference,
                entries = existing.len(),
                "purchase reference already settled, replaying"
            );
            return Ok(Self::replay_result(reference.clone(), existing));
        }

        // ── Step 3: registration check ───────────────────────────────────
        let direct = match self
            .store_call(self.store.find_most_recent_verified_referral_for(purchaser))
            .await?
        {
            Some(record) => record,
            None => {
                debug!(
                    stage = %CalculationStage::Rejected,
                    purchaser = %purchaser,
                    "purchaser has no verified referral"
                );
                return Err(ReferralError::NotRegisteredViaReferral {
                    user: purchaser.clone(),
                });
            }
        };
        debug!(
            stage = %CalculationStage::RegistrationChecked,
            purchaser = %purchaser,
            referrer = %direct.referrer_id,
            "registration check passed"
        );

        // ── Step 4: depth from the direct referrer's current tier ────────
        // The tier is re-read on every settlement, so an upgrade or
        // demotion takes effect on the next purchase and never rewrites
        // settled history.
        let tier = self
            .store_call(self.store.find_user_tier(&direct.referrer_id))
            .await?;
        let max_depth = self.tier_policy.depth_for(tier);

        // ── Step 5: walk the referral chain ──────────────────────────────
        let chain = self
            .store_call(self.walker.walk(purchaser, max_depth))
            .await?;
        if chain.is_empty() {
            debug!(
                stage = %CalculationStage::Rejected,
                purchaser = %purchaser,
                "chain walk found no beneficiaries"
            );
            return Err(ReferralError::NoReferralChain {
                user: purchaser.clone(),
            });
        }
        debug!(
            stage = %CalculationStage::ChainWalked,
            reference = %reference,
            depth = chain.len(),
            max_depth,
            "referral chain resolved"
        );

        // ── Step 6: build ledger entries ─────────────────────────────────
        let entries = self.build_entries(&chain, purchase_amount, reference);
        if entries.is_empty() {
            // Every walked layer lacked a configured rate. A policy
            // outcome, not a fault: settle to zero and write nothing.
            info!(
                reference = %reference,
                depth = chain.len(),
                "no payable layers for purchase"
            );
            return Ok(CommissionResult {
                purchase_reference: reference.clone(),
                chain,
                entries: Vec::new(),
                total: 0.0,
                replayed: false,
            });
        }

        // ── Step 7: atomic insert; duplicate conflict resolves to replay ─
        match self
            .store_call(self.store.insert_ledger_entries(&entries))
            .await
        {
            Ok(()) => {}
            Err(StoreError::DuplicateLedgerEntry { .. }) => {
                // Lost a settlement race on this reference. The winner's
                // rows are authoritative.
                warn!(
                    reference = %reference,
                    "concurrent settlement detected, replaying winner"
                );
                let winner = self
                    .store_call(self.store.find_ledger_entries_by_reference(reference))
                    .await?;
                if winner.is_empty() {
                    return Err(ReferralError::StoreUnavailable {
                        reason: format!("conflicting settlement for {reference} disappeared"),
                    });
                }
                return Ok(Self::replay_result(reference.clone(), winner));
            }
            Err(err @ StoreError::PartialLedgerWrite { .. }) => {
                error!(
                    reference = %reference,
                    error = %err,
                    "partial ledger write, manual reconciliation required"
                );
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        }
        debug!(
            stage = %CalculationStage::LedgerWritten,
            reference = %reference,
            entries = entries.len(),
            "ledger entries written"
        );

        let total = entries.iter().map(|e| e.amount).sum();
        info!(
            stage = %CalculationStage::Completed,
            reference = %reference,
            entries = entries.len(),
            total,
            "commission calculation completed"
        );
        Ok(CommissionResult {
            purchase_reference: reference.clone(),
            chain,
            entries,
            total,
            replayed: false,
        })
    }

    /// Builds one ledger entry per payable chain layer.
    fn build_entries(
        &self,
        chain: &ReferralChain,
        purchase_amount: f64,
        reference: &PurchaseReference,
    ) -> Vec<CommissionLedgerEntry> {
        let now = now_millis();
        let mut entries = Vec::with_capacity(chain.len());
        for hop in chain.entries() {
            let rate = match self.commission_policy.rate_for(hop.layer) {
                Some(rate) => rate,
                None => {
                    // Deeper than the rate table reaches; skip, keep walking.
                    warn!(
                        layer = hop.layer,
                        reference = %reference,
                        "no commission rate configured for layer, skipping"
                    );
                    continue;
                }
            };
            entries.push(CommissionLedgerEntry::new(
                LedgerEntryId::new(Uuid::new_v4().to_string()),
                hop.beneficiary.clone(),
                hop.referral_id.clone(),
                hop.layer,
                purchase_amount,
                rate,
                reference.clone(),
                now,
            ));
        }
        entries
    }

    /// Rebuilds a result from previously persisted entries.
    fn replay_result(
        reference: PurchaseReference,
        entries: Vec<CommissionLedgerEntry>,
    ) -> CommissionResult {
        let chain = ReferralChain::from_entries(
            entries
                .iter()
                .map(|e| ChainEntry {
                    beneficiary: e.beneficiary_id.clone(),
                    layer: e.layer,
                    referral_id: e.referral_id.clone(),
                })
                .collect(),
        );
        let total = entries.iter().map(|e| e.amount).sum();
        CommissionResult {
            purchase_reference: reference,
            chain,
            entries,
            total,
            replayed: true,
        }
    }

    /// Bounds one store interaction. An elapsed timeout surfaces as an
    /// unavailable store instead of hanging the settlement.
    async fn store_call<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(format!(
                "store call exceeded {:?}",
                self.store_timeout
            ))),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════

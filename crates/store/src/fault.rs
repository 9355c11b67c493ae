//! # Fault-Injecting Store Decorator
//!
//! Wraps any [`ReferralStore`] and injects scripted failures and delays,
//! per operation, in FIFO order. This is how tests exercise the error
//! paths a healthy in-memory backend can never produce: timeouts,
//! `Unavailable`, and `PartialLedgerWrite`.
//!
//! ## Behavior
//!
//! - `push_failure(op, err)` queues one failure for `op`. The next call to
//!   that operation consumes it and returns the error without reaching the
//!   inner store.
//! - `push_delay(op, d)` queues one delay for `op`. The next call sleeps
//!   for `d` first, then proceeds (and may still hit a queued failure).
//!   Delays let callers race their own timeouts against the store.
//! - With nothing queued, every call passes through unchanged.
//!
//! ## Example
//!
//! ```ignore
//! let store = FaultStore::new(Arc::new(MemoryReferralStore::new()));
//! store.push_failure(StoreOp::InsertLedgerEntries, StoreError::Unavailable("down".into()));
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use refchain_common::ledger::CommissionLedgerEntry;
use refchain_common::referral::ReferralCode;
use refchain_common::status::ReferralStatus;
use refchain_common::types::{PurchaseReference, ReferralCodeValue, UserId, UserTier};

use crate::contract::{CodeStatusUpdate, ReferralStore};
use crate::error::StoreError;

// ════════════════════════════════════════════════════════════════════════════════
// STORE OPERATIONS
// ════════════════════════════════════════════════════════════════════════════════

/// One operation of the [`ReferralStore`] contract, used to address
/// injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    FindCodeByValue,
    FindActiveCodeFor,
    CreateCode,
    ConditionalUpdateCodeStatus,
    FindMostRecentVerifiedReferralFor,
    FindUserTier,
    InsertLedgerEntries,
    FindLedgerEntriesByReference,
    ListLedgerEntriesForUser,
    CountLedgerEntriesForUser,
    SumLedgerAmountsForUser,
    CountCodesForReferrer,
    ListCodesForReferrer,
}

// ════════════════════════════════════════════════════════════════════════════════
// FAULT STORE
// ════════════════════════════════════════════════════════════════════════════════

/// Decorator that injects scripted faults in front of an inner store.
pub struct FaultStore {
    inner: Arc<dyn ReferralStore>,
    /// Queued failures, consumed FIFO per operation.
    failures: Mutex<Vec<(StoreOp, StoreError)>>,
    /// Queued delays, consumed FIFO per operation.
    delays: Mutex<Vec<(StoreOp, Duration)>>,
}

impl FaultStore {
    /// Wraps `inner` with an empty fault script.
    #[must_use]
    pub fn new(inner: Arc<dyn ReferralStore>) -> Self {
        Self {
            inner,
            failures: Mutex::new(Vec::new()),
            delays: Mutex::new(Vec::new()),
        }
    }

    /// Queues one failure for the next call to `op`.
    pub fn push_failure(&self, op: StoreOp, error: StoreError) {
        self.failures.lock().push((op, error));
    }

    /// Queues one delay for the next call to `op`.
    pub fn push_delay(&self, op: StoreOp, delay: Duration) {
        self.delays.lock().push((op, delay));
    }

    /// Number of failures still queued.
    #[must_use]
    pub fn pending_failures(&self) -> usize {
        self.failures.lock().len()
    }

    fn take_failure(&self, op: StoreOp) -> Option<StoreError> {
        let mut queue = self.failures.lock();
        let position = queue.iter().position(|(queued, _)| *queued == op)?;
        Some(queue.remove(position).1)
    }

    fn take_delay(&self, op: StoreOp) -> Option<Duration> {
        let mut queue = self.delays.lock();
        let position = queue.iter().position(|(queued, _)| *queued == op)?;
        Some(queue.remove(position).1)
    }

    async fn intercept(&self, op: StoreOp) -> Result<(), StoreError> {
        if let Some(delay) = self.take_delay(op) {
            tokio::time::sleep(delay).await;
        }
        match self.take_failure(op) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ReferralStore for FaultStore {
    async fn find_code_by_value(
        &self,
        value: &ReferralCodeValue,
    ) -> Result<Option<ReferralCode>, StoreError> {
        self.intercept(StoreOp::FindCodeByValue).await?;
        self.inner.find_code_by_value(value).await
    }

    async fn find_active_code_for(
        &self,
        referrer: &UserId,
    ) -> Result<Option<ReferralCode>, StoreError> {
        self.intercept(StoreOp::FindActiveCodeFor).await?;
        self.inner.find_active_code_for(referrer).await
    }

    async fn create_code(
        &self,
        referrer: &UserId,
        value: ReferralCodeValue,
    ) -> Result<ReferralCode, StoreError> {
        self.intercept(StoreOp::CreateCode).await?;
        self.inner.create_code(referrer, value).await
    }

    async fn conditional_update_code_status(
        &self,
        value: &ReferralCodeValue,
        expected: ReferralStatus,
        new_status: ReferralStatus,
        fields: CodeStatusUpdate,
    ) -> Result<ReferralCode, StoreError> {
        self.intercept(StoreOp::ConditionalUpdateCodeStatus).await?;
        self.inner
            .conditional_update_code_status(value, expected, new_status, fields)
            .await
    }

    async fn find_most_recent_verified_referral_for(
        &self,
        user: &UserId,
    ) -> Result<Option<ReferralCode>, StoreError> {
        self.intercept(StoreOp::FindMostRecentVerifiedReferralFor)
            .await?;
        self.inner.find_most_recent_verified_referral_for(user).await
    }

    async fn find_user_tier(&self, user: &UserId) -> Result<Option<UserTier>, StoreError> {
        self.intercept(StoreOp::FindUserTier).await?;
        self.inner.find_user_tier(user).await
    }

    async fn insert_ledger_entries(
        &self,
        entries: &[CommissionLedgerEntry],
    ) -> Result<(), StoreError> {
        self.intercept(StoreOp::InsertLedgerEntries).await?;
        self.inner.insert_ledger_entries(entries).await
    }

    async fn find_ledger_entries_by_reference(
        &self,
        reference: &PurchaseReference,
    ) -> Result<Vec<CommissionLedgerEntry>, StoreError> {
        self.intercept(StoreOp::FindLedgerEntriesByReference).await?;
        self.inner.find_ledger_entries_by_reference(reference).await
    }

    async fn list_ledger_entries_for_user(
        &self,
        user: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CommissionLedgerEntry>, StoreError> {
        self.intercept(StoreOp::ListLedgerEntriesForUser).await?;
        self.inner
            .list_ledger_entries_for_user(user, limit, offset)
            .await
    }

    async fn count_ledger_entries_for_user(&self, user: &UserId) -> Result<u64, StoreError> {
        self.intercept(StoreOp::CountLedgerEntriesForUser).await?;
        self.inner.count_ledger_entries_for_user(user).await
    }

    async fn sum_ledger_amounts_for_user(&self, user: &UserId) -> Result<f64, StoreError> {
        self.intercept(StoreOp::SumLedgerAmountsForUser).await?;
        self.inner.sum_ledger_amounts_for_user(user).await
    }

    async fn count_codes_for_referrer(
        &self,
        referrer: &UserId,
        status: Option<ReferralStatus>,
    ) -> Result<u64, StoreError> {
        self.intercept(StoreOp::CountCodesForReferrer).await?;
        self.inner.count_codes_for_referrer(referrer, status).await
    }

    async fn list_codes_for_referrer(
        &self,
        referrer: &UserId,
    ) -> Result<Vec<ReferralCode>, StoreError> {
        self.intercept(StoreOp::ListCodesForReferrer).await?;
        self.inner.list_codes_for_referrer(referrer).await
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// COMPILE-TIME ASSERTIONS
// ════════════════════════════════════════════════════════════════════════════════

const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check() {
        assert_send_sync::<FaultStore>();
    }
    let _ = check;
};

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════

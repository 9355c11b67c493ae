//! # In-Memory Referral Store
//!
//! Fully in-memory [`ReferralStore`] backend. Used as the reference
//! implementation of the contract and as the default backend in tests.
//!
//! ## Features
//!
//! - Deterministic behavior for reproducible tests
//! - Single-writer critical sections; CAS and uniqueness checks hold the
//!   write lock across check and mutation
//! - Seed helpers for injecting users and pre-built code records
//!
//! ## Consistency Model
//!
//! One `parking_lot::RwLock` guards all tables. That makes every contract
//! operation atomic with respect to every other, which is exactly the
//! guarantee a relational backend provides through constraints and
//! transactions. Creation order is tracked with a sequence number so
//! recency tie-breaks do not depend on clock resolution.
//!
//! ## Example
//!
//! ```ignore
//! let store = MemoryReferralStore::new();
//! let code = store.create_code(&UserId::new("alice"), value).await?;
//! let found = store.find_code_by_value(&code.code).await?;
//! ```

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use refchain_common::ledger::CommissionLedgerEntry;
use refchain_common::referral::ReferralCode;
use refchain_common::status::ReferralStatus;
use refchain_common::types::{
    now_millis, PurchaseReference, ReferralCodeValue, ReferralId, User, UserId, UserTier,
};

use crate::contract::{CodeStatusUpdate, ReferralStore};
use crate::error::StoreError;

// ════════════════════════════════════════════════════════════════════════════════
// TABLES
// ════════════════════════════════════════════════════════════════════════════════

/// A code record plus its insertion sequence number.
#[derive(Debug, Clone)]
struct StoredCode {
    record: ReferralCode,
    /// Monotonic insertion order, used to break `created_at` ties.
    seq: u64,
}

/// All tables behind one lock.
#[derive(Debug, Default)]
struct MemoryTables {
    /// Code records keyed by their unique token value.
    codes: HashMap<ReferralCodeValue, StoredCode>,
    /// Ledger entries in insertion order.
    ledger: Vec<CommissionLedgerEntry>,
    /// Uniqueness index over (purchase reference, layer).
    ledger_keys: HashSet<(PurchaseReference, u32)>,
    /// Known users, for tier lookups.
    users: HashMap<UserId, User>,
    /// Next insertion sequence number.
    next_seq: u64,
}

impl MemoryTables {
    fn active_code_for(&self, referrer: &UserId) -> Option<ReferralCode> {
        self.codes
            .values()
            .filter(|s| s.record.status.is_active() && s.record.owned_by(referrer))
            .max_by_key(|s| s.seq)
            .map(|s| s.record.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// MEMORY REFERRAL STORE
// ════════════════════════════════════════════════════════════════════════════════

/// In-memory [`ReferralStore`] implementation.
pub struct MemoryReferralStore {
    tables: RwLock<MemoryTables>,
}

impl std::fmt::Debug for MemoryReferralStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.read();
        f.debug_struct("MemoryReferralStore")
            .field("codes", &tables.codes.len())
            .field("ledger_entries", &tables.ledger.len())
            .field("users", &tables.users.len())
            .finish()
    }
}

impl Default for MemoryReferralStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryReferralStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(MemoryTables::default()),
        }
    }

    // ────────────────────────────────────────────────────────────────────────────
    // SEED HELPERS
    // ────────────────────────────────────────────────────────────────────────────

    /// Inserts or replaces a user record.
    pub fn upsert_user(&self, user: User) {
        let mut tables = self.tables.write();
        tables.users.insert(user.id.clone(), user);
    }

    /// Inserts a pre-built code record verbatim, bypassing the single-active
    /// constraint. Intended for seeding historical state in tests.
    pub fn seed_code(&self, record: ReferralCode) {
        let mut tables = self.tables.write();
        let seq = tables.next_seq;
        tables.next_seq += 1;
        let value = record.code.clone();
        tables.codes.insert(value, StoredCode { record, seq });
    }

    /// Number of code records currently stored.
    #[must_use]
    pub fn code_count(&self) -> usize {
        self.tables.read().codes.len()
    }

    /// Number of ledger entries currently stored.
    #[must_use]
    pub fn ledger_count(&self) -> usize {
        self.tables.read().ledger.len()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// CONTRACT IMPLEMENTATION
// ════════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl ReferralStore for MemoryReferralStore {
    async fn find_code_by_value(
        &self,
        value: &ReferralCodeValue,
    ) -> Result<Option<ReferralCode>, StoreError> {
        let tables = self.tables.read();
        Ok(tables.codes.get(value).map(|s| s.record.clone()))
    }

    async fn find_active_code_for(
        &self,
        referrer: &UserId,
    ) -> Result<Option<ReferralCode>, StoreError> {
        let tables = self.tables.read();
        Ok(tables.active_code_for(referrer))
    }

    async fn create_code(
        &self,
        referrer: &UserId,
        value: ReferralCodeValue,
    ) -> Result<ReferralCode, StoreError> {
        let mut tables = self.tables.write();

        // Uniqueness constraint: at most one active code per referrer.
        if let Some(existing) = tables.active_code_for(referrer) {
            return Err(StoreError::ActiveCodeExists {
                referrer: referrer.clone(),
                existing,
            });
        }
        if tables.codes.contains_key(&value) {
            return Err(StoreError::DuplicateCodeValue { value });
        }

        let record = ReferralCode::new(
            ReferralId::new(Uuid::new_v4().to_string()),
            value.clone(),
            referrer.clone(),
            now_millis(),
        );
        let seq = tables.next_seq;
        tables.next_seq += 1;
        tables.codes.insert(
            value,
            StoredCode {
                record: record.clone(),
                seq,
            },
        );
        debug!(code = %record.code, referrer = %referrer, "referral code created");
        Ok(record)
    }

    async fn conditional_update_code_status(
        &self,
        value: &ReferralCodeValue,
        expected: ReferralStatus,
        new_status: ReferralStatus,
        fields: CodeStatusUpdate,
    ) -> Result<ReferralCode, StoreError> {
        let mut tables = self.tables.write();
        let stored = tables
            .codes
            .get_mut(value)
            .ok_or_else(|| StoreError::CodeNotFound {
                code: value.clone(),
            })?;

        let found = stored.record.status;
        if found != expected {
            debug!(
                code = %value,
                expected = %expected,
                found = %found,
                "conditional status update lost the race"
            );
            return Err(StoreError::PreconditionFailed {
                code: value.clone(),
                expected,
                found,
            });
        }

        let next = found.transition_to(new_status)?;
        stored.record.status = next;
        if let Some(referred) = fields.referred_id {
            stored.record.referred_id = Some(referred);
        }
        stored.record.updated_at = now_millis();
        Ok(stored.record.clone())
    }

    async fn find_most_recent_verified_referral_for(
        &self,
        user: &UserId,
    ) -> Result<Option<ReferralCode>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .codes
            .values()
            .filter(|s| s.record.verified_by(user))
            .max_by_key(|s| (s.record.created_at, s.seq))
            .map(|s| s.record.clone()))
    }

    async fn find_user_tier(&self, user: &UserId) -> Result<Option<UserTier>, StoreError> {
        let tables = self.tables.read();
        Ok(tables.users.get(user).and_then(|u| u.tier))
    }

    async fn insert_ledger_entries(
        &self,
        entries: &[CommissionLedgerEntry],
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut tables = self.tables.write();

        // Validate the whole batch before touching any table, so a
        // rejection leaves nothing behind.
        let mut pending: HashSet<(PurchaseReference, u32)> = HashSet::new();
        for entry in entries {
            let key = (entry.purchase_reference.clone(), entry.layer);
            if tables.ledger_keys.contains(&key) || !pending.insert(key) {
                warn!(
                    reference = %entry.purchase_reference,
                    layer = entry.layer,
                    "duplicate ledger entry; rejecting batch"
                );
                return Err(StoreError::DuplicateLedgerEntry {
                    reference: entry.purchase_reference.clone(),
                    layer: entry.layer,
                });
            }
        }

        for entry in entries {
            tables
                .ledger_keys
                .insert((entry.purchase_reference.clone(), entry.layer));
            tables.ledger.push(entry.clone());
        }
        Ok(())
    }

    async fn find_ledger_entries_by_reference(
        &self,
        reference: &PurchaseReference,
    ) -> Result<Vec<CommissionLedgerEntry>, StoreError> {
        let tables = self.tables.read();
        let mut entries: Vec<CommissionLedgerEntry> = tables
            .ledger
            .iter()
            .filter(|e| &e.purchase_reference == reference)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.layer);
        Ok(entries)
    }

    async fn list_ledger_entries_for_user(
        &self,
        user: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CommissionLedgerEntry>, StoreError> {
        let tables = self.tables.read();
        let mut indexed: Vec<(usize, CommissionLedgerEntry)> = tables
            .ledger
            .iter()
            .enumerate()
            .filter(|(_, e)| &e.beneficiary_id == user)
            .map(|(i, e)| (i, e.clone()))
            .collect();
        // Newest first; insertion order breaks created_at ties.
        indexed.sort_by(|a, b| (b.1.created_at, b.0).cmp(&(a.1.created_at, a.0)));
        Ok(indexed
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, e)| e)
            .collect())
    }

    async fn count_ledger_entries_for_user(&self, user: &UserId) -> Result<u64, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .ledger
            .iter()
            .filter(|e| &e.beneficiary_id == user)
            .count() as u64)
    }

    async fn sum_ledger_amounts_for_user(&self, user: &UserId) -> Result<f64, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .ledger
            .iter()
            .filter(|e| &e.beneficiary_id == user)
            .map(|e| e.amount)
            .sum())
    }

    async fn count_codes_for_referrer(
        &self,
        referrer: &UserId,
        status: Option<ReferralStatus>,
    ) -> Result<u64, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .codes
            .values()
            .filter(|s| s.record.owned_by(referrer))
            .filter(|s| status.map_or(true, |wanted| s.record.status == wanted))
            .count() as u64)
    }

    async fn list_codes_for_referrer(
        &self,
        referrer: &UserId,
    ) -> Result<Vec<ReferralCode>, StoreError> {
        let tables = self.tables.read();
        let mut stored: Vec<(u64, ReferralCode)> = tables
            .codes
            .values()
            .filter(|s| s.record.owned_by(referrer))
            .map(|s| (s.seq, s.record.clone()))
            .collect();
        stored.sort_by(|a, b| (b.1.created_at, b.0).cmp(&(a.1.created_at, a.0)));
        Ok(stored.into_iter().map(|(_, record)| record).collect())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// COMPILE-TIME ASSERTIONS
// ════════════════════════════════════════════════════════════════════════════════

const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check() {
        assert_send_sync::<MemoryReferralStore>();
    }
    let _ = check;
};

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════

//! # Referral Service
//!
//! The caller-facing surface of the referral core. Ties together code
//! issuance, the signup state machine, commission settlement, and the
//! read-side stats queries.
//!
//! ## Lifecycle
//!
//! ```text
//! issue link ──> active ──verify──> verified ──purchase──> commissions
//!                  │                   │
//!                  ├──use──> used      └─ side effects: notify + fresh link
//!                  └──guard──> invalid
//! ```
//!
//! Side effects of verification (notification delivery and the referrer's
//! link refresh) are insulated: their failure is logged and never rolls
//! back or fails the verification that triggered them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use refchain_common::error::ReferralError;
use refchain_common::ledger::{CommissionLedgerEntry, CommissionResult};
use refchain_common::policy::{CommissionPolicy, TierDepthPolicy};
use refchain_common::referral::ReferralCode;
use refchain_common::stats::{CommissionStats, ReferralStats};
use refchain_common::status::ReferralStatus;
use refchain_common::types::{PurchaseReference, ReferralCodeValue, UserId};
use refchain_store::{CodeStatusUpdate, ReferralStore, StoreError};

use crate::calculator::CommissionCalculator;
use crate::generator::CodeGenerator;
use crate::notify::{LogNotifier, ReferralNotifier};

/// Default bound on any single store interaction.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default base for shareable referral URLs.
pub const DEFAULT_LINK_BASE_URL: &str = "https://site.com";

// ════════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ════════════════════════════════════════════════════════════════════════════════

/// Runtime configuration of the referral service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralServiceConfig {
    /// Bound on each store call; an elapsed timeout surfaces as
    /// `StoreUnavailable`.
    pub store_timeout: Duration,
    /// Base URL that referral codes are appended to when rendered as a
    /// shareable link.
    pub link_base_url: String,
}

impl Default for ReferralServiceConfig {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
            link_base_url: DEFAULT_LINK_BASE_URL.to_string(),
        }
    }
}

impl ReferralServiceConfig {
    /// Validasi konfigurasi; mengembalikan pesan kesalahan pertama yang
    /// ditemukan.
    pub fn validate(&self) -> Result<(), String> {
        if self.store_timeout.is_zero() {
            return Err("store_timeout must be non-zero".to_string());
        }
        if self.link_base_url.trim().is_empty() {
            return Err("link_base_url must not be empty".to_string());
        }
        if !self.link_base_url.starts_with("http://")
            && !self.link_base_url.starts_with("https://")
        {
            return Err(format!(
                "link_base_url must be an http(s) URL: {}",
                self.link_base_url
            ));
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// REFERRAL LINK
// ════════════════════════════════════════════════════════════════════════════════

/// An issued code together with its shareable URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralLink {
    /// The backing code record.
    pub record: ReferralCode,
    /// Fully rendered URL, `{base}/referral/{code}`.
    pub url: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// REFERRAL SERVICE
// ════════════════════════════════════════════════════════════════════════════════

/// Caller-facing referral operations over a store, a code generator, a
/// notification hook, and the commission calculator.
pub struct ReferralService {
    store: Arc<dyn ReferralStore>,
    generator: CodeGenerator,
    notifier: Arc<dyn ReferralNotifier>,
    calculator: CommissionCalculator,
    config: ReferralServiceConfig,
}

impl ReferralService {
    /// Creates a service with default policies and log-only notifications.
    #[must_use]
    pub fn new(store: Arc<dyn ReferralStore>, config: ReferralServiceConfig) -> Self {
        Self::with_parts(
            store,
            Arc::new(LogNotifier),
            CommissionPolicy::default(),
            TierDepthPolicy::default(),
            config,
        )
    }

    /// Creates a fully wired service.
    #[must_use]
    pub fn with_parts(
        store: Arc<dyn ReferralStore>,
        notifier: Arc<dyn ReferralNotifier>,
        commission_policy: CommissionPolicy,
        tier_policy: TierDepthPolicy,
        config: ReferralServiceConfig,
    ) -> Self {
        let calculator = CommissionCalculator::new(
            Arc::clone(&store),
            commission_policy,
            tier_policy,
            config.store_timeout,
        );
        Self {
            store,
            generator: CodeGenerator::new(),
            notifier,
            calculator,
            config,
        }
    }

    // ────────────────────────────────────────────────────────────────────────────
    // LINK ISSUANCE
    // ────────────────────────────────────────────────────────────────────────────

    /// Returns the owner's current active link, creating one if none
    /// exists.
    ///
    /// Issuance is idempotent: repeated calls without an intervening
    /// consumption return the identical code. When two calls race, the
    /// store admits one new active code and the loser returns the
    /// winner's record.
    pub async fn generate_or_return_active_link(
        &self,
        owner: &UserId,
    ) -> Result<ReferralLink, ReferralError> {
        if let Some(existing) = self
            .store_call(self.store.find_active_code_for(owner))
            .await?
        {
            debug!(owner = %owner, code = %existing.code, "returning existing active link");
            return Ok(self.link_for(existing));
        }

        let value = self
            .store_call(self.generator.generate_unique(self.store.as_ref(), owner))
            .await?;
        match self.store_call(self.store.create_code(owner, value)).await {
            Ok(record) => {
                info!(owner = %owner, code = %record.code, "issued referral link");
                Ok(self.link_for(record))
            }
            Err(StoreError::ActiveCodeExists { existing, .. }) => {
                // Lost an issuance race; the winner's code serves both.
                debug!(owner = %owner, code = %existing.code, "issuance race lost, returning winner");
                Ok(self.link_for(existing))
            }
            Err(err) => Err(err.into()),
        }
    }

    // ────────────────────────────────────────────────────────────────────────────
    // STATE MACHINE
    // ────────────────────────────────────────────────────────────────────────────

    /// Checks that a code exists and is still consumable.
    pub async fn validate_code(
        &self,
        code: &ReferralCodeValue,
    ) -> Result<ReferralCode, ReferralError> {
        let record = match self.store_call(self.store.find_code_by_value(code)).await? {
            Some(record) => record,
            None => return Err(ReferralError::NotFound { code: code.clone() }),
        };
        if record.status.is_terminal() {
            return Err(ReferralError::AlreadyConsumed {
                code: code.clone(),
                status: record.status,
            });
        }
        Ok(record)
    }

    /// Consumes a code for a completed signup, moving it `active ->
    /// verified`.
    ///
    /// Repeating the call with the same code and user after success is
    /// tolerated and returns the verified record unchanged. Notification
    /// delivery and the referrer's link refresh run as insulated side
    /// effects after the state change commits.
    pub async fn verify_signup(
        &self,
        code: &ReferralCodeValue,
        new_user: &UserId,
    ) -> Result<ReferralCode, ReferralError> {
        // ── Step 1: load and screen the record ───────────────────────────
        let record = match self.store_call(self.store.find_code_by_value(code)).await? {
            Some(record) => record,
            None => return Err(ReferralError::NotFound { code: code.clone() }),
        };
        if record.status.is_verified() {
            // Repeated completion calls for the same pair are tolerated.
            return if record.verified_by(new_user) {
                debug!(code = %code, user = %new_user, "duplicate verification tolerated");
                Ok(record)
            } else {
                Err(ReferralError::AlreadyConsumed {
                    code: code.clone(),
                    status: record.status,
                })
            };
        }
        if record.status.is_terminal() {
            return Err(ReferralError::AlreadyConsumed {
                code: code.clone(),
                status: record.status,
            });
        }
        if record.owned_by(new_user) {
            warn!(code = %code, user = %new_user, "self-referral rejected");
            return Err(ReferralError::SelfReferral {
                code: code.clone(),
                user: new_user.clone(),
            });
        }

        // ── Step 2: consume the code atomically ──────────────────────────
        let updated = match self
            .store_call(self.store.conditional_update_code_status(
                code,
                ReferralStatus::Active,
                ReferralStatus::Verified,
                CodeStatusUpdate::with_referred(new_user.clone()),
            ))
            .await
        {
            Ok(updated) => updated,
            Err(StoreError::PreconditionFailed { found, .. }) => {
                // Lost a verification race. A winner that verified the
                // same user still counts as the tolerated duplicate;
                // anyone else consumed the code first.
                let current = self.store_call(self.store.find_code_by_value(code)).await?;
                return match current {
                    Some(current) if current.verified_by(new_user) => {
                        debug!(code = %code, user = %new_user, "concurrent duplicate verification tolerated");
                        Ok(current)
                    }
                    _ => Err(ReferralError::AlreadyConsumed {
                        code: code.clone(),
                        status: found,
                    }),
                };
            }
            Err(err) => return Err(err.into()),
        };
        info!(
            code = %code,
            referrer = %updated.referrer_id,
            referred = %new_user,
            "referral verified"
        );

        // ── Step 3: insulated side effects ───────────────────────────────
        if let Err(err) = self
            .notifier
            .on_referral_verified(&updated.referrer_id, new_user, code)
        {
            warn!(code = %code, error = %err, "verification notification failed");
        }
        if let Err(err) = self
            .generate_or_return_active_link(&updated.referrer_id)
            .await
        {
            warn!(
                referrer = %updated.referrer_id,
                error = %err,
                "referrer link refresh failed"
            );
        }

        Ok(updated)
    }

    /// Consumes a code without the full verification flow, moving it
    /// `active -> used`.
    pub async fn mark_code_used(
        &self,
        code: &ReferralCodeValue,
        user: &UserId,
    ) -> Result<ReferralCode, ReferralError> {
        let record = match self.store_call(self.store.find_code_by_value(code)).await? {
            Some(record) => record,
            None => return Err(ReferralError::NotFound { code: code.clone() }),
        };
        if record.status.is_terminal() {
            return Err(ReferralError::AlreadyConsumed {
                code: code.clone(),
                status: record.status,
            });
        }
        if record.owned_by(user) {
            warn!(code = %code, user = %user, "self-referral rejected");
            return Err(ReferralError::SelfReferral {
                code: code.clone(),
                user: user.clone(),
            });
        }
        let updated = self
            .store_call(self.store.conditional_update_code_status(
                code,
                ReferralStatus::Active,
                ReferralStatus::Used,
                CodeStatusUpdate::with_referred(user.clone()),
            ))
            .await?;
        info!(code = %code, user = %user, "referral code marked used");
        Ok(updated)
    }

    /// Retires a code that must no longer be consumable, moving it
    /// `active -> invalid`.
    ///
    /// A guarded path for signup attempts against codes that should not
    /// accept them. `attempted_user`, when known, is recorded on the
    /// retired code for audit.
    pub async fn invalidate_code(
        &self,
        code: &ReferralCodeValue,
        attempted_user: Option<&UserId>,
        reason: &str,
    ) -> Result<ReferralCode, ReferralError> {
        let record = match self.store_call(self.store.find_code_by_value(code)).await? {
            Some(record) => record,
            None => return Err(ReferralError::NotFound { code: code.clone() }),
        };
        if record.status.is_terminal() {
            return Err(ReferralError::AlreadyConsumed {
                code: code.clone(),
                status: record.status,
            });
        }
        let fields = match attempted_user {
            Some(user) => CodeStatusUpdate::with_referred(user.clone()),
            None => CodeStatusUpdate::none(),
        };
        let updated = self
            .store_call(self.store.conditional_update_code_status(
                code,
                ReferralStatus::Active,
                ReferralStatus::Invalid,
                fields,
            ))
            .await?;
        warn!(code = %code, reason, "referral code invalidated");
        if let Err(err) = self
            .notifier
            .on_invalid_referral(&updated.referrer_id, code, reason)
        {
            warn!(code = %code, error = %err, "invalidation notification failed");
        }
        Ok(updated)
    }

    // ────────────────────────────────────────────────────────────────────────────
    // COMMISSIONS
    // ────────────────────────────────────────────────────────────────────────────

    /// Settles a purchase into per-layer commissions. See
    /// [`CommissionCalculator::calculate`].
    pub async fn calculate_commissions(
        &self,
        purchaser: &UserId,
        purchase_amount: f64,
        reference: &PurchaseReference,
    ) -> Result<CommissionResult, ReferralError> {
        self.calculator
            .calculate(purchaser, purchase_amount, reference)
            .await
    }

    /// Whether the user completed signup through a referral.
    pub async fn has_completed_registration(
        &self,
        user: &UserId,
    ) -> Result<bool, ReferralError> {
        let record = self
            .store_call(self.store.find_most_recent_verified_referral_for(user))
            .await?;
        Ok(record.is_some())
    }

    // ────────────────────────────────────────────────────────────────────────────
    // READ SIDE
    // ────────────────────────────────────────────────────────────────────────────

    /// Referral code counts for one referrer.
    pub async fn referral_stats(
        &self,
        referrer: &UserId,
    ) -> Result<ReferralStats, ReferralError> {
        let total = self
            .store_call(self.store.count_codes_for_referrer(referrer, None))
            .await?;
        let verified = self
            .store_call(
                self.store
                    .count_codes_for_referrer(referrer, Some(ReferralStatus::Verified)),
            )
            .await?;
        let pending = self
            .store_call(
                self.store
                    .count_codes_for_referrer(referrer, Some(ReferralStatus::Active)),
            )
            .await?;
        Ok(ReferralStats {
            total,
            verified,
            pending,
        })
    }

    /// Lifetime commission totals for one beneficiary.
    pub async fn commission_stats(
        &self,
        user: &UserId,
    ) -> Result<CommissionStats, ReferralError> {
        let total_earned = self
            .store_call(self.store.sum_ledger_amounts_for_user(user))
            .await?;
        let entry_count = self
            .store_call(self.store.count_ledger_entries_for_user(user))
            .await?;
        Ok(CommissionStats {
            total_earned,
            entry_count,
        })
    }

    /// Commission history for one beneficiary, newest first.
    pub async fn list_commissions(
        &self,
        user: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CommissionLedgerEntry>, ReferralError> {
        let entries = self
            .store_call(self.store.list_ledger_entries_for_user(user, limit, offset))
            .await?;
        Ok(entries)
    }

    /// All codes issued by one referrer, newest first.
    pub async fn list_referrals(
        &self,
        referrer: &UserId,
    ) -> Result<Vec<ReferralCode>, ReferralError> {
        let codes = self
            .store_call(self.store.list_codes_for_referrer(referrer))
            .await?;
        Ok(codes)
    }

    /// Renders the shareable URL for a code value using the configured
    /// base URL. Pure formatting; does not check that the code exists.
    #[must_use]
    pub fn link_url(&self, code: &ReferralCodeValue) -> String {
        format!(
            "{}/referral/{}",
            self.config.link_base_url.trim_end_matches('/'),
            code
        )
    }

    // ────────────────────────────────────────────────────────────────────────────
    // INTERNALS
    // ────────────────────────────────────────────────────────────────────────────

    fn link_for(&self, record: ReferralCode) -> ReferralLink {
        let url = self.link_url(&record.code);
        ReferralLink { record, url }
    }

    /// Bounds one store interaction. An elapsed timeout surfaces as an
    /// unavailable store instead of hanging the caller.
    async fn store_call<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.config.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(format!(
                "store call exceeded {:?}",
                self.config.store_timeout
            ))),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    use refchain_common::types::{ReferralId, User, UserTier};
    use refchain_store::{FaultStore, MemoryReferralStore, StoreOp};

    use crate::notify::{NotifyEvent, RecordingNotifier};

    // ── Helpers ──────────────────────────────────────────────────────────

    fn service(store: Arc<dyn ReferralStore>) -> ReferralService {
        ReferralService::new(store, ReferralServiceConfig::default())
    }

    fn service_with_notifier(
        store: Arc<dyn ReferralStore>,
        notifier: Arc<dyn ReferralNotifier>,
    ) -> ReferralService {
        ReferralService::with_parts(
            store,
            notifier,
            CommissionPolicy::default(),
            TierDepthPolicy::default(),
            ReferralServiceConfig::default(),
        )
    }

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    fn seed_verified(
        store: &MemoryReferralStore,
        id: &str,
        referrer: &str,
        referred: &str,
        created_at: u64,
    ) {
        let mut record = ReferralCode::new(
            ReferralId::new(id),
            ReferralCodeValue::new(format!("CODE-{id}")),
            UserId::new(referrer),
            created_at,
        );
        record.status = ReferralStatus::Verified;
        record.referred_id = Some(UserId::new(referred));
        store.seed_code(record);
    }

    async fn issue(service: &ReferralService, owner: &str) -> ReferralCode {
        service
            .generate_or_return_active_link(&user(owner))
            .await
            .expect("issue link")
            .record
    }

    // ────────────────────────────────────────────────────────────────────────────
    // CONFIGURATION
    // ────────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_config_defaults() {
        let config = ReferralServiceConfig::default();
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.link_base_url, "https://site.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        let config = ReferralServiceConfig {
            store_timeout: Duration::ZERO,
            ..ReferralServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_bad_base_url() {
        let empty = ReferralServiceConfig {
            link_base_url: "  ".to_string(),
            ..ReferralServiceConfig::default()
        };
        assert!(empty.validate().is_err());

        let scheme = ReferralServiceConfig {
            link_base_url: "ftp://site.com".to_string(),
            ..ReferralServiceConfig::default()
        };
        assert!(scheme.validate().is_err());
    }

    // ────────────────────────────────────────────────────────────────────────────
    // LINK ISSUANCE
    // ────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_issue_creates_active_link() {
        let store = Arc::new(MemoryReferralStore::new());
        let svc = service(store.clone());

        let link = svc
            .generate_or_return_active_link(&user("alice"))
            .await
            .expect("issue");

        assert!(link.record.status.is_active());
        assert_eq!(link.record.referrer_id, user("alice"));
        assert!(link.record.referred_id.is_none());
        assert_eq!(
            link.url,
            format!("https://site.com/referral/{}", link.record.code)
        );
        assert_eq!(store.code_count(), 1);
    }

    #[tokio::test]
    async fn test_issue_is_idempotent() {
        let store = Arc::new(MemoryReferralStore::new());
        let svc = service(store.clone());

        let first = svc
            .generate_or_return_active_link(&user("alice"))
            .await
            .expect("first");
        let second = svc
            .generate_or_return_active_link(&user("alice"))
            .await
            .expect("second");

        assert_eq!(first.record.code, second.record.code);
        assert_eq!(first.url, second.url);
        assert_eq!(store.code_count(), 1);
    }

    #[tokio::test]
    async fn test_issue_trims_trailing_slash_in_base_url() {
        let store = Arc::new(MemoryReferralStore::new());
        let config = ReferralServiceConfig {
            link_base_url: "https://ref.example.io/".to_string(),
            ..ReferralServiceConfig::default()
        };
        let svc = ReferralService::new(store, config);

        let link = svc
            .generate_or_return_active_link(&user("alice"))
            .await
            .expect("issue");
        assert!(link
            .url
            .starts_with("https://ref.example.io/referral/"));
        assert!(!link.url.contains("//referral"));
    }

    #[tokio::test]
    async fn test_link_url_formats_arbitrary_code() {
        let svc = service(Arc::new(MemoryReferralStore::new()));
        let url = svc.link_url(&ReferralCodeValue::new("ABC123XYZ0"));
        assert_eq!(url, "https://site.com/referral/ABC123XYZ0");
    }

    // ────────────────────────────────────────────────────────────────────────────
    // CODE VALIDATION
    // ────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_validate_unknown_code() {
        let svc = service(Arc::new(MemoryReferralStore::new()));
        let err = svc
            .validate_code(&ReferralCodeValue::new("NOPE"))
            .await
            .expect_err("unknown");
        assert_eq!(
            err,
            ReferralError::NotFound {
                code: ReferralCodeValue::new("NOPE"),
            }
        );
    }

    #[tokio::test]
    async fn test_validate_active_code_passes() {
        let store = Arc::new(MemoryReferralStore::new());
        let svc = service(store);
        let record = issue(&svc, "alice").await;

        let validated = svc.validate_code(&record.code).await.expect("active");
        assert_eq!(validated.code, record.code);
    }

    #[tokio::test]
    async fn test_validate_consumed_code_fails() {
        let store = Arc::new(MemoryReferralStore::new());
        let svc = service(store);
        let record = issue(&svc, "alice").await;
        svc.verify_signup(&record.code, &user("bob"))
            .await
            .expect("verify");

        let err = svc
            .validate_code(&record.code)
            .await
            .expect_err("consumed");
        assert_eq!(
            err,
            ReferralError::AlreadyConsumed {
                code: record.code,
                status: ReferralStatus::Verified,
            }
        );
    }

    // ────────────────────────────────────────────────────────────────────────────
    // SIGNUP VERIFICATION
    // ────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_verify_happy_path() {
        let store = Arc::new(MemoryReferralStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let svc = service_with_notifier(store.clone(), notifier.clone());
        let record = issue(&svc, "alice").await;

        let verified = svc
            .verify_signup(&record.code, &user("bob"))
            .await
            .expect("verify");

        assert!(verified.status.is_verified());
        assert_eq!(verified.referred_id, Some(user("bob")));
        assert!(verified.updated_at >= verified.created_at);

        assert_eq!(
            notifier.events(),
            vec![NotifyEvent::Verified {
                referrer: user("alice"),
                referred: user("bob"),
                code: record.code,
            }]
        );
    }

    #[tokio::test]
    async fn test_verify_refreshes_referrer_link() {
        let store = Arc::new(MemoryReferralStore::new());
        let svc = service(store.clone());
        let record = issue(&svc, "alice").await;

        svc.verify_signup(&record.code, &user("bob"))
            .await
            .expect("verify");

        // A fresh active code was issued alongside the consumed one.
        let stats = svc.referral_stats(&user("alice")).await.expect("stats");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.verified, 1);
        assert_eq!(stats.pending, 1);

        let fresh = svc
            .generate_or_return_active_link(&user("alice"))
            .await
            .expect("fresh link");
        assert_ne!(fresh.record.code, record.code);
        assert!(fresh.record.status.is_active());
    }

    #[tokio::test]
    async fn test_verify_unknown_code() {
        let svc = service(Arc::new(MemoryReferralStore::new()));
        let err = svc
            .verify_signup(&ReferralCodeValue::new("NOPE"), &user("bob"))
            .await
            .expect_err("unknown");
        assert!(matches!(err, ReferralError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_verify_rejects_self_referral_and_keeps_code_active() {
        let store = Arc::new(MemoryReferralStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let svc = service_with_notifier(store, notifier.clone());
        let record = issue(&svc, "alice").await;

        let err = svc
            .verify_signup(&record.code, &user("alice"))
            .await
            .expect_err("self-referral");
        assert_eq!(
            err,
            ReferralError::SelfReferral {
                code: record.code.clone(),
                user: user("alice"),
            }
        );

        // The rejection does not consume the code.
        let still = svc.validate_code(&record.code).await.expect("still active");
        assert!(still.status.is_active());
        assert_eq!(notifier.event_count(), 0);
    }

    #[tokio::test]
    async fn test_verify_same_pair_twice_is_idempotent() {
        let store = Arc::new(MemoryReferralStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let svc = service_with_notifier(store.clone(), notifier.clone());
        let record = issue(&svc, "alice").await;

        let first = svc
            .verify_signup(&record.code, &user("bob"))
            .await
            .expect("first verify");
        let second = svc
            .verify_signup(&record.code, &user("bob"))
            .await
            .expect("repeat verify");

        assert_eq!(first, second);
        // The repeat short-circuits: one notification, one refresh.
        assert_eq!(notifier.event_count(), 1);
        assert_eq!(store.code_count(), 2);
    }

    #[tokio::test]
    async fn test_verify_consumed_code_by_other_user() {
        let store = Arc::new(MemoryReferralStore::new());
        let svc = service(store);
        let record = issue(&svc, "alice").await;
        svc.verify_signup(&record.code, &user("bob"))
            .await
            .expect("verify");

        let err = svc
            .verify_signup(&record.code, &user("carol"))
            .await
            .expect_err("second user");
        assert_eq!(
            err,
            ReferralError::AlreadyConsumed {
                code: record.code,
                status: ReferralStatus::Verified,
            }
        );
    }

    #[tokio::test]
    async fn test_verify_used_code_fails() {
        let store = Arc::new(MemoryReferralStore::new());
        let svc = service(store);
        let record = issue(&svc, "alice").await;
        svc.mark_code_used(&record.code, &user("bob"))
            .await
            .expect("use");

        let err = svc
            .verify_signup(&record.code, &user("carol"))
            .await
            .expect_err("used code");
        assert_eq!(
            err,
            ReferralError::AlreadyConsumed {
                code: record.code,
                status: ReferralStatus::Used,
            }
        );
    }

    #[tokio::test]
    async fn test_verify_invalidated_code_fails() {
        let store = Arc::new(MemoryReferralStore::new());
        let svc = service(store);
        let record = issue(&svc, "alice").await;
        svc.invalidate_code(&record.code, None, "expired")
            .await
            .expect("invalidate");

        let err = svc
            .verify_signup(&record.code, &user("bob"))
            .await
            .expect_err("invalid code");
        assert_eq!(
            err,
            ReferralError::AlreadyConsumed {
                code: record.code,
                status: ReferralStatus::Invalid,
            }
        );
    }

    #[tokio::test]
    async fn test_verify_survives_notification_failure() {
        let store = Arc::new(MemoryReferralStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        notifier.set_failing(true);
        let svc = service_with_notifier(store, notifier.clone());
        let record = issue(&svc, "alice").await;

        let verified = svc
            .verify_signup(&record.code, &user("bob"))
            .await
            .expect("verify despite notifier");
        assert!(verified.status.is_verified());
        // The delivery was attempted.
        assert_eq!(notifier.event_count(), 1);
    }

    #[tokio::test]
    async fn test_verify_survives_link_refresh_failure() {
        let inner = Arc::new(MemoryReferralStore::new());
        let store = Arc::new(FaultStore::new(inner));
        let svc = service(store.clone());
        let record = issue(&svc, "alice").await;

        // The refresh inside verification will fail to create a new code.
        store.push_failure(
            StoreOp::CreateCode,
            StoreError::Unavailable("write path down".to_string()),
        );

        let verified = svc
            .verify_signup(&record.code, &user("bob"))
            .await
            .expect("verify despite refresh failure");
        assert!(verified.status.is_verified());

        // No fresh active code exists; only the consumed one remains.
        let stats = svc.referral_stats(&user("alice")).await.expect("stats");
        assert_eq!(stats.total, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.verified, 1);
    }

    #[tokio::test]
    async fn test_verify_race_loser_gets_already_consumed() {
        let inner = Arc::new(MemoryReferralStore::new());
        let store = Arc::new(FaultStore::new(inner));
        let svc = service(store.clone());
        let record = issue(&svc, "alice").await;

        // Another verification wins between our screen and our update.
        store.push_failure(
            StoreOp::ConditionalUpdateCodeStatus,
            StoreError::PreconditionFailed {
                code: record.code.clone(),
                expected: ReferralStatus::Active,
                found: ReferralStatus::Verified,
            },
        );

        let err = svc
            .verify_signup(&record.code, &user("bob"))
            .await
            .expect_err("race loser");
        assert_eq!(
            err,
            ReferralError::AlreadyConsumed {
                code: record.code,
                status: ReferralStatus::Verified,
            }
        );
    }

    // ────────────────────────────────────────────────────────────────────────────
    // USE AND INVALIDATE
    // ────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_mark_used_happy_path() {
        let store = Arc::new(MemoryReferralStore::new());
        let svc = service(store);
        let record = issue(&svc, "alice").await;

        let used = svc
            .mark_code_used(&record.code, &user("bob"))
            .await
            .expect("use");
        assert!(used.status.is_used());
        assert_eq!(used.referred_id, Some(user("bob")));
    }

    #[tokio::test]
    async fn test_mark_used_rejects_owner() {
        let store = Arc::new(MemoryReferralStore::new());
        let svc = service(store);
        let record = issue(&svc, "alice").await;

        let err = svc
            .mark_code_used(&record.code, &user("alice"))
            .await
            .expect_err("owner");
        assert!(matches!(err, ReferralError::SelfReferral { .. }));
    }

    #[tokio::test]
    async fn test_mark_used_twice_fails() {
        let store = Arc::new(MemoryReferralStore::new());
        let svc = service(store);
        let record = issue(&svc, "alice").await;
        svc.mark_code_used(&record.code, &user("bob"))
            .await
            .expect("first use");

        let err = svc
            .mark_code_used(&record.code, &user("carol"))
            .await
            .expect_err("second use");
        assert_eq!(
            err,
            ReferralError::AlreadyConsumed {
                code: record.code,
                status: ReferralStatus::Used,
            }
        );
    }

    #[tokio::test]
    async fn test_invalidate_records_attempted_user_and_notifies() {
        let store = Arc::new(MemoryReferralStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let svc = service_with_notifier(store, notifier.clone());
        let record = issue(&svc, "alice").await;

        let retired = svc
            .invalidate_code(&record.code, Some(&user("mallory")), "signup while inactive")
            .await
            .expect("invalidate");

        assert!(retired.status.is_invalid());
        assert_eq!(retired.referred_id, Some(user("mallory")));
        assert_eq!(
            notifier.events(),
            vec![NotifyEvent::Invalid {
                referrer: user("alice"),
                code: record.code,
                reason: "signup while inactive".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_invalidate_without_attempted_user() {
        let store = Arc::new(MemoryReferralStore::new());
        let svc = service(store);
        let record = issue(&svc, "alice").await;

        let retired = svc
            .invalidate_code(&record.code, None, "campaign ended")
            .await
            .expect("invalidate");
        assert!(retired.status.is_invalid());
        assert!(retired.referred_id.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_terminal_code_fails() {
        let store = Arc::new(MemoryReferralStore::new());
        let svc = service(store);
        let record = issue(&svc, "alice").await;
        svc.verify_signup(&record.code, &user("bob"))
            .await
            .expect("verify");

        let err = svc
            .invalidate_code(&record.code, None, "late")
            .await
            .expect_err("terminal");
        assert!(matches!(err, ReferralError::AlreadyConsumed { .. }));
    }

    // ────────────────────────────────────────────────────────────────────────────
    // COMMISSIONS AND READ SIDE
    // ────────────────────────────────────────────────────────────────────────────

    /// alice -> bob -> carol -> dave with carol gold tier.
    fn seed_network(store: &MemoryReferralStore) {
        store.upsert_user(User::with_tier(UserId::new("carol"), UserTier::Gold));
        store.upsert_user(User::without_tier(UserId::new("dave")));
        seed_verified(store, "r1", "alice", "bob", 100);
        seed_verified(store, "r2", "bob", "carol", 200);
        seed_verified(store, "r3", "carol", "dave", 300);
    }

    #[tokio::test]
    async fn test_calculate_commissions_through_service() {
        let store = Arc::new(MemoryReferralStore::new());
        seed_network(&store);
        let svc = service(store);

        let result = svc
            .calculate_commissions(&user("dave"), 100.0, &PurchaseReference::new("p1"))
            .await
            .expect("settlement");
        assert_eq!(result.entry_count(), 3);
        assert!((result.total - 24.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_commission_stats_and_listing() {
        let store = Arc::new(MemoryReferralStore::new());
        seed_network(&store);
        let svc = service(store);

        svc.calculate_commissions(&user("dave"), 100.0, &PurchaseReference::new("p1"))
            .await
            .expect("first purchase");
        svc.calculate_commissions(&user("dave"), 50.0, &PurchaseReference::new("p2"))
            .await
            .expect("second purchase");

        // carol earns layer 1 on both purchases: 12 + 6.
        let stats = svc.commission_stats(&user("carol")).await.expect("stats");
        assert_eq!(stats.entry_count, 2);
        assert!((stats.total_earned - 18.0).abs() < 1e-9);

        let page = svc
            .list_commissions(&user("carol"), 1, 0)
            .await
            .expect("page");
        assert_eq!(page.len(), 1);
        let rest = svc
            .list_commissions(&user("carol"), 10, 1)
            .await
            .expect("rest");
        assert_eq!(rest.len(), 1);
        assert_ne!(page[0].purchase_reference, rest[0].purchase_reference);
    }

    #[tokio::test]
    async fn test_commission_stats_empty_user() {
        let svc = service(Arc::new(MemoryReferralStore::new()));
        let stats = svc.commission_stats(&user("nobody")).await.expect("stats");
        assert_eq!(stats.entry_count, 0);
        assert!((stats.total_earned - 0.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_has_completed_registration() {
        let store = Arc::new(MemoryReferralStore::new());
        let svc = service(store);
        let record = issue(&svc, "alice").await;

        assert!(!svc
            .has_completed_registration(&user("bob"))
            .await
            .expect("before"));
        svc.verify_signup(&record.code, &user("bob"))
            .await
            .expect("verify");
        assert!(svc
            .has_completed_registration(&user("bob"))
            .await
            .expect("after"));
    }

    #[tokio::test]
    async fn test_list_referrals_newest_first() {
        let store = Arc::new(MemoryReferralStore::new());
        let svc = service(store);
        let first = issue(&svc, "alice").await;
        svc.verify_signup(&first.code, &user("bob"))
            .await
            .expect("verify");

        let codes = svc.list_referrals(&user("alice")).await.expect("list");
        assert_eq!(codes.len(), 2);
        // The refreshed code is newer than the consumed one.
        assert!(codes[0].status.is_active());
        assert!(codes[1].status.is_verified());
    }

    #[tokio::test]
    async fn test_store_outage_bubbles_up() {
        let inner = Arc::new(MemoryReferralStore::new());
        let store = Arc::new(FaultStore::new(inner));
        store.push_failure(
            StoreOp::FindCodeByValue,
            StoreError::Unavailable("connection refused".to_string()),
        );
        let svc = service(store);

        let err = svc
            .validate_code(&ReferralCodeValue::new("ANY"))
            .await
            .expect_err("outage");
        assert!(matches!(err, ReferralError::StoreUnavailable { .. }));
        assert!(err.is_retryable());
    }
}

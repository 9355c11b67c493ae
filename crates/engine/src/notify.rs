//! # Referral Notifications
//!
//! Side-channel hooks fired after referral state changes. Delivery is
//! best-effort by contract: the service logs a failed notification and
//! moves on, it never rolls back the state change that triggered it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{info, warn};

use refchain_common::types::{ReferralCodeValue, UserId};

/// Notification delivery failure.
///
/// Carries only a human-readable reason; callers are expected to log it,
/// not to branch on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyError {
    pub reason: String,
}

impl NotifyError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notification failed: {}", self.reason)
    }
}

impl std::error::Error for NotifyError {}

/// Receiver of referral lifecycle events.
///
/// ## Contract for Implementors
///
/// - MUST NOT block for long periods; the service calls these inline.
/// - MUST be safe to call concurrently from multiple tasks.
/// - Failures MUST be returned, never panicked; the caller decides
///   whether a failed delivery matters.
pub trait ReferralNotifier: Send + Sync {
    /// A referral was verified: `referred` completed signup under
    /// `referrer`'s code.
    fn on_referral_verified(
        &self,
        referrer: &UserId,
        referred: &UserId,
        code: &ReferralCodeValue,
    ) -> Result<(), NotifyError>;

    /// A referral code was invalidated; `reason` is free-form text.
    fn on_invalid_referral(
        &self,
        referrer: &UserId,
        code: &ReferralCodeValue,
        reason: &str,
    ) -> Result<(), NotifyError>;
}

// Object safety: the service holds Arc<dyn ReferralNotifier>.
const _: () = {
    fn assert_object_safe(_: &dyn ReferralNotifier) {}
};

// ────────────────────────────────────────────────────────────────────────────
// STANDARD IMPLEMENTATIONS
// ────────────────────────────────────────────────────────────────────────────

/// Notifier that writes events to the tracing log and nothing else.
///
/// Default wiring for deployments without an external notification bus.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl ReferralNotifier for LogNotifier {
    fn on_referral_verified(
        &self,
        referrer: &UserId,
        referred: &UserId,
        code: &ReferralCodeValue,
    ) -> Result<(), NotifyError> {
        info!(referrer = %referrer, referred = %referred, code = %code, "referral verified");
        Ok(())
    }

    fn on_invalid_referral(
        &self,
        referrer: &UserId,
        code: &ReferralCodeValue,
        reason: &str,
    ) -> Result<(), NotifyError> {
        warn!(referrer = %referrer, code = %code, reason, "referral invalidated");
        Ok(())
    }
}

/// Notifier that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl ReferralNotifier for NoopNotifier {
    fn on_referral_verified(
        &self,
        _referrer: &UserId,
        _referred: &UserId,
        _code: &ReferralCodeValue,
    ) -> Result<(), NotifyError> {
        Ok(())
    }

    fn on_invalid_referral(
        &self,
        _referrer: &UserId,
        _code: &ReferralCodeValue,
        _reason: &str,
    ) -> Result<(), NotifyError> {
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TEST SUPPORT
// ────────────────────────────────────────────────────────────────────────────

/// Event captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyEvent {
    Verified {
        referrer: UserId,
        referred: UserId,
        code: ReferralCodeValue,
    },
    Invalid {
        referrer: UserId,
        code: ReferralCodeValue,
        reason: String,
    },
}

/// Notifier that records events in memory, with a switchable failure mode.
///
/// Used in tests to assert which events fired and that callers survive
/// delivery failures.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotifyEvent>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// When `failing` is set, every delivery returns an error. Events are
    /// still recorded so tests can see what was attempted.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<NotifyEvent> {
        self.events.lock().clone()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    fn deliver(&self, event: NotifyEvent) -> Result<(), NotifyError> {
        self.events.lock().push(event);
        if self.failing.load(Ordering::SeqCst) {
            Err(NotifyError::new("recording notifier set to fail"))
        } else {
            Ok(())
        }
    }
}

impl ReferralNotifier for RecordingNotifier {
    fn on_referral_verified(
        &self,
        referrer: &UserId,
        referred: &UserId,
        code: &ReferralCodeValue,
    ) -> Result<(), NotifyError> {
        self.deliver(NotifyEvent::Verified {
            referrer: referrer.clone(),
            referred: referred.clone(),
            code: code.clone(),
        })
    }

    fn on_invalid_referral(
        &self,
        referrer: &UserId,
        code: &ReferralCodeValue,
        reason: &str,
    ) -> Result<(), NotifyError> {
        self.deliver(NotifyEvent::Invalid {
            referrer: referrer.clone(),
            code: code.clone(),
            reason: reason.to_string(),
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════

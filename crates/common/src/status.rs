//! # Referral Status
//!
//! Modul ini menyediakan `ReferralStatus` enum untuk representasi status
//! lifecycle kode referral.
//!
//! ## Variants
//!
//! | Variant | Deskripsi |
//! |---------|-----------|
//! | `Active` | Kode dapat dikonsumsi oleh signup |
//! | `Verified` | Signup melalui kode ini sudah terverifikasi |
//! | `Invalid` | Kode ditolak oleh guard saat percobaan signup |
//! | `Used` | Kode dikonsumsi melalui jalur alternatif tanpa verifikasi penuh |
//!
//! ## State Machine
//!
//! ```text
//! Active → Verified
//! Active → Invalid
//! Active → Used
//! ```
//!
//! Semua status selain `Active` bersifat terminal. `Active` adalah satu-satunya
//! status awal. Kode yang sudah keluar dari `Active` tidak pernah kembali.

use std::fmt;

use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════════════════════
// ERROR TYPE
// ════════════════════════════════════════════════════════════════════════════════

/// Error type untuk transisi status kode referral yang tidak valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusTransitionError {
    /// Transisi tidak valid dari status saat ini.
    InvalidTransition {
        /// Nama status saat ini.
        from: &'static str,
        /// Nama status tujuan.
        to: &'static str,
    },
}

impl fmt::Display for StatusTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusTransitionError::InvalidTransition { from, to } => {
                write!(
                    f,
                    "invalid referral status transition: cannot move from '{}' to '{}'",
                    from, to
                )
            }
        }
    }
}

impl std::error::Error for StatusTransitionError {}

// ════════════════════════════════════════════════════════════════════════════════
// REFERRAL STATUS
// ════════════════════════════════════════════════════════════════════════════════

/// Status lifecycle kode referral.
///
/// ## Immutability
///
/// Status pada record hanya berubah melalui conditional update pada store
/// (compare-and-swap). `transition_to` memvalidasi legalitas transisi dan
/// mengembalikan status baru tanpa side effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    /// Kode dapat dikonsumsi oleh signup.
    Active,
    /// Signup melalui kode ini sudah terverifikasi.
    Verified,
    /// Kode ditolak oleh guard saat percobaan signup.
    Invalid,
    /// Kode dikonsumsi melalui jalur alternatif.
    Used,
}

impl ReferralStatus {
    // ════════════════════════════════════════════════════════════════════════════
    // STATUS CHECKS
    // ════════════════════════════════════════════════════════════════════════════

    /// Mengecek apakah status Active.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(self, ReferralStatus::Active)
    }

    /// Mengecek apakah status Verified.
    #[must_use]
    #[inline]
    pub const fn is_verified(&self) -> bool {
        matches!(self, ReferralStatus::Verified)
    }

    /// Mengecek apakah status Invalid.
    #[must_use]
    #[inline]
    pub const fn is_invalid(&self) -> bool {
        matches!(self, ReferralStatus::Invalid)
    }

    /// Mengecek apakah status Used.
    #[must_use]
    #[inline]
    pub const fn is_used(&self) -> bool {
        matches!(self, ReferralStatus::Used)
    }

    /// Mengecek apakah status terminal (semua status selain `Active`).
    #[must_use]
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // STATUS NAME
    // ════════════════════════════════════════════════════════════════════════════

    /// Mengembalikan nama status sebagai string.
    ///
    /// # Returns
    ///
    /// - `"active"` untuk Active
    /// - `"verified"` untuk Verified
    /// - `"invalid"` untuk Invalid
    /// - `"used"` untuk Used
    #[must_use]
    pub const fn status_name(&self) -> &'static str {
        match self {
            ReferralStatus::Active => "active",
            ReferralStatus::Verified => "verified",
            ReferralStatus::Invalid => "invalid",
            ReferralStatus::Used => "used",
        }
    }

    /// Parse nama status. `None` untuk nama yang tidak dikenal.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "active" => Some(ReferralStatus::Active),
            "verified" => Some(ReferralStatus::Verified),
            "invalid" => Some(ReferralStatus::Invalid),
            "used" => Some(ReferralStatus::Used),
            _ => None,
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // STATE MACHINE
    // ════════════════════════════════════════════════════════════════════════════

    /// Mengecek apakah transisi ke `target` legal dari status saat ini.
    ///
    /// Hanya `Active → {Verified, Invalid, Used}` yang legal. Status terminal
    /// tidak punya transisi keluar, dan tidak ada transisi kembali ke `Active`.
    #[must_use]
    pub const fn can_transition_to(&self, target: ReferralStatus) -> bool {
        self.is_active() && target.is_terminal()
    }

    /// Menerapkan transisi status.
    ///
    /// # Returns
    ///
    /// `Ok(target)` jika transisi legal, `Err(StatusTransitionError)` jika tidak.
    pub fn transition_to(
        self,
        target: ReferralStatus,
    ) -> Result<ReferralStatus, StatusTransitionError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(StatusTransitionError::InvalidTransition {
                from: self.status_name(),
                to: target.status_name(),
            })
        }
    }
}

impl fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_name())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════

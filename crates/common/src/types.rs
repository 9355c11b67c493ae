//! # Core Identifiers
//!
//! Modul ini menyediakan identifier dan tipe dasar yang dipakai di seluruh
//! referral core: id user, nilai kode referral, referensi pembelian, tier
//! user, dan timestamp.
//!
//! Semua identifier adalah newtype di atas `String` sehingga tidak dapat
//! tertukar satu sama lain pada signature fungsi.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════════════════════
// TIMESTAMP
// ════════════════════════════════════════════════════════════════════════════════

/// Timestamp dalam unix milliseconds.
pub type Timestamp = u64;

/// Mengembalikan waktu sekarang dalam unix milliseconds.
///
/// Clock yang mundur di bawah epoch menghasilkan `0`, bukan panic.
#[must_use]
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ════════════════════════════════════════════════════════════════════════════════
// USER ID
// ════════════════════════════════════════════════════════════════════════════════

/// Identifier unik untuk user.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Membuat `UserId` baru.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mengembalikan representasi string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// REFERRAL ID
// ════════════════════════════════════════════════════════════════════════════════

/// Identifier unik untuk record kode referral (bukan nilai kodenya).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferralId(String);

impl ReferralId {
    /// Membuat `ReferralId` baru.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mengembalikan representasi string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// LEDGER ENTRY ID
// ════════════════════════════════════════════════════════════════════════════════

/// Identifier unik untuk satu entry di commission ledger.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerEntryId(String);

impl LedgerEntryId {
    /// Membuat `LedgerEntryId` baru.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mengembalikan representasi string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LedgerEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// REFERRAL CODE VALUE
// ════════════════════════════════════════════════════════════════════════════════

/// Nilai kode referral yang dibagikan ke calon user.
///
/// Berbeda dari [`ReferralId`]: ini adalah token yang muncul di dalam link,
/// bukan primary key record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferralCodeValue(String);

impl ReferralCodeValue {
    /// Membuat nilai kode baru.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Mengembalikan representasi string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Mengembalikan panjang kode dalam karakter.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    /// Mengecek apakah kode kosong.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ReferralCodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReferralCodeValue {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// PURCHASE REFERENCE
// ════════════════════════════════════════════════════════════════════════════════

/// Referensi pembelian, dipakai sebagai idempotency key perhitungan komisi.
///
/// Satu referensi menghasilkan paling banyak satu set ledger entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseReference(String);

impl PurchaseReference {
    /// Membuat referensi pembelian baru.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Mengembalikan representasi string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PurchaseReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PurchaseReference {
    fn from(reference: &str) -> Self {
        Self(reference.to_string())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// USER TIER
// ════════════════════════════════════════════════════════════════════════════════

/// Tier user yang menentukan kedalaman maksimum commission chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserTier {
    /// Tier tertinggi.
    Gold,
    /// Tier menengah.
    Silver,
    /// Tier terendah.
    Bronze,
}

impl UserTier {
    /// Mengembalikan nama tier sebagai string.
    #[must_use]
    pub const fn tier_name(&self) -> &'static str {
        match self {
            UserTier::Gold => "gold",
            UserTier::Silver => "silver",
            UserTier::Bronze => "bronze",
        }
    }

    /// Parse nama tier. `None` untuk nama yang tidak dikenal.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "gold" => Some(UserTier::Gold),
            "silver" => Some(UserTier::Silver),
            "bronze" => Some(UserTier::Bronze),
            _ => None,
        }
    }
}

impl fmt::Display for UserTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tier_name())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// USER
// ════════════════════════════════════════════════════════════════════════════════

/// User eksternal yang direferensikan oleh core (tidak dimiliki).
///
/// Hanya atribut yang dikonsumsi core yang dimodelkan: id dan tier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identifier user.
    pub id: UserId,
    /// Tier user. `None` jika belum ditetapkan.
    pub tier: Option<UserTier>,
}

impl User {
    /// Membuat user dengan tier.
    #[must_use]
    pub fn with_tier(id: UserId, tier: UserTier) -> Self {
        Self {
            id,
            tier: Some(tier),
        }
    }

    /// Membuat user tanpa tier.
    #[must_use]
    pub fn without_tier(id: UserId) -> Self {
        Self { id, tier: None }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════

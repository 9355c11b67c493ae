//! # Referral Code Generator
//!
//! Produces collision-checked referral code values.
//!
//! ## Strategy
//!
//! 1. Draw fixed-length random codes from `A-Z0-9` and check each against
//!    the store, up to a bounded attempt count.
//! 2. On exhaustion, build a composite code from the current time, a
//!    fragment of the owner's id, and a random suffix. The time component
//!    makes the composite unique without further store round-trips.
//!
//! Generation itself is pure; only the uniqueness check touches the store.

use rand::Rng;
use tracing::{debug, warn};

use refchain_common::types::{now_millis, ReferralCodeValue, UserId};
use refchain_store::{ReferralStore, StoreError};

/// Alphabet for random codes.
const CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of random codes.
const DEFAULT_CODE_LENGTH: usize = 10;

/// Random draws before switching to the composite fallback.
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Characters of the owner id kept in the composite fallback.
const FALLBACK_OWNER_CHARS: usize = 4;

/// Random suffix bytes in the composite fallback (hex-encoded).
const FALLBACK_RANDOM_BYTES: usize = 4;

// ════════════════════════════════════════════════════════════════════════════════
// CODE GENERATOR
// ════════════════════════════════════════════════════════════════════════════════

/// Referral code generator with bounded collision retries.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    length: usize,
    max_attempts: u32,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator {
    /// Creates a generator with production settings (length 10, 10
    /// attempts).
    #[must_use]
    pub fn new() -> Self {
        Self {
            length: DEFAULT_CODE_LENGTH,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Creates a generator with explicit settings. Shorter lengths shrink
    /// the code space; tests use this to force collisions.
    #[must_use]
    pub fn with_settings(length: usize, max_attempts: u32) -> Self {
        Self {
            length,
            max_attempts,
        }
    }

    /// Draws one random code. No uniqueness check.
    #[must_use]
    pub fn generate(&self) -> ReferralCodeValue {
        let mut rng = rand::thread_rng();
        let code: String = (0..self.length)
            .map(|_| {
                let index = rng.gen_range(0..CODE_CHARS.len());
                CODE_CHARS[index] as char
            })
            .collect();
        ReferralCodeValue::new(code)
    }

    /// Produces a code that does not collide with any stored code.
    ///
    /// Tries random draws first; each is checked through the store. After
    /// `max_attempts` collisions the composite fallback is used instead of
    /// retrying forever.
    ///
    /// ## Errors
    ///
    /// Only store failures during the uniqueness check. Exhaustion is not
    /// an error.
    pub async fn generate_unique(
        &self,
        store: &dyn ReferralStore,
        owner: &UserId,
    ) -> Result<ReferralCodeValue, StoreError> {
        for attempt in 1..=self.max_attempts {
            let candidate = self.generate();
            if store.find_code_by_value(&candidate).await?.is_none() {
                if attempt > 1 {
                    debug!(attempts = attempt, "code generation retried after collisions");
                }
                return Ok(candidate);
            }
        }

        let fallback = self.fallback_code(owner);
        warn!(
            owner = %owner,
            code = %fallback,
            "random attempts exhausted; issuing composite fallback code"
        );
        Ok(fallback)
    }

    /// Composite fallback: `{base36 time}-{owner tail}-{random hex}`, all
    /// uppercase.
    fn fallback_code(&self, owner: &UserId) -> ReferralCodeValue {
        let time_part = to_base36_upper(now_millis());

        let id = owner.as_str();
        let skip = id.chars().count().saturating_sub(FALLBACK_OWNER_CHARS);
        let owner_part: String = id.chars().skip(skip).collect::<String>().to_uppercase();

        let mut random_bytes = [0u8; FALLBACK_RANDOM_BYTES];
        rand::thread_rng().fill(&mut random_bytes);
        let random_part = hex::encode_upper(random_bytes);

        ReferralCodeValue::new(format!("{}-{}-{}", time_part, owner_part, random_part))
    }
}

/// Renders `value` in base 36 with uppercase digits.
fn to_base36_upper(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize] as char);
        value /= 36;
    }
    digits.iter().rev().collect()
}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════

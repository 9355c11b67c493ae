//! # Commission & Tier Policies
//!
//! Value-type configuration for commission rates and tier depth limits.
//!
//! ## Overview
//!
//! Both policies are plain data passed explicitly into the calculator. No
//! ambient process state is consulted, so tests can run against alternate
//! tables deterministically.
//!
//! | Policy | Controls | Default |
//! |--------|----------|---------|
//! | `CommissionPolicy` | rate per layer | 1 → 12%, 2 → 8%, 3 → 4% |
//! | `TierDepthPolicy` | max chain depth per referrer tier | gold 3, silver 2, bronze 1, unknown 1 |
//!
//! A layer without a configured rate is skipped by the calculator (with a
//! warning), never paid at an implicit zero. An unknown or missing tier maps
//! to the most restrictive depth.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::UserTier;

// ════════════════════════════════════════════════════════════════════════════════
// COMMISSION POLICY
// ════════════════════════════════════════════════════════════════════════════════

/// Per-layer commission rate table.
///
/// Rates are fractions of the purchase amount, keyed by layer (1 = direct
/// referrer). The map is ordered so logs and iteration are deterministic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommissionPolicy {
    /// Rate per layer. Absent layers earn nothing and are skipped.
    pub rates: BTreeMap<u32, f64>,
}

impl Default for CommissionPolicy {
    /// Production rate table: 12% / 8% / 4% for layers 1..=3.
    fn default() -> Self {
        Self::from_rates(&[(1, 0.12), (2, 0.08), (3, 0.04)])
    }
}

impl CommissionPolicy {
    /// Builds a policy from (layer, rate) pairs.
    #[must_use]
    pub fn from_rates(pairs: &[(u32, f64)]) -> Self {
        Self {
            rates: pairs.iter().copied().collect(),
        }
    }

    /// The rate for `layer`, or `None` when the layer is beyond the table.
    #[must_use]
    pub fn rate_for(&self, layer: u32) -> Option<f64> {
        self.rates.get(&layer).copied()
    }

    /// The deepest layer with a configured rate, or 0 for an empty table.
    #[must_use]
    pub fn max_layer(&self) -> u32 {
        self.rates.keys().max().copied().unwrap_or(0)
    }

    /// Validates the table.
    ///
    /// # Returns
    ///
    /// `Err(String)` when the table is empty, keys a layer 0, or contains a
    /// rate outside (0, 1].
    pub fn validate(&self) -> Result<(), String> {
        if self.rates.is_empty() {
            return Err("commission rate table must not be empty".to_string());
        }
        for (&layer, &rate) in &self.rates {
            if layer == 0 {
                return Err("commission rate table must not contain layer 0".to_string());
            }
            if !rate.is_finite() || rate <= 0.0 || rate > 1.0 {
                return Err(format!(
                    "commission rate for layer {} must be a finite fraction in (0, 1], got {}",
                    layer, rate
                ));
            }
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// TIER DEPTH POLICY
// ════════════════════════════════════════════════════════════════════════════════

/// Maximum chain depth per referrer tier.
///
/// Depth is always evaluated from the tier of the purchaser's direct
/// referrer, per purchase. The bound caps commission fan-out and ledger
/// write cost.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDepthPolicy {
    /// Depth for gold referrers.
    pub gold_depth: u32,
    /// Depth for silver referrers.
    pub silver_depth: u32,
    /// Depth for bronze referrers.
    pub bronze_depth: u32,
    /// Depth when the referrer has no known tier. Kept at the most
    /// restrictive value so missing data never widens payouts.
    pub default_depth: u32,
}

impl Default for TierDepthPolicy {
    /// Production table: gold 3, silver 2, bronze 1, unknown 1.
    fn default() -> Self {
        Self {
            gold_depth: 3,
            silver_depth: 2,
            bronze_depth: 1,
            default_depth: 1,
        }
    }
}

impl TierDepthPolicy {
    /// A table granting the same depth to every tier. Intended for tests.
    #[must_use]
    pub fn uniform(depth: u32) -> Self {
        Self {
            gold_depth: depth,
            silver_depth: depth,
            bronze_depth: depth,
            default_depth: depth,
        }
    }

    /// The depth bound for a referrer with the given tier.
    #[must_use]
    pub const fn depth_for(&self, tier: Option<UserTier>) -> u32 {
        match tier {
            Some(UserTier::Gold) => self.gold_depth,
            Some(UserTier::Silver) => self.silver_depth,
            Some(UserTier::Bronze) => self.bronze_depth,
            None => self.default_depth,
        }
    }

    /// Validates the table. Every depth must be at least 1.
    pub fn validate(&self) -> Result<(), String> {
        let depths = [
            ("gold_depth", self.gold_depth),
            ("silver_depth", self.silver_depth),
            ("bronze_depth", self.bronze_depth),
            ("default_depth", self.default_depth),
        ];
        for (name, depth) in depths {
            if depth == 0 {
                return Err(format!("{} must be at least 1", name));
            }
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════

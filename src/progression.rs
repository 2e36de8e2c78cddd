//! Progression calculator
//!
//! Pure functions mapping accumulated experience to level, intra-level
//! experience and milestone tier, and mapping evaluation scores to XP
//! awards. Every mutation of an entity's progress goes through
//! [`Progress::add_experience`] so the derived fields can never drift
//! from `total_xp`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// XP required to advance one level
pub const XP_PER_LEVEL: u64 = 100;

/// Level cap; experience keeps accumulating but level saturates here
pub const MAX_LEVEL: u32 = 100;

/// Base XP award for a test submission
pub const TEST_BASE_XP: f64 = 20.0;

/// Milestone tiers, ordered by ascending XP threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MilestoneTier {
    Novice,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
    Master,
}

impl MilestoneTier {
    /// Ascending (threshold, tier) table
    const THRESHOLDS: [(u64, MilestoneTier); 7] = [
        (0, MilestoneTier::Novice),
        (1000, MilestoneTier::Bronze),
        (2000, MilestoneTier::Silver),
        (3000, MilestoneTier::Gold),
        (4000, MilestoneTier::Platinum),
        (5000, MilestoneTier::Diamond),
        (10000, MilestoneTier::Master),
    ];

    /// Tier for a given total XP: the tier of the highest threshold not
    /// exceeding `total_xp` (last-match-wins over the ascending scan).
    pub fn from_total_xp(total_xp: u64) -> Self {
        let mut tier = MilestoneTier::Novice;
        for (threshold, t) in Self::THRESHOLDS {
            if total_xp >= threshold {
                tier = t;
            }
        }
        tier
    }
}

impl fmt::Display for MilestoneTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MilestoneTier::Novice => "Novice",
            MilestoneTier::Bronze => "Bronze",
            MilestoneTier::Silver => "Silver",
            MilestoneTier::Gold => "Gold",
            MilestoneTier::Platinum => "Platinum",
            MilestoneTier::Diamond => "Diamond",
            MilestoneTier::Master => "Master",
        };
        write!(f, "{}", name)
    }
}

impl Default for MilestoneTier {
    fn default() -> Self {
        MilestoneTier::Novice
    }
}

/// Derive level from total XP: `min(total/100 + 1, 100)`.
///
/// Level starts at 1 for a fresh entity and saturates at [`MAX_LEVEL`];
/// XP past the cap still accumulates in `total_xp`.
pub fn derive_level(total_xp: u64) -> u32 {
    ((total_xp / XP_PER_LEVEL) as u32 + 1).min(MAX_LEVEL)
}

/// XP within the current level: `total % 100`. Wraps at saturation.
pub fn experience_in_level(total_xp: u64) -> u32 {
    (total_xp % XP_PER_LEVEL) as u32
}

/// XP award for a test submission.
///
/// `floor(20 * max(0.25, score/100) * (1 + (level-1)*0.005))` — a zero
/// score still awards 25% of the base, and higher-level entities earn a
/// small linear bonus (1.5x at the level cap).
pub fn test_experience(score: u32, level: u32) -> u64 {
    let score = score.min(100) as f64;
    let score_multiplier = (score / 100.0).max(0.25);
    let level_bonus = 1.0 + (level.saturating_sub(1) as f64) * 0.005;
    (TEST_BASE_XP * score_multiplier * level_bonus).floor() as u64
}

/// XP award for a project review.
///
/// Base award steps up with level (100 / 150 at level >= 60 / 200 at
/// level >= 80), score multiplier floors at 0.3, and a level bonus
/// scales up to 1.5x at the cap.
pub fn review_experience(score: u32, level: u32) -> u64 {
    let base: f64 = if level >= 80 {
        200.0
    } else if level >= 60 {
        150.0
    } else {
        100.0
    };
    let score = score.min(100) as f64;
    let score_multiplier = (score / 100.0).max(0.3);
    let level_bonus = 1.0 + (level as f64 / 100.0) * 0.5;
    (base * score_multiplier * level_bonus).floor() as u64
}

/// Progress state embedded in a learning node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Cumulative experience; never decreases
    pub total_xp: u64,
    /// Derived level in [1, 100]
    pub level: u32,
    /// Derived XP within the current level, [0, 100)
    pub xp_in_level: u32,
    /// Derived milestone tier
    pub milestone_tier: MilestoneTier,
}

impl Progress {
    /// Fresh progress: zero XP, level 1, Novice
    pub fn new() -> Self {
        Self::from_total_xp(0)
    }

    /// Rebuild all derived fields from a total
    pub fn from_total_xp(total_xp: u64) -> Self {
        Self {
            total_xp,
            level: derive_level(total_xp),
            xp_in_level: experience_in_level(total_xp),
            milestone_tier: MilestoneTier::from_total_xp(total_xp),
        }
    }

    /// Add an XP award and recompute level, intra-level XP and tier.
    ///
    /// The amount is unsigned, so negative awards are unrepresentable.
    pub fn add_experience(&mut self, amount: u64) {
        *self = Self::from_total_xp(self.total_xp + amount);
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_monotonic() {
        let mut prev = 0;
        for xp in (0..12_000).step_by(37) {
            let level = derive_level(xp);
            assert!(level >= prev, "level regressed at xp={}", xp);
            prev = level;
        }
    }

    #[test]
    fn test_level_saturation() {
        assert_eq!(derive_level(9899), 99);
        assert_eq!(derive_level(9900), 100);
        assert_eq!(derive_level(10_000), 100);
        assert_eq!(derive_level(1_000_000), 100);
    }

    #[test]
    fn test_level_origin() {
        assert_eq!(derive_level(0), 1);
        assert_eq!(derive_level(99), 1);
        assert_eq!(derive_level(100), 2);
    }

    #[test]
    fn test_tier_table() {
        assert_eq!(MilestoneTier::from_total_xp(0), MilestoneTier::Novice);
        assert_eq!(MilestoneTier::from_total_xp(999), MilestoneTier::Novice);
        assert_eq!(MilestoneTier::from_total_xp(1000), MilestoneTier::Bronze);
        assert_eq!(MilestoneTier::from_total_xp(1500), MilestoneTier::Bronze);
        assert_eq!(MilestoneTier::from_total_xp(1999), MilestoneTier::Bronze);
        assert_eq!(MilestoneTier::from_total_xp(2000), MilestoneTier::Silver);
        assert_eq!(MilestoneTier::from_total_xp(10_000), MilestoneTier::Master);
        assert_eq!(MilestoneTier::from_total_xp(999_999), MilestoneTier::Master);
    }

    #[test]
    fn test_xp_never_zero() {
        // Zero score still awards a quarter of the base, scaled by level
        for level in 1..=100 {
            let xp = test_experience(0, level);
            let floor = (20.0 * 0.25 * (1.0 + (level - 1) as f64 * 0.005)).floor() as u64;
            assert_eq!(xp, floor);
            assert!(xp > 0);
        }
        assert_eq!(test_experience(100, 1), 20);
    }

    #[test]
    fn test_xp_level_bonus() {
        // Level 100 at full score: 20 * 1.0 * 1.495 = 29
        assert_eq!(test_experience(100, 100), 29);
    }

    #[test]
    fn review_xp_base_steps() {
        // Below 60 -> base 100, 60..79 -> 150, >= 80 -> 200
        assert_eq!(review_experience(100, 1), (100.0 * 1.0 * 1.005) as u64);
        assert_eq!(review_experience(100, 60), (150.0 * 1.0 * 1.3) as u64);
        assert_eq!(review_experience(100, 80), (200.0 * 1.0 * 1.4) as u64);
    }

    #[test]
    fn review_xp_scenario() {
        // level 85, score 90: 200 * 0.9 * 1.425 = 256.5 -> 256
        assert_eq!(review_experience(90, 85), 256);
    }

    #[test]
    fn review_xp_score_floor() {
        // Score 0 floors the multiplier at 0.3
        assert_eq!(review_experience(0, 1), (100.0 * 0.3 * 1.005) as u64);
    }

    #[test]
    fn test_add_experience_scenario_a() {
        // Fresh node scores 100% on a test: xp 20, still level 1 Novice
        let mut p = Progress::new();
        assert_eq!(p.level, 1);
        assert_eq!(p.milestone_tier, MilestoneTier::Novice);

        let xp = test_experience(100, p.level);
        assert_eq!(xp, 20);
        p.add_experience(xp);

        assert_eq!(p.total_xp, 20);
        assert_eq!(p.level, 1);
        assert_eq!(p.xp_in_level, 20);
        assert_eq!(p.milestone_tier, MilestoneTier::Novice);
    }

    #[test]
    fn test_add_experience_scenario_b() {
        // 995 + 10 crosses both a level and a tier boundary
        let mut p = Progress::from_total_xp(995);
        p.add_experience(10);

        assert_eq!(p.total_xp, 1005);
        assert_eq!(p.level, 11);
        assert_eq!(p.xp_in_level, 5);
        assert_eq!(p.milestone_tier, MilestoneTier::Bronze);
    }

    #[test]
    fn test_derived_fields_always_consistent() {
        let mut p = Progress::new();
        for amount in [1, 99, 100, 250, 5000, 7] {
            p.add_experience(amount);
            assert_eq!(p.level, derive_level(p.total_xp));
            assert_eq!(p.xp_in_level, experience_in_level(p.total_xp));
            assert_eq!(p.milestone_tier, MilestoneTier::from_total_xp(p.total_xp));
        }
    }

    #[test]
    fn test_tier_ordering() {
        assert!(MilestoneTier::Novice < MilestoneTier::Bronze);
        assert!(MilestoneTier::Diamond < MilestoneTier::Master);
    }
}

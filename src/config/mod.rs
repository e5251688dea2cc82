//! Externally supplied reward configuration.
//!
//! Every table the engines consult — level percentages, quota caps,
//! reward amounts, withdrawal limits — lives here and is passed in
//! explicitly, never read from a module-level singleton. The whole
//! tree deserializes from JSON so deployments can version it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ledger::Amount;
use crate::quota::GameKind;

pub type PackageId = String;

/// A purchasable plan. Gates gaming access, amplifies rewards, and
/// carries the per-level commission table used for its buyer's upline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PackageTier {
    pub id: PackageId,
    pub name: String,
    /// Price in minor units.
    pub price: Amount,
    /// Daily income rate in basis points of the price.
    pub daily_income_bps: u32,
    /// Commission percentage per upline level, in basis points.
    /// Index 0 is the nearest sponsor (level 1).
    pub level_bps: Vec<u32>,
    #[serde(default)]
    pub multipliers: RewardMultipliers,
    /// Days until the package expires; `None` means it never does.
    #[serde(default)]
    pub validity_days: Option<u32>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct RewardMultipliers {
    pub games: f64,
    pub videos: f64,
    pub ads: f64,
}

impl Default for RewardMultipliers {
    fn default() -> Self {
        Self {
            games: 1.0,
            videos: 1.0,
            ads: 1.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CommissionRules {
    /// How far up the sponsor chain level income reaches.
    pub max_depth: usize,
    /// Fallback table when neither the ancestor's nor the investor's
    /// package defines a rate for a level. Basis points per level.
    pub default_level_bps: Vec<u32>,
    /// Whether an ancestor whose package has lapsed still earns level
    /// income. Kept as a flag because upstream policy is undecided.
    pub pay_expired_packages: bool,
    /// One-time bonus to the immediate sponsor on the referred
    /// account's first package purchase.
    pub direct_referral_bonus: Amount,
}

impl Default for CommissionRules {
    fn default() -> Self {
        Self {
            max_depth: 10,
            default_level_bps: vec![1000, 500, 300, 200, 100, 100, 50, 50, 25, 25],
            pay_expired_packages: false,
            direct_referral_bonus: 50_00,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VideoRules {
    pub welcome_reward: Amount,
    pub daily_ad_reward: Amount,
    pub daily_ad_cap: u32,
    /// Minimum watched/total ratio for an ad view to count.
    pub min_watch_ratio: f64,
    pub game_unlock_reward: Amount,
}

impl Default for VideoRules {
    fn default() -> Self {
        Self {
            welcome_reward: 10_00,
            daily_ad_reward: 50,
            daily_ad_cap: 50,
            min_watch_ratio: 0.90,
            game_unlock_reward: 1_00,
        }
    }
}

/// Per-game-type reward parameters. `base` and `score_multiplier` are
/// in major units; the final amount is rounded to 2 decimals when it
/// becomes a ledger credit.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct GameRules {
    pub base: f64,
    pub score_multiplier: f64,
    pub min_duration_secs: u32,
    pub daily_max: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GamingRules {
    pub games: BTreeMap<GameKind, GameRules>,
    pub perf_bonus_score: u32,
    pub perf_bonus: f64,
}

impl Default for GamingRules {
    fn default() -> Self {
        let mut games = BTreeMap::new();
        games.insert(
            GameKind::Casual,
            GameRules {
                base: 0.5,
                score_multiplier: 0.001,
                min_duration_secs: 30,
                daily_max: 20,
            },
        );
        games.insert(
            GameKind::Arcade,
            GameRules {
                base: 1.0,
                score_multiplier: 0.002,
                min_duration_secs: 45,
                daily_max: 10,
            },
        );
        games.insert(
            GameKind::Puzzle,
            GameRules {
                base: 0.75,
                score_multiplier: 0.0015,
                min_duration_secs: 60,
                daily_max: 15,
            },
        );
        Self {
            games,
            perf_bonus_score: 1000,
            perf_bonus: 1.2,
        }
    }
}

/// Package-price thresholds for the {1, 1.5, 2} tier multiplier used
/// by gaming rewards and the daily task bundle.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TierThresholds {
    pub mid_price: Amount,
    pub top_price: Amount,
    pub mid_multiplier: f64,
    pub top_multiplier: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            mid_price: 500_00,
            top_price: 2000_00,
            mid_multiplier: 1.5,
            top_multiplier: 2.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TaskRules {
    pub login_bonus: Amount,
    pub video_target: u32,
    pub video_reward: Amount,
    pub ad_target: u32,
    pub ad_reward: Amount,
    pub game_target: u32,
    pub game_reward: Amount,
    pub referral_reward: Amount,
    pub transaction_reward: Amount,
}

impl Default for TaskRules {
    fn default() -> Self {
        Self {
            login_bonus: 25,
            video_target: 3,
            video_reward: 50,
            ad_target: 10,
            ad_reward: 1_00,
            game_target: 5,
            game_reward: 1_50,
            referral_reward: 5_00,
            transaction_reward: 50,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WithdrawalRules {
    pub minimum: Amount,
    pub maximum: Amount,
    /// Tax deducted at source, basis points of gross.
    pub tds_bps: u32,
    /// Daily withdrawal allowance as basis points of lifetime earnings.
    pub daily_cap_bps: u32,
}

impl Default for WithdrawalRules {
    fn default() -> Self {
        Self {
            minimum: 100_00,
            maximum: 50_000_00,
            tds_bps: 1000,
            daily_cap_bps: 2000,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RewardConfig {
    pub commission: CommissionRules,
    pub video: VideoRules,
    pub gaming: GamingRules,
    pub tiers: TierThresholds,
    pub tasks: TaskRules,
    pub withdrawal: WithdrawalRules,
}

impl RewardConfig {
    /// Tier multiplier for a package price, 1.0 when no package.
    pub fn tier_multiplier(&self, package_price: Option<Amount>) -> f64 {
        match package_price {
            Some(p) if p >= self.tiers.top_price => self.tiers.top_multiplier,
            Some(p) if p >= self.tiers.mid_price => self.tiers.mid_multiplier,
            Some(_) => 1.0,
            None => 1.0,
        }
    }
}

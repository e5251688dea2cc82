//! Video, gaming, and daily-task reward rules.
//!
//! Every payable rule follows the same shape: validate the gate,
//! consume the quota (a single check-then-increment step), then
//! route the credit through the ledger. The engine never mutates a
//! balance directly.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{GameRules, GamingRules, RewardConfig};
use crate::error::{CoreError, CoreResult};
use crate::ledger::{to_major, to_minor, AccountId, Amount, Transaction, TxKind, WalletKind};
use crate::platform::CoreState;
use crate::quota::{Activity, GameKind};

/// A reward claim as the request layer hands it over. Score and
/// duration come from the finished game session; the visual side of
/// the game never reaches this engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardClaim {
    WelcomeVideo,
    DailyAd { watched_secs: u32, total_secs: u32 },
    GameUnlock,
    Game { game: GameKind, score: u32, duration_secs: u32 },
    LoginBonus,
}

impl RewardClaim {
    pub fn tag(&self) -> &'static str {
        match self {
            RewardClaim::WelcomeVideo => "welcome_video",
            RewardClaim::DailyAd { .. } => "daily_ad",
            RewardClaim::GameUnlock => "game_unlock",
            RewardClaim::Game { .. } => "game",
            RewardClaim::LoginBonus => "login_bonus",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RewardReceipt {
    pub transaction: Transaction,
    /// Today's count for the governing quota after this claim.
    pub todays_count: u32,
}

/// Gaming reward in minor units, rounded to 2 decimals. The score
/// bonus is capped at the base so a runaway score can at most double
/// the base reward.
pub fn game_reward(
    gaming: &GamingRules,
    rules: &GameRules,
    score: u32,
    tier_multiplier: f64,
) -> Amount {
    let score_bonus = (score as f64 * rules.score_multiplier).min(rules.base);
    let perf_bonus = if score >= gaming.perf_bonus_score {
        gaming.perf_bonus
    } else {
        1.0
    };
    to_minor((rules.base + score_bonus) * tier_multiplier * perf_bonus)
}

fn scaled(amount: Amount, multiplier: f64) -> Amount {
    to_minor(to_major(amount) * multiplier)
}

/// A configured reward that rounds to zero minor units cannot become
/// a ledger credit; reject it before any quota slot is consumed.
fn payable(amount: Amount) -> CoreResult<Amount> {
    if amount == 0 {
        return Err(CoreError::InvalidAmount);
    }
    Ok(amount)
}

pub fn claim(
    state: &mut CoreState,
    cfg: &RewardConfig,
    account: &AccountId,
    claim: RewardClaim,
    now: DateTime<Utc>,
) -> CoreResult<RewardReceipt> {
    let today = now.date_naive();
    let acct = state.account(account)?;
    let package = acct.package.as_ref().and_then(|p| state.packages.get(p));
    let video_mult = package.map(|p| p.multipliers.videos).unwrap_or(1.0);
    let ad_mult = package.map(|p| p.multipliers.ads).unwrap_or(1.0);
    let game_mult = package.map(|p| p.multipliers.games).unwrap_or(1.0);
    let package_price = package.map(|p| p.price);

    let receipt = match claim {
        RewardClaim::WelcomeVideo => {
            if acct.welcome_video_claimed {
                return Err(CoreError::AlreadyClaimed("welcome_video".into()));
            }
            let amount = payable(scaled(cfg.video.welcome_reward, video_mult))?;
            let count = state.quotas.try_consume(account, Activity::VideoWatch, today, None, amount)?;
            let tx = state.ledger.credit(
                account,
                WalletKind::Withdrawal,
                amount,
                TxKind::VideoReward,
                "welcome video reward",
                now,
            )?;
            state.account_mut(account)?.welcome_video_claimed = true;
            RewardReceipt { transaction: tx, todays_count: count }
        }
        RewardClaim::DailyAd { watched_secs, total_secs } => {
            if total_secs == 0
                || (watched_secs as f64 / total_secs as f64) < cfg.video.min_watch_ratio
            {
                return Err(CoreError::IncompleteWatch {
                    watched: watched_secs,
                    total: total_secs,
                });
            }
            let amount = payable(scaled(cfg.video.daily_ad_reward, ad_mult))?;
            let count = state.quotas.try_consume(
                account,
                Activity::DailyAd,
                today,
                Some(cfg.video.daily_ad_cap),
                amount,
            )?;
            let tx = state.ledger.credit(
                account,
                WalletKind::Withdrawal,
                amount,
                TxKind::VideoReward,
                &format!("daily ad view #{count}"),
                now,
            )?;
            RewardReceipt { transaction: tx, todays_count: count }
        }
        RewardClaim::GameUnlock => {
            let amount = payable(scaled(cfg.video.game_unlock_reward, video_mult))?;
            let count = state.quotas.try_consume(account, Activity::VideoWatch, today, None, amount)?;
            let tx = state.ledger.credit(
                account,
                WalletKind::Withdrawal,
                amount,
                TxKind::VideoReward,
                "game unlock video reward",
                now,
            )?;
            RewardReceipt { transaction: tx, todays_count: count }
        }
        RewardClaim::Game { game, score, duration_secs } => {
            if !acct.has_active_package(today) {
                return Err(CoreError::GatingUnmet("active package required".into()));
            }
            if !acct.welcome_video_claimed {
                return Err(CoreError::GatingUnmet("welcome video not claimed".into()));
            }
            let rules = *cfg
                .gaming
                .games
                .get(&game)
                .ok_or_else(|| CoreError::UnknownActivity(format!("game:{}", game.as_str())))?;
            if duration_secs < rules.min_duration_secs {
                return Err(CoreError::DurationTooShort {
                    required_secs: rules.min_duration_secs,
                });
            }
            let tier_mult = cfg.tier_multiplier(package_price);
            let amount = payable(scaled(
                game_reward(&cfg.gaming, &rules, score, tier_mult),
                game_mult,
            ))?;
            let count = state.quotas.try_consume(
                account,
                Activity::Game(game),
                today,
                Some(rules.daily_max),
                amount,
            )?;
            let tx = state.ledger.credit(
                account,
                WalletKind::Withdrawal,
                amount,
                TxKind::GameReward,
                &format!("{} game reward, score {score}", game.as_str()),
                now,
            )?;
            RewardReceipt { transaction: tx, todays_count: count }
        }
        RewardClaim::LoginBonus => {
            let amount = payable(scaled(
                cfg.tasks.login_bonus,
                cfg.tier_multiplier(package_price),
            ))?;
            let count = state
                .quotas
                .try_consume(account, Activity::Login, today, Some(1), amount)
                .map_err(|err| match err {
                    CoreError::DailyLimitReached { .. } => {
                        CoreError::AlreadyClaimed("login_bonus".into())
                    }
                    other => other,
                })?;
            let tx = state.ledger.credit(
                account,
                WalletKind::Withdrawal,
                amount,
                TxKind::LoginBonus,
                "daily login bonus",
                now,
            )?;
            RewardReceipt { transaction: tx, todays_count: count }
        }
    };

    info!(
        %account,
        kind = ?receipt.transaction.kind,
        amount = receipt.transaction.net,
        "reward credited"
    );
    Ok(receipt)
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Login,
    Videos,
    Ads,
    Games,
    Referral,
    Transaction,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TaskProgress {
    pub task: TaskKind,
    pub target: u32,
    pub progress: u32,
    pub achieved: bool,
    /// Reward shown for the task, already amplified by tier.
    pub reward: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DailyTaskReport {
    pub account: AccountId,
    pub day: NaiveDate,
    pub multiplier: f64,
    pub tasks: Vec<TaskProgress>,
}

/// Read-only aggregate of today's progress against the configured
/// targets. Only the login bonus is independently claimable; the
/// rest is informational.
pub fn daily_tasks(
    state: &CoreState,
    cfg: &RewardConfig,
    account: &AccountId,
    day: NaiveDate,
) -> CoreResult<DailyTaskReport> {
    let acct = state.account(account)?;
    let package_price = acct
        .package
        .as_ref()
        .and_then(|p| state.packages.get(p))
        .map(|p| p.price);
    let multiplier = cfg.tier_multiplier(package_price);

    let count = |activity: &Activity| state.quotas.count(account, activity, day);
    let games_played: u32 = [GameKind::Casual, GameKind::Arcade, GameKind::Puzzle]
        .iter()
        .map(|k| count(&Activity::Game(*k)))
        .sum();

    let entry = |task: TaskKind, target: u32, progress: u32, reward: Amount| TaskProgress {
        task,
        target,
        progress,
        achieved: progress >= target,
        reward: scaled(reward, multiplier),
    };
    let tasks = vec![
        entry(TaskKind::Login, 1, count(&Activity::Login), cfg.tasks.login_bonus),
        entry(
            TaskKind::Videos,
            cfg.tasks.video_target,
            count(&Activity::VideoWatch),
            cfg.tasks.video_reward,
        ),
        entry(
            TaskKind::Ads,
            cfg.tasks.ad_target,
            count(&Activity::DailyAd),
            cfg.tasks.ad_reward,
        ),
        entry(TaskKind::Games, cfg.tasks.game_target, games_played, cfg.tasks.game_reward),
        entry(
            TaskKind::Referral,
            1,
            count(&Activity::Referral),
            cfg.tasks.referral_reward,
        ),
        entry(
            TaskKind::Transaction,
            1,
            count(&Activity::Transaction),
            cfg.tasks.transaction_reward,
        ),
    ];
    Ok(DailyTaskReport {
        account: account.clone(),
        day,
        multiplier,
        tasks,
    })
}

//! Per-account, per-activity, per-day usage counters.
//!
//! Counters are created lazily on first use and keyed by calendar
//! day, so the day boundary resets them implicitly — nothing is ever
//! zeroed. The board must only be touched inside the platform's
//! serialized scope: `try_consume` is the single check-then-increment
//! step the concurrency model requires.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::ledger::{AccountId, Amount};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    Casual,
    Arcade,
    Puzzle,
}

impl GameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::Casual => "casual",
            GameKind::Arcade => "arcade",
            GameKind::Puzzle => "puzzle",
        }
    }
}

/// Everything the tracker counts. Capped activities (ads, games) and
/// uncapped progress markers (logins, referrals) share the same board
/// so the daily task report reads from one place.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Login,
    VideoWatch,
    DailyAd,
    Game(GameKind),
    Referral,
    Transaction,
}

impl Activity {
    pub fn key_tag(&self) -> String {
        match self {
            Activity::Login => "login".into(),
            Activity::VideoWatch => "video_watch".into(),
            Activity::DailyAd => "daily_ad".into(),
            Activity::Game(kind) => format!("game:{}", kind.as_str()),
            Activity::Referral => "referral".into(),
            Activity::Transaction => "transaction".into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QuotaCounter {
    pub account: AccountId,
    pub activity: Activity,
    pub day: NaiveDate,
    pub count: u32,
    /// Total amount credited for this activity today, minor units.
    pub amount: Amount,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QuotaBoard {
    // String keys keep the board JSON-serializable.
    counters: BTreeMap<String, QuotaCounter>,
}

fn storage_key(account: &AccountId, activity: &Activity, day: NaiveDate) -> String {
    format!("{account}|{}|{day}", activity.key_tag())
}

impl QuotaBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, account: &AccountId, activity: &Activity, day: NaiveDate) -> u32 {
        self.counters
            .get(&storage_key(account, activity, day))
            .map(|c| c.count)
            .unwrap_or(0)
    }

    /// Atomic check-then-increment. Fails `DailyLimitReached` without
    /// touching the counter when the cap is already met.
    pub fn try_consume(
        &mut self,
        account: &AccountId,
        activity: Activity,
        day: NaiveDate,
        cap: Option<u32>,
        amount: Amount,
    ) -> CoreResult<u32> {
        let key = storage_key(account, &activity, day);
        let counter = self.counters.entry(key).or_insert_with(|| QuotaCounter {
            account: account.clone(),
            activity,
            day,
            count: 0,
            amount: 0,
        });
        if let Some(cap) = cap {
            if counter.count >= cap {
                return Err(CoreError::DailyLimitReached {
                    activity: activity.key_tag(),
                    cap,
                });
            }
        }
        counter.count += 1;
        counter.amount += amount;
        Ok(counter.count)
    }

    /// Uncapped progress marker (logins, referrals, transactions).
    pub fn record(&mut self, account: &AccountId, activity: Activity, day: NaiveDate) -> u32 {
        // No cap, so try_consume cannot fail.
        self.try_consume(account, activity, day, None, 0)
            .unwrap_or(0)
    }

    /// All counters an account touched on `day`.
    pub fn day_status(&self, account: &AccountId, day: NaiveDate) -> Vec<QuotaCounter> {
        self.counters
            .values()
            .filter(|c| &c.account == account && c.day == day)
            .cloned()
            .collect()
    }
}

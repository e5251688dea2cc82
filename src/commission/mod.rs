//! Level-income engine: pays upstream sponsors a percentage of each
//! downstream investment.
//!
//! Each investment event is applied at most once (keyed by the event
//! id), and each ancestor's credit is an independent atomic unit — a
//! failure partway up the chain is logged and skipped, never rolled
//! back into the payouts already made.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{PackageId, RewardConfig};
use crate::error::{CoreError, CoreResult};
use crate::ledger::{AccountId, Amount, Transaction, TxKind, WalletKind};
use crate::platform::CoreState;

pub fn event_key(event_id: &str) -> String {
    format!("invest:{event_id}")
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LevelPayout {
    pub level: u32,
    pub sponsor: AccountId,
    pub bps: u32,
    pub amount: Amount,
    pub tx_id: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    NoPackage,
    PackageExpired,
    ZeroRate,
    CreditFailed { detail: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SkippedLevel {
    pub level: u32,
    pub sponsor: AccountId,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CommissionOutcome {
    pub event_id: String,
    pub investor: AccountId,
    pub gross: Amount,
    /// True when this event id was seen before; no transactions were
    /// appended on this invocation.
    pub duplicate: bool,
    pub payouts: Vec<LevelPayout>,
    pub skipped: Vec<SkippedLevel>,
}

impl CommissionOutcome {
    pub fn total_paid(&self) -> Amount {
        self.payouts.iter().map(|p| p.amount).sum()
    }
}

/// Resolve the rate for one upline level: ancestor's package table,
/// then the investing package's table, then the system default. Only
/// a missing entry falls through; an explicit 0 silences the level.
fn resolve_bps(
    cfg: &RewardConfig,
    level_idx: usize,
    ancestor_table: Option<&[u32]>,
    investing_table: &[u32],
) -> u32 {
    let from = |table: &[u32]| table.get(level_idx).copied();
    ancestor_table
        .and_then(from)
        .or_else(|| from(investing_table))
        .or_else(|| from(&cfg.commission.default_level_bps))
        .unwrap_or(0)
}

/// Walk the investor's sponsor chain and credit level income into
/// each qualifying ancestor's upgrade wallet. Triggered once per
/// completed purchase.
pub fn on_investment(
    state: &mut CoreState,
    cfg: &RewardConfig,
    investor: &AccountId,
    gross: Amount,
    package_id: &PackageId,
    event_id: &str,
    now: DateTime<Utc>,
) -> CoreResult<CommissionOutcome> {
    if gross == 0 {
        return Err(CoreError::InvalidAmount);
    }
    state.account(investor)?;
    let investing_table = state
        .packages
        .get(package_id)
        .ok_or_else(|| CoreError::UnknownPackage(package_id.clone()))?
        .level_bps
        .clone();

    let key = event_key(event_id);
    let mut outcome = CommissionOutcome {
        event_id: event_id.to_string(),
        investor: investor.clone(),
        gross,
        duplicate: false,
        payouts: Vec::new(),
        skipped: Vec::new(),
    };
    if !state.ledger.mark_event(&key) {
        debug!(event_id, %investor, "investment event already applied");
        outcome.duplicate = true;
        return Ok(outcome);
    }

    let today = now.date_naive();
    let chain: Vec<AccountId> = state
        .referrals
        .sponsor_chain(investor, cfg.commission.max_depth)
        .collect();

    for (idx, sponsor) in chain.iter().enumerate() {
        let level = (idx + 1) as u32;
        let ancestor = state.account(sponsor)?;
        if ancestor.package.is_none() {
            outcome.skipped.push(SkippedLevel {
                level,
                sponsor: sponsor.clone(),
                reason: SkipReason::NoPackage,
            });
            continue;
        }
        if !cfg.commission.pay_expired_packages && !ancestor.has_active_package(today) {
            outcome.skipped.push(SkippedLevel {
                level,
                sponsor: sponsor.clone(),
                reason: SkipReason::PackageExpired,
            });
            continue;
        }
        let ancestor_table = ancestor
            .package
            .as_ref()
            .and_then(|p| state.packages.get(p))
            .map(|p| p.level_bps.as_slice());
        let bps = resolve_bps(cfg, idx, ancestor_table, &investing_table);
        let amount = gross * bps as u64 / 10_000;
        if bps == 0 || amount == 0 {
            outcome.skipped.push(SkippedLevel {
                level,
                sponsor: sponsor.clone(),
                reason: SkipReason::ZeroRate,
            });
            continue;
        }
        let description = format!("level {level} income on investment by {investor}");
        match state.ledger.credit(
            sponsor,
            WalletKind::Upgrade,
            amount,
            TxKind::LevelIncome,
            &description,
            now,
        ) {
            Ok(tx) => {
                debug!(%sponsor, level, amount, "level income paid");
                outcome.payouts.push(LevelPayout {
                    level,
                    sponsor: sponsor.clone(),
                    bps,
                    amount,
                    tx_id: tx.id,
                });
            }
            Err(err) => {
                // Partial completion is acceptable: earlier levels keep
                // their payouts, this one is recorded and skipped.
                warn!(%sponsor, level, %err, "level income credit failed");
                outcome.skipped.push(SkippedLevel {
                    level,
                    sponsor: sponsor.clone(),
                    reason: SkipReason::CreditFailed {
                        detail: err.to_string(),
                    },
                });
            }
        }
    }

    info!(
        %investor,
        event_id,
        gross,
        paid = outcome.total_paid(),
        levels = outcome.payouts.len(),
        "commission run complete"
    );
    Ok(outcome)
}

/// One-time fixed bonus to the immediate sponsor, triggered by the
/// referred account's first qualifying action. No-op when already
/// paid or when the account has no sponsor.
pub fn direct_referral_bonus(
    state: &mut CoreState,
    cfg: &RewardConfig,
    account: &AccountId,
    now: DateTime<Utc>,
) -> CoreResult<Option<Transaction>> {
    if state.account(account)?.direct_bonus_paid {
        return Ok(None);
    }
    let sponsor = match state.referrals.sponsor_of(account) {
        Some(s) => s.clone(),
        None => {
            state.account_mut(account)?.direct_bonus_paid = true;
            return Ok(None);
        }
    };
    let amount = cfg.commission.direct_referral_bonus;
    if amount == 0 {
        // Bonus disabled in config; still mark so a later config
        // change cannot pay retroactively.
        state.account_mut(account)?.direct_bonus_paid = true;
        return Ok(None);
    }
    let tx = state.ledger.credit(
        &sponsor,
        WalletKind::Withdrawal,
        amount,
        TxKind::DirectBonus,
        &format!("direct referral bonus for {account}"),
        now,
    )?;
    state.account_mut(account)?.direct_bonus_paid = true;
    info!(%sponsor, %account, amount, "direct referral bonus paid");
    Ok(Some(tx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PackageTier;
    use crate::platform::Account;

    fn now() -> DateTime<Utc> {
        "2026-03-01T10:00:00Z".parse().unwrap()
    }

    /// Default table trimmed to the package's three levels so the
    /// chain walk ends in a clean zero-rate skip past level 3.
    fn cfg() -> RewardConfig {
        let mut cfg = RewardConfig::default();
        cfg.commission.default_level_bps = vec![1000, 500, 250];
        cfg
    }

    fn tier(id: &str, price: Amount, level_bps: Vec<u32>) -> PackageTier {
        PackageTier {
            id: id.into(),
            name: id.to_uppercase(),
            price,
            daily_income_bps: 100,
            level_bps,
            multipliers: Default::default(),
            validity_days: None,
        }
    }

    /// Chain root -> l3 -> l2 -> l1 -> origin, everyone enrolled and
    /// holding `pkg` unless listed in `without_package`.
    fn state_with_chain(without_package: &[&str]) -> CoreState {
        let mut state = CoreState::default();
        state
            .packages
            .insert("basic".into(), tier("basic", 1000_00, vec![1000, 500, 250]));
        let mut code = None;
        for id in ["root", "l3", "l2", "l1", "origin"] {
            let referral_code = state
                .referrals
                .enroll(&id.to_string(), code.as_deref())
                .unwrap();
            state.ledger.open_account(&id.to_string());
            let mut account = Account::new(id.into(), referral_code.clone(), now().date_naive());
            if !without_package.contains(&id) {
                account.package = Some("basic".into());
            }
            state.accounts.insert(id.into(), account);
            code = Some(referral_code);
        }
        state
    }

    #[test]
    fn pays_each_level_from_the_nearest_sponsor_up() {
        let mut state = state_with_chain(&[]);
        let cfg = cfg();
        let outcome = on_investment(
            &mut state,
            &cfg,
            &"origin".into(),
            1000_00,
            &"basic".into(),
            "evt-1",
            now(),
        )
        .unwrap();
        assert!(!outcome.duplicate);
        assert_eq!(outcome.payouts.len(), 3);
        assert_eq!(outcome.payouts[0].sponsor, "l1");
        assert_eq!(outcome.payouts[0].amount, 100_00); // 10%
        assert_eq!(outcome.payouts[1].amount, 50_00); // 5%
        assert_eq!(outcome.payouts[2].amount, 25_00); // 2.5%
        assert_eq!(state.ledger.balances(&"l1".into()).unwrap().upgrade, 100_00);
        // Bounded by the applied percentages.
        assert!(outcome.total_paid() <= 1000_00 * (1000 + 500 + 250) / 10_000);
    }

    #[test]
    fn reinvoking_the_same_event_adds_zero_transactions() {
        let mut state = state_with_chain(&[]);
        let cfg = cfg();
        let origin: AccountId = "origin".into();
        on_investment(&mut state, &cfg, &origin, 1000_00, &"basic".into(), "evt-1", now()).unwrap();
        let txs_before = state.ledger.transactions().len();
        let second =
            on_investment(&mut state, &cfg, &origin, 1000_00, &"basic".into(), "evt-1", now())
                .unwrap();
        assert!(second.duplicate);
        assert!(second.payouts.is_empty());
        assert_eq!(state.ledger.transactions().len(), txs_before);
        assert_eq!(state.ledger.balances(&"l1".into()).unwrap().upgrade, 100_00);
    }

    #[test]
    fn ancestor_without_package_is_skipped_not_fatal() {
        let mut state = state_with_chain(&["l2"]);
        let cfg = cfg();
        let outcome = on_investment(
            &mut state,
            &cfg,
            &"origin".into(),
            1000_00,
            &"basic".into(),
            "evt-1",
            now(),
        )
        .unwrap();
        assert_eq!(outcome.payouts.len(), 2);
        assert_eq!(
            outcome.skipped[0],
            SkippedLevel {
                level: 2,
                sponsor: "l2".into(),
                reason: SkipReason::NoPackage,
            }
        );
        // Level numbering is positional: l3 still gets the level-3 rate.
        assert_eq!(outcome.payouts[1].sponsor, "l3");
        assert_eq!(outcome.payouts[1].amount, 25_00);
    }

    #[test]
    fn expired_package_pays_only_when_configured() {
        let mut state = state_with_chain(&[]);
        state.accounts.get_mut("l1").unwrap().package_expires =
            Some("2026-02-01".parse().unwrap());
        let mut cfg = cfg();
        let outcome = on_investment(
            &mut state,
            &cfg,
            &"origin".into(),
            1000_00,
            &"basic".into(),
            "evt-1",
            now(),
        )
        .unwrap();
        assert!(matches!(
            outcome.skipped[0].reason,
            SkipReason::PackageExpired
        ));

        cfg.commission.pay_expired_packages = true;
        let outcome = on_investment(
            &mut state,
            &cfg,
            &"origin".into(),
            1000_00,
            &"basic".into(),
            "evt-2",
            now(),
        )
        .unwrap();
        assert_eq!(outcome.payouts[0].sponsor, "l1");
    }

    #[test]
    fn rate_falls_back_to_investing_table_then_default() {
        let cfg = RewardConfig::default();
        // Ancestor table defines the level: it wins.
        assert_eq!(resolve_bps(&cfg, 0, Some(&[700]), &[1000]), 700);
        // Ancestor table too short: investing table.
        assert_eq!(resolve_bps(&cfg, 1, Some(&[700]), &[1000, 400]), 400);
        // An explicit 0 is a decision, not a gap: the level stays mute.
        assert_eq!(resolve_bps(&cfg, 0, Some(&[0]), &[1000]), 0);
        assert_eq!(resolve_bps(&cfg, 0, None, &[0]), 0);
        // Nothing anywhere: no payout.
        assert_eq!(resolve_bps(&cfg, 20, Some(&[700]), &[1000]), 0);
    }

    #[test]
    fn explicit_zero_rate_silences_the_level() {
        let mut state = state_with_chain(&[]);
        // l1's own package opts out of level-1 income.
        state
            .packages
            .insert("mute".into(), tier("mute", 1000_00, vec![0, 500, 250]));
        state.accounts.get_mut("l1").unwrap().package = Some("mute".into());
        let outcome = on_investment(
            &mut state,
            &cfg(),
            &"origin".into(),
            1000_00,
            &"basic".into(),
            "evt-1",
            now(),
        )
        .unwrap();
        assert_eq!(
            outcome.skipped[0],
            SkippedLevel {
                level: 1,
                sponsor: "l1".into(),
                reason: SkipReason::ZeroRate,
            }
        );
        assert_eq!(state.ledger.balances(&"l1".into()).unwrap().upgrade, 0);
        assert_eq!(outcome.payouts.len(), 2);
        assert_eq!(outcome.payouts[0].sponsor, "l2");
    }

    #[test]
    fn direct_bonus_is_paid_exactly_once() {
        let mut state = state_with_chain(&[]);
        let cfg = cfg();
        let origin: AccountId = "origin".into();
        let first = direct_referral_bonus(&mut state, &cfg, &origin, now()).unwrap();
        assert_eq!(first.unwrap().net, cfg.commission.direct_referral_bonus);
        assert_eq!(
            state.ledger.balances(&"l1".into()).unwrap().withdrawal,
            cfg.commission.direct_referral_bonus
        );
        assert!(direct_referral_bonus(&mut state, &cfg, &origin, now())
            .unwrap()
            .is_none());
        // Root has no sponsor: marked, nothing paid.
        assert!(direct_referral_bonus(&mut state, &cfg, &"root".into(), now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn disabled_direct_bonus_is_a_silent_no_op() {
        let mut state = state_with_chain(&[]);
        let mut cfg = cfg();
        cfg.commission.direct_referral_bonus = 0;
        let origin: AccountId = "origin".into();
        assert!(direct_referral_bonus(&mut state, &cfg, &origin, now())
            .unwrap()
            .is_none());
        assert_eq!(state.ledger.balances(&"l1".into()).unwrap().withdrawal, 0);
        // The account is still marked: a later config change cannot
        // pay the bonus retroactively.
        assert!(state.accounts["origin"].direct_bonus_paid);
        cfg.commission.direct_referral_bonus = 50_00;
        assert!(direct_referral_bonus(&mut state, &cfg, &origin, now())
            .unwrap()
            .is_none());
    }
}

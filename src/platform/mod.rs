//! Operation surface handed to request handlers.
//!
//! All state lives in one `CoreState` behind a mutex, so every
//! read-modify-write operation runs under serializable isolation and
//! quota check-then-increment is atomic by construction. Operations
//! are short synchronous units; transient failures are retried a
//! bounded number of times before surfacing.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::commission::{self, CommissionOutcome};
use crate::config::{PackageId, PackageTier, RewardConfig};
use crate::error::{CoreError, CoreResult};
use crate::ledger::{
    AccountId, Amount, LedgerBook, Transaction, TxKind, WalletKind, WalletSet,
};
use crate::quota::{Activity, QuotaBoard, QuotaCounter};
use crate::referral::ReferralForest;
use crate::rewards::{self, DailyTaskReport, RewardClaim, RewardReceipt};
use crate::withdrawal::{self, WithdrawalLog, WithdrawalRequest};

const MAX_OP_RETRIES: u32 = 3;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub referral_code: String,
    pub package: Option<PackageId>,
    pub package_expires: Option<NaiveDate>,
    pub welcome_video_claimed: bool,
    pub direct_bonus_paid: bool,
    pub joined: NaiveDate,
}

impl Account {
    pub fn new(id: AccountId, referral_code: String, joined: NaiveDate) -> Self {
        Self {
            id,
            referral_code,
            package: None,
            package_expires: None,
            welcome_video_claimed: false,
            direct_bonus_paid: false,
            joined,
        }
    }

    /// Holds a package that has not lapsed as of `today`.
    pub fn has_active_package(&self, today: NaiveDate) -> bool {
        self.package.is_some() && self.package_expires.map_or(true, |d| d >= today)
    }
}

/// The whole persisted world: accounts, the package catalog, and the
/// three leaf stores. Serializes to a single JSON snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CoreState {
    pub accounts: BTreeMap<AccountId, Account>,
    pub packages: BTreeMap<PackageId, PackageTier>,
    pub ledger: LedgerBook,
    pub referrals: ReferralForest,
    pub quotas: QuotaBoard,
    pub withdrawals: WithdrawalLog,
}

impl CoreState {
    pub fn account(&self, id: &AccountId) -> CoreResult<&Account> {
        self.accounts
            .get(id)
            .ok_or_else(|| CoreError::UnknownAccount(id.clone()))
    }

    pub fn account_mut(&mut self, id: &AccountId) -> CoreResult<&mut Account> {
        self.accounts
            .get_mut(id)
            .ok_or_else(|| CoreError::UnknownAccount(id.clone()))
    }
}

/// Everything a completed purchase set in motion.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PurchaseOutcome {
    pub investment: Transaction,
    pub commission: CommissionOutcome,
    pub direct_bonus: Option<Transaction>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TeamLevelStats {
    pub level: u32,
    pub size: usize,
    /// Members holding any package.
    pub active: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TeamReport {
    pub account: AccountId,
    pub total: usize,
    pub levels: Vec<TeamLevelStats>,
}

pub struct Platform {
    config: RewardConfig,
    state: Mutex<CoreState>,
}

impl Platform {
    pub fn new(config: RewardConfig) -> Self {
        Self::with_state(config, CoreState::default())
    }

    pub fn with_state(config: RewardConfig, state: CoreState) -> Self {
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    fn lock(&self) -> CoreResult<MutexGuard<'_, CoreState>> {
        // A poisoned mutex means a writer panicked mid-operation; the
        // state may be torn, so surface it as transient and let the
        // caller decide whether to rebuild from the snapshot.
        self.state.lock().map_err(|_| CoreError::Conflict)
    }

    /// Run a state operation, retrying transient failures.
    fn run<T>(&self, mut op: impl FnMut(&mut CoreState) -> CoreResult<T>) -> CoreResult<T> {
        let mut last = CoreError::Conflict;
        for _ in 0..MAX_OP_RETRIES {
            match self.lock() {
                Ok(mut state) => match op(&mut state) {
                    Err(err) if err.is_transient() => last = err,
                    other => return other,
                },
                Err(err) => last = err,
            }
        }
        Err(last)
    }

    fn read<T>(&self, op: impl FnOnce(&CoreState) -> CoreResult<T>) -> CoreResult<T> {
        let state = self.lock()?;
        op(&state)
    }

    // ---- accounts & referral graph ----

    /// Create an account, optionally under a sponsor's referral code,
    /// and return its own freshly generated code.
    pub fn register(&self, id: &AccountId, sponsor_code: Option<&str>) -> CoreResult<Account> {
        self.register_at(id, sponsor_code, Utc::now())
    }

    pub fn register_at(
        &self,
        id: &AccountId,
        sponsor_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<Account> {
        self.run(|state| {
            if state.accounts.contains_key(id) {
                return Err(CoreError::DuplicateAccount(id.clone()));
            }
            let code = state.referrals.enroll(id, sponsor_code)?;
            state.ledger.open_account(id);
            let account = Account::new(id.clone(), code, now.date_naive());
            state.accounts.insert(id.clone(), account.clone());
            if let Some(sponsor) = state.referrals.sponsor_of(id).cloned() {
                // The sponsor's "1 referral" daily task.
                state.quotas.record(&sponsor, Activity::Referral, now.date_naive());
            }
            info!(%id, code = %account.referral_code, "account registered");
            Ok(account)
        })
    }

    pub fn account(&self, id: &AccountId) -> CoreResult<Account> {
        self.read(|state| state.account(id).cloned())
    }

    pub fn add_package(&self, tier: PackageTier) -> CoreResult<()> {
        self.run(|state| {
            state.packages.insert(tier.id.clone(), tier.clone());
            Ok(())
        })
    }

    pub fn sponsor_chain(&self, id: &AccountId, max_depth: usize) -> CoreResult<Vec<AccountId>> {
        self.read(|state| {
            state.account(id)?;
            Ok(state.referrals.sponsor_chain(id, max_depth).collect())
        })
    }

    pub fn team_report(&self, id: &AccountId, max_depth: usize) -> CoreResult<TeamReport> {
        self.read(|state| {
            state.account(id)?;
            let levels: Vec<TeamLevelStats> = state
                .referrals
                .subtree(id, max_depth)
                .into_iter()
                .map(|level| TeamLevelStats {
                    level: level.level,
                    size: level.members.len(),
                    active: level
                        .members
                        .iter()
                        .filter(|m| {
                            state.accounts.get(*m).map_or(false, |a| a.package.is_some())
                        })
                        .count(),
                })
                .collect();
            Ok(TeamReport {
                account: id.clone(),
                total: levels.iter().map(|l| l.size).sum(),
                levels,
            })
        })
    }

    // ---- ledger passthroughs ----

    pub fn credit(
        &self,
        id: &AccountId,
        wallet: WalletKind,
        amount: Amount,
        description: &str,
    ) -> CoreResult<Transaction> {
        self.run(|state| {
            state
                .ledger
                .credit(id, wallet, amount, TxKind::ManualCredit, description, Utc::now())
        })
    }

    pub fn debit(
        &self,
        id: &AccountId,
        wallet: WalletKind,
        amount: Amount,
        description: &str,
    ) -> CoreResult<Transaction> {
        self.run(|state| {
            state
                .ledger
                .debit(id, wallet, amount, TxKind::ManualDebit, description, Utc::now())
        })
    }

    pub fn transfer(
        &self,
        id: &AccountId,
        from: WalletKind,
        to: WalletKind,
        amount: Amount,
    ) -> CoreResult<(Transaction, Transaction)> {
        self.run(|state| {
            let pair = state.ledger.transfer(id, from, to, amount, Utc::now())?;
            state.quotas.record(id, Activity::Transaction, Utc::now().date_naive());
            Ok(pair)
        })
    }

    pub fn balances(&self, id: &AccountId) -> CoreResult<WalletSet> {
        self.read(|state| state.ledger.balances(id))
    }

    pub fn history(
        &self,
        id: &AccountId,
        day: Option<NaiveDate>,
        kind: Option<TxKind>,
    ) -> CoreResult<Vec<Transaction>> {
        self.read(|state| {
            state.account(id)?;
            Ok(state.ledger.history(id, day, kind).cloned().collect())
        })
    }

    // ---- investments & commission ----

    /// Complete a package purchase: debit the upgrade wallet, assign
    /// the package, then run level income and the one-time direct
    /// referral bonus. Idempotent per `event_id`.
    pub fn buy_package(
        &self,
        id: &AccountId,
        package_id: &PackageId,
        event_id: &str,
    ) -> CoreResult<PurchaseOutcome> {
        self.buy_package_at(id, package_id, event_id, Utc::now())
    }

    pub fn buy_package_at(
        &self,
        id: &AccountId,
        package_id: &PackageId,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<PurchaseOutcome> {
        self.run(|state| {
            if state.ledger.event_applied(&commission::event_key(event_id)) {
                return Err(CoreError::AlreadyClaimed(format!(
                    "investment event {event_id}"
                )));
            }
            let tier = state
                .packages
                .get(package_id)
                .ok_or_else(|| CoreError::UnknownPackage(package_id.clone()))?
                .clone();
            let investment = state.ledger.debit(
                id,
                WalletKind::Upgrade,
                tier.price,
                TxKind::Investment,
                &format!("purchase of package {}", tier.name),
                now,
            )?;
            let account = state.account_mut(id)?;
            account.package = Some(package_id.clone());
            account.package_expires = tier
                .validity_days
                .map(|d| now.date_naive() + chrono::Days::new(d as u64));
            state.quotas.record(id, Activity::Transaction, now.date_naive());

            let commission = commission::on_investment(
                state,
                &self.config,
                id,
                tier.price,
                package_id,
                event_id,
                now,
            )?;
            // First qualifying action for the referred account.
            let direct_bonus =
                commission::direct_referral_bonus(state, &self.config, id, now)?;
            Ok(PurchaseOutcome {
                investment: investment.clone(),
                commission,
                direct_bonus,
            })
        })
    }

    // ---- rewards & quotas ----

    pub fn claim_reward(&self, id: &AccountId, claim: RewardClaim) -> CoreResult<RewardReceipt> {
        self.claim_reward_at(id, claim, Utc::now())
    }

    pub fn claim_reward_at(
        &self,
        id: &AccountId,
        claim: RewardClaim,
        now: DateTime<Utc>,
    ) -> CoreResult<RewardReceipt> {
        self.run(|state| rewards::claim(state, &self.config, id, claim.clone(), now))
    }

    pub fn daily_tasks(&self, id: &AccountId, day: NaiveDate) -> CoreResult<DailyTaskReport> {
        self.read(|state| rewards::daily_tasks(state, &self.config, id, day))
    }

    pub fn quota_status(&self, id: &AccountId, day: NaiveDate) -> CoreResult<Vec<QuotaCounter>> {
        self.read(|state| {
            state.account(id)?;
            Ok(state.quotas.day_status(id, day))
        })
    }

    // ---- withdrawals ----

    pub fn submit_withdrawal(
        &self,
        id: &AccountId,
        gross: Amount,
        destination: &str,
    ) -> CoreResult<WithdrawalRequest> {
        self.submit_withdrawal_at(id, gross, destination, Utc::now())
    }

    pub fn submit_withdrawal_at(
        &self,
        id: &AccountId,
        gross: Amount,
        destination: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<WithdrawalRequest> {
        self.run(|state| withdrawal::submit(state, &self.config, id, gross, destination, now))
    }

    pub fn decide_withdrawal(
        &self,
        request_id: &Uuid,
        approve: bool,
        operator: &str,
        notes: Option<&str>,
    ) -> CoreResult<WithdrawalRequest> {
        self.run(|state| {
            withdrawal::decide(state, request_id, approve, operator, notes, Utc::now())
        })
    }

    pub fn mark_processed(&self, request_id: &Uuid, operator: &str) -> CoreResult<WithdrawalRequest> {
        self.run(|state| withdrawal::mark_processed(state, request_id, operator, Utc::now()))
    }

    pub fn withdrawals_of(&self, id: &AccountId) -> CoreResult<Vec<WithdrawalRequest>> {
        self.read(|state| {
            state.account(id)?;
            Ok(state.withdrawals.by_account(id, None).cloned().collect())
        })
    }

    // ---- snapshot persistence ----

    pub fn snapshot(&self) -> CoreResult<CoreState> {
        self.read(|state| Ok(state.clone()))
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let state = self.snapshot()?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create snapshot {}", path.display()))?;
        serde_json::to_writer_pretty(file, &state).context("encode snapshot")?;
        Ok(())
    }

    pub fn load_from(path: &Path, config: RewardConfig) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("open snapshot {}", path.display()))?;
        let state: CoreState = serde_json::from_reader(file).context("decode snapshot")?;
        Ok(Self::with_state(config, state))
    }
}

//! Durable wallets plus an append-only transaction log.
//!
//! Every balance mutation in the system goes through `credit`,
//! `debit`, or `transfer` — never through a whole-record save. Each
//! mutation appends exactly one completed `Transaction`, so a wallet
//! balance always equals the sum of its transaction deltas.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

pub type AccountId = String;
pub type Amount = u64;

/// 1 major unit = 100 minor units; all `Amount`s are minor units.
pub const MONEY_SCALE: u64 = 100;

/// Convert a major-unit value to minor units, rounding to 2 decimals.
pub fn to_minor(major: f64) -> Amount {
    (major * MONEY_SCALE as f64).round().max(0.0) as Amount
}

pub fn to_major(minor: Amount) -> f64 {
    minor as f64 / MONEY_SCALE as f64
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    /// Funds only spendable on package purchases.
    Upgrade,
    /// Funds eligible for withdrawal.
    Withdrawal,
}

impl WalletKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletKind::Upgrade => "upgrade",
            WalletKind::Withdrawal => "withdrawal",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Investment,
    LevelIncome,
    DirectBonus,
    VideoReward,
    GameReward,
    TaskReward,
    LoginBonus,
    WithdrawalDebit,
    WithdrawalRefund,
    TransferOut,
    TransferIn,
    ManualCredit,
    ManualDebit,
}

impl TxKind {
    /// Earning kinds feed the lifetime-earnings total that the
    /// withdrawal daily cap is computed from.
    pub fn is_earning(&self) -> bool {
        matches!(
            self,
            TxKind::LevelIncome
                | TxKind::DirectBonus
                | TxKind::VideoReward
                | TxKind::GameReward
                | TxKind::TaskReward
                | TxKind::LoginBonus
        )
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TxDirection {
    Credit,
    Debit,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Completed,
}

/// Immutable, append-only ledger entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub account: AccountId,
    pub wallet: WalletKind,
    pub kind: TxKind,
    pub direction: TxDirection,
    pub gross: Amount,
    pub tax: Amount,
    pub net: Amount,
    pub status: TxStatus,
    pub description: String,
    pub day: NaiveDate,
    pub at: DateTime<Utc>,
}

impl Transaction {
    /// Signed wallet delta: credits add net, debits remove gross.
    pub fn signed_delta(&self) -> i64 {
        match self.direction {
            TxDirection::Credit => self.net as i64,
            TxDirection::Debit => -(self.gross as i64),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletSet {
    pub upgrade: Amount,
    pub withdrawal: Amount,
    /// Sum of all earning credits, across both wallets.
    pub lifetime_earned: Amount,
}

impl WalletSet {
    pub fn balance(&self, wallet: WalletKind) -> Amount {
        match wallet {
            WalletKind::Upgrade => self.upgrade,
            WalletKind::Withdrawal => self.withdrawal,
        }
    }

    fn balance_mut(&mut self, wallet: WalletKind) -> &mut Amount {
        match wallet {
            WalletKind::Upgrade => &mut self.upgrade,
            WalletKind::Withdrawal => &mut self.withdrawal,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LedgerBook {
    wallets: BTreeMap<AccountId, WalletSet>,
    transactions: Vec<Transaction>,
    /// Idempotency keys of already-applied external events.
    applied_events: BTreeSet<String>,
}

impl LedgerBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_account(&mut self, account: &AccountId) {
        self.wallets.entry(account.clone()).or_default();
    }

    pub fn balances(&self, account: &AccountId) -> CoreResult<WalletSet> {
        self.wallets
            .get(account)
            .copied()
            .ok_or_else(|| CoreError::UnknownAccount(account.clone()))
    }

    pub fn credit(
        &mut self,
        account: &AccountId,
        wallet: WalletKind,
        amount: Amount,
        kind: TxKind,
        description: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Transaction> {
        if amount == 0 {
            return Err(CoreError::InvalidAmount);
        }
        let set = self
            .wallets
            .get_mut(account)
            .ok_or_else(|| CoreError::UnknownAccount(account.clone()))?;
        *set.balance_mut(wallet) += amount;
        if kind.is_earning() {
            set.lifetime_earned += amount;
        }
        let tx = Transaction {
            id: Uuid::new_v4(),
            account: account.clone(),
            wallet,
            kind,
            direction: TxDirection::Credit,
            gross: amount,
            tax: 0,
            net: amount,
            status: TxStatus::Completed,
            description: description.to_string(),
            day: now.date_naive(),
            at: now,
        };
        self.transactions.push(tx.clone());
        Ok(tx)
    }

    pub fn debit(
        &mut self,
        account: &AccountId,
        wallet: WalletKind,
        amount: Amount,
        kind: TxKind,
        description: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Transaction> {
        self.debit_withheld(account, wallet, amount, 0, kind, description, now)
    }

    /// Debit with tax recorded on the entry. The wallet is reduced by
    /// the full gross; `tax`/`net` only document the split.
    #[allow(clippy::too_many_arguments)]
    pub fn debit_withheld(
        &mut self,
        account: &AccountId,
        wallet: WalletKind,
        gross: Amount,
        tax: Amount,
        kind: TxKind,
        description: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Transaction> {
        if gross == 0 || tax > gross {
            return Err(CoreError::InvalidAmount);
        }
        let set = self
            .wallets
            .get_mut(account)
            .ok_or_else(|| CoreError::UnknownAccount(account.clone()))?;
        let balance = set.balance_mut(wallet);
        if *balance < gross {
            return Err(CoreError::InsufficientFunds {
                wallet: wallet.as_str().into(),
                available: *balance,
                requested: gross,
            });
        }
        *balance -= gross;
        let tx = Transaction {
            id: Uuid::new_v4(),
            account: account.clone(),
            wallet,
            kind,
            direction: TxDirection::Debit,
            gross,
            tax,
            net: gross - tax,
            status: TxStatus::Completed,
            description: description.to_string(),
            day: now.date_naive(),
            at: now,
        };
        self.transactions.push(tx.clone());
        Ok(tx)
    }

    /// Atomic debit+credit between two wallets of one account. The
    /// funds check happens before either side mutates, so a failure
    /// leaves both wallets untouched.
    pub fn transfer(
        &mut self,
        account: &AccountId,
        from: WalletKind,
        to: WalletKind,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> CoreResult<(Transaction, Transaction)> {
        if from == to {
            return Err(CoreError::SameWallet);
        }
        if amount == 0 {
            return Err(CoreError::InvalidAmount);
        }
        let set = self.balances(account)?;
        if set.balance(from) < amount {
            return Err(CoreError::InsufficientFunds {
                wallet: from.as_str().into(),
                available: set.balance(from),
                requested: amount,
            });
        }
        let out = self.debit(
            account,
            from,
            amount,
            TxKind::TransferOut,
            &format!("transfer to {} wallet", to.as_str()),
            now,
        )?;
        let inn = self.credit(
            account,
            to,
            amount,
            TxKind::TransferIn,
            &format!("transfer from {} wallet", from.as_str()),
            now,
        )?;
        Ok((out, inn))
    }

    /// Record an external event key; returns false when it was
    /// already applied. Backs commission idempotency.
    pub fn mark_event(&mut self, key: &str) -> bool {
        self.applied_events.insert(key.to_string())
    }

    pub fn event_applied(&self, key: &str) -> bool {
        self.applied_events.contains(key)
    }

    pub fn history<'a>(
        &'a self,
        account: &'a AccountId,
        day: Option<NaiveDate>,
        kind: Option<TxKind>,
    ) -> impl Iterator<Item = &'a Transaction> + 'a {
        self.transactions.iter().filter(move |tx| {
            &tx.account == account
                && day.map_or(true, |d| tx.day == d)
                && kind.map_or(true, |k| tx.kind == k)
        })
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2026-03-01T10:00:00Z".parse().unwrap()
    }

    fn book_with(account: &str, upgrade: Amount, withdrawal: Amount) -> (LedgerBook, AccountId) {
        let mut book = LedgerBook::new();
        let id: AccountId = account.into();
        book.open_account(&id);
        if upgrade > 0 {
            book.credit(&id, WalletKind::Upgrade, upgrade, TxKind::ManualCredit, "seed", now())
                .unwrap();
        }
        if withdrawal > 0 {
            book.credit(&id, WalletKind::Withdrawal, withdrawal, TxKind::ManualCredit, "seed", now())
                .unwrap();
        }
        (book, id)
    }

    #[test]
    fn balance_equals_sum_of_transaction_deltas() {
        let (mut book, id) = book_with("a-1", 0, 0);
        book.credit(&id, WalletKind::Withdrawal, 500, TxKind::VideoReward, "ad", now())
            .unwrap();
        book.credit(&id, WalletKind::Withdrawal, 250, TxKind::GameReward, "game", now())
            .unwrap();
        book.debit(&id, WalletKind::Withdrawal, 300, TxKind::WithdrawalDebit, "wd", now())
            .unwrap();
        let sum: i64 = book
            .history(&id, None, None)
            .filter(|tx| tx.wallet == WalletKind::Withdrawal)
            .map(|tx| tx.signed_delta())
            .sum();
        assert_eq!(sum, 450);
        assert_eq!(book.balances(&id).unwrap().withdrawal, 450);
    }

    #[test]
    fn zero_amount_is_rejected() {
        let (mut book, id) = book_with("a-1", 100, 0);
        let err = book
            .credit(&id, WalletKind::Upgrade, 0, TxKind::ManualCredit, "x", now())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidAmount));
    }

    #[test]
    fn debit_rejects_rather_than_clamps() {
        let (mut book, id) = book_with("a-1", 100, 0);
        let err = book
            .debit(&id, WalletKind::Upgrade, 101, TxKind::ManualDebit, "x", now())
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientFunds {
                available: 100,
                requested: 101,
                ..
            }
        ));
        assert_eq!(book.balances(&id).unwrap().upgrade, 100);
    }

    #[test]
    fn transfer_is_all_or_nothing() {
        let (mut book, id) = book_with("a-1", 100, 0);
        assert!(matches!(
            book.transfer(&id, WalletKind::Upgrade, WalletKind::Upgrade, 50, now()),
            Err(CoreError::SameWallet)
        ));
        assert!(book
            .transfer(&id, WalletKind::Upgrade, WalletKind::Withdrawal, 150, now())
            .is_err());
        // Failed attempts left no partial state behind.
        let set = book.balances(&id).unwrap();
        assert_eq!((set.upgrade, set.withdrawal), (100, 0));
        book.transfer(&id, WalletKind::Upgrade, WalletKind::Withdrawal, 60, now())
            .unwrap();
        let set = book.balances(&id).unwrap();
        assert_eq!((set.upgrade, set.withdrawal), (40, 60));
    }

    #[test]
    fn lifetime_earnings_track_earning_credits_only() {
        let (mut book, id) = book_with("a-1", 0, 0);
        book.credit(&id, WalletKind::Upgrade, 1000, TxKind::LevelIncome, "L1", now())
            .unwrap();
        book.credit(&id, WalletKind::Withdrawal, 500, TxKind::ManualCredit, "topup", now())
            .unwrap();
        assert_eq!(book.balances(&id).unwrap().lifetime_earned, 1000);
    }

    #[test]
    fn event_keys_apply_once() {
        let mut book = LedgerBook::new();
        assert!(book.mark_event("invest:evt-1"));
        assert!(!book.mark_event("invest:evt-1"));
        assert!(book.event_applied("invest:evt-1"));
    }

    #[test]
    fn minor_conversion_rounds_to_two_decimals() {
        assert_eq!(to_minor(1.2), 120);
        assert_eq!(to_minor(0.005), 1);
        assert_eq!(to_minor(0.0049), 0);
        assert_eq!(to_major(450), 4.5);
    }
}

//! Compensation-and-reward ledger core.
//!
//! The crate keeps the money honest for a referral platform: durable
//! wallets with an append-only transaction log, a sponsor forest with
//! multi-level commission payouts, per-day reward quotas, and a
//! withdrawal state machine with tax withholding. Request handling,
//! authentication, and game mechanics stay outside; handlers call in
//! with a verified account id and get typed results back.

pub mod commission;
pub mod config;
pub mod error;
pub mod ledger;
pub mod platform;
pub mod quota;
pub mod referral;
pub mod rewards;
pub mod withdrawal;

pub use config::{PackageTier, RewardConfig};
pub use error::{CoreError, CoreResult, ErrorClass};
pub use ledger::{AccountId, Amount, Transaction, TxKind, WalletKind, MONEY_SCALE};
pub use platform::{Account, CoreState, Platform, PurchaseOutcome};
pub use quota::{Activity, GameKind, QuotaCounter};
pub use rewards::{DailyTaskReport, RewardClaim, RewardReceipt};
pub use withdrawal::{WithdrawalRequest, WithdrawalStatus};

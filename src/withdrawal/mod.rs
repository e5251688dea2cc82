//! Withdrawal request state machine with tax withholding.
//!
//! Submitting reserves the gross amount by debiting the withdrawal
//! wallet immediately; a rejection refunds it exactly once. Payout
//! execution is simulated — `mark_processed` is where a real gateway
//! call would happen.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::RewardConfig;
use crate::error::{CoreError, CoreResult};
use crate::ledger::{AccountId, Amount, TxKind, WalletKind};
use crate::platform::CoreState;
use crate::quota::Activity;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
    Processed,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Rejected => "rejected",
            WithdrawalStatus::Processed => "processed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Rejected | WithdrawalStatus::Processed)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub account: AccountId,
    pub gross: Amount,
    pub tax: Amount,
    pub net: Amount,
    pub destination: String,
    pub status: WithdrawalStatus,
    pub created: DateTime<Utc>,
    pub decided: Option<DateTime<Utc>>,
    pub processed: Option<DateTime<Utc>>,
    pub operator: Option<String>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct WithdrawalLog {
    requests: BTreeMap<Uuid, WithdrawalRequest>,
}

impl WithdrawalLog {
    pub fn get(&self, id: &Uuid) -> CoreResult<&WithdrawalRequest> {
        self.requests
            .get(id)
            .ok_or_else(|| CoreError::UnknownRequest(id.to_string()))
    }

    fn get_mut(&mut self, id: &Uuid) -> CoreResult<&mut WithdrawalRequest> {
        self.requests
            .get_mut(id)
            .ok_or_else(|| CoreError::UnknownRequest(id.to_string()))
    }

    pub fn by_account<'a>(
        &'a self,
        account: &'a AccountId,
        status: Option<WithdrawalStatus>,
    ) -> impl Iterator<Item = &'a WithdrawalRequest> + 'a {
        self.requests
            .values()
            .filter(move |r| &r.account == account && status.map_or(true, |s| r.status == s))
    }

    /// Gross total of requests the account opened on `day` that are
    /// still consuming allowance (everything but rejected).
    pub fn day_total(&self, account: &AccountId, day: NaiveDate) -> Amount {
        self.requests
            .values()
            .filter(|r| {
                &r.account == account
                    && r.created.date_naive() == day
                    && r.status != WithdrawalStatus::Rejected
            })
            .map(|r| r.gross)
            .sum()
    }
}

/// Validate and open a withdrawal request, reserving the gross amount.
pub fn submit(
    state: &mut CoreState,
    cfg: &RewardConfig,
    account: &AccountId,
    gross: Amount,
    destination: &str,
    now: DateTime<Utc>,
) -> CoreResult<WithdrawalRequest> {
    if gross == 0 {
        return Err(CoreError::InvalidAmount);
    }
    if gross < cfg.withdrawal.minimum {
        return Err(CoreError::BelowMinimum {
            minimum: cfg.withdrawal.minimum,
        });
    }
    if gross > cfg.withdrawal.maximum {
        return Err(CoreError::AboveMaximum {
            maximum: cfg.withdrawal.maximum,
        });
    }
    let today = now.date_naive();
    if !state.account(account)?.has_active_package(today) {
        return Err(CoreError::NoActivePackage);
    }
    let balances = state.ledger.balances(account)?;
    if balances.withdrawal < gross {
        return Err(CoreError::InsufficientFunds {
            wallet: WalletKind::Withdrawal.as_str().into(),
            available: balances.withdrawal,
            requested: gross,
        });
    }
    let cap = balances.lifetime_earned * cfg.withdrawal.daily_cap_bps as u64 / 10_000;
    let attempted = state.withdrawals.day_total(account, today) + gross;
    if attempted > cap {
        return Err(CoreError::DailyCapExceeded { attempted, cap });
    }

    let tax = gross * cfg.withdrawal.tds_bps as u64 / 10_000;
    let net = gross - tax;
    let request = WithdrawalRequest {
        id: Uuid::new_v4(),
        account: account.clone(),
        gross,
        tax,
        net,
        destination: destination.to_string(),
        status: WithdrawalStatus::Pending,
        created: now,
        decided: None,
        processed: None,
        operator: None,
        notes: None,
    };
    state.ledger.debit_withheld(
        account,
        WalletKind::Withdrawal,
        gross,
        tax,
        TxKind::WithdrawalDebit,
        &format!("withdrawal request {} (reserved)", request.id),
        now,
    )?;
    state.quotas.record(account, Activity::Transaction, today);
    state.withdrawals.requests.insert(request.id, request.clone());
    info!(%account, id = %request.id, gross, tax, net, "withdrawal submitted");
    Ok(request)
}

/// Approve or reject a pending request. Approval keeps the funds
/// reserved; rejection refunds the gross exactly once. Re-rejecting
/// an already-rejected request is a no-op.
pub fn decide(
    state: &mut CoreState,
    request_id: &Uuid,
    approve: bool,
    operator: &str,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> CoreResult<WithdrawalRequest> {
    let current = state.withdrawals.get(request_id)?.clone();
    match (current.status, approve) {
        (WithdrawalStatus::Pending, true) => {
            let request = state.withdrawals.get_mut(request_id)?;
            request.status = WithdrawalStatus::Approved;
            request.decided = Some(now);
            request.operator = Some(operator.to_string());
            request.notes = notes.map(str::to_string);
            let request = request.clone();
            info!(id = %request.id, operator, "withdrawal approved");
            Ok(request)
        }
        (WithdrawalStatus::Pending, false) => {
            // Refund first: if the credit fails the request stays
            // pending and no money moves.
            state.ledger.credit(
                &current.account,
                WalletKind::Withdrawal,
                current.gross,
                TxKind::WithdrawalRefund,
                &format!("withdrawal request {} rejected", current.id),
                now,
            )?;
            let request = state.withdrawals.get_mut(request_id)?;
            request.status = WithdrawalStatus::Rejected;
            request.decided = Some(now);
            request.operator = Some(operator.to_string());
            request.notes = notes.map(str::to_string);
            let request = request.clone();
            info!(id = %request.id, operator, "withdrawal rejected and refunded");
            Ok(request)
        }
        (WithdrawalStatus::Rejected, false) => Ok(current),
        (status, _) => Err(CoreError::InvalidState {
            status: status.as_str().into(),
            action: if approve { "approve".into() } else { "reject".into() },
        }),
    }
}

/// Execute an approved request. The reserved funds leave the system
/// here; in production this is the payment-gateway hook.
pub fn mark_processed(
    state: &mut CoreState,
    request_id: &Uuid,
    operator: &str,
    now: DateTime<Utc>,
) -> CoreResult<WithdrawalRequest> {
    let request = state.withdrawals.get_mut(request_id)?;
    if request.status != WithdrawalStatus::Approved {
        return Err(CoreError::InvalidState {
            status: request.status.as_str().into(),
            action: "process".into(),
        });
    }
    request.status = WithdrawalStatus::Processed;
    request.processed = Some(now);
    request.operator = Some(operator.to_string());
    let request = request.clone();
    info!(id = %request.id, operator, net = request.net, "withdrawal processed");
    Ok(request)
}

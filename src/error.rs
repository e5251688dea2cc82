use serde::{Deserialize, Serialize};

/// Coarse classification used by request handlers to pick a stable
/// response for each failure, and by the retry wrapper to decide
/// whether an operation is worth re-running.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Validation,
    State,
    NotFound,
    Concurrency,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("amount must be positive")]
    InvalidAmount,
    #[error("unknown activity kind {0}")]
    UnknownActivity(String),
    #[error("source and destination wallet are the same")]
    SameWallet,

    #[error("insufficient funds in {wallet} wallet: have {available}, need {requested}")]
    InsufficientFunds {
        wallet: String,
        available: u64,
        requested: u64,
    },
    #[error("account has no active package")]
    NoActivePackage,
    #[error("gating requirement unmet: {0}")]
    GatingUnmet(String),
    #[error("daily limit reached for {activity} (cap {cap})")]
    DailyLimitReached { activity: String, cap: u32 },
    #[error("daily withdrawal cap exceeded: attempted {attempted}, cap {cap}")]
    DailyCapExceeded { attempted: u64, cap: u64 },
    #[error("withdrawal below minimum {minimum}")]
    BelowMinimum { minimum: u64 },
    #[error("withdrawal above maximum {maximum}")]
    AboveMaximum { maximum: u64 },
    #[error("watched {watched}s of {total}s, below the completion threshold")]
    IncompleteWatch { watched: u32, total: u32 },
    #[error("already claimed: {0}")]
    AlreadyClaimed(String),
    #[error("play time below the {required_secs}s minimum")]
    DurationTooShort { required_secs: u32 },
    #[error("request is {status}, cannot {action}")]
    InvalidState { status: String, action: String },

    #[error("unknown account {0}")]
    UnknownAccount(String),
    #[error("unknown referral code {0}")]
    UnknownReferralCode(String),
    #[error("unknown withdrawal request {0}")]
    UnknownRequest(String),
    #[error("unknown package {0}")]
    UnknownPackage(String),
    #[error("account {0} is already enrolled")]
    DuplicateAccount(String),

    #[error("concurrent modification, retry the operation")]
    Conflict,
}

impl CoreError {
    pub fn class(&self) -> ErrorClass {
        use CoreError::*;
        match self {
            InvalidAmount | UnknownActivity(_) | SameWallet | DuplicateAccount(_) => {
                ErrorClass::Validation
            }
            InsufficientFunds { .. }
            | NoActivePackage
            | GatingUnmet(_)
            | DailyLimitReached { .. }
            | DailyCapExceeded { .. }
            | BelowMinimum { .. }
            | AboveMaximum { .. }
            | IncompleteWatch { .. }
            | AlreadyClaimed(_)
            | DurationTooShort { .. }
            | InvalidState { .. } => ErrorClass::State,
            UnknownAccount(_) | UnknownReferralCode(_) | UnknownRequest(_)
            | UnknownPackage(_) => ErrorClass::NotFound,
            Conflict => ErrorClass::Concurrency,
        }
    }

    /// Transient failures are retried by the platform before surfacing.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Concurrency
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_cover_the_taxonomy() {
        assert_eq!(CoreError::InvalidAmount.class(), ErrorClass::Validation);
        assert_eq!(
            CoreError::InsufficientFunds {
                wallet: "withdrawal".into(),
                available: 0,
                requested: 100,
            }
            .class(),
            ErrorClass::State
        );
        assert_eq!(
            CoreError::UnknownAccount("a-1".into()).class(),
            ErrorClass::NotFound
        );
        assert_eq!(CoreError::Conflict.class(), ErrorClass::Concurrency);
        assert!(CoreError::Conflict.is_transient());
        assert!(!CoreError::NoActivePackage.is_transient());
    }
}

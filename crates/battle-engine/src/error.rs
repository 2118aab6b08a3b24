use thiserror::Error;

use crate::types::{GiftId, Phase, SessionId, ViewerId};

/// Errors reported synchronously to whoever submitted the operation.
/// None of them poison the session or the registry.
#[derive(Debug, Error)]
pub enum BattleError {
    #[error("unknown gift catalog id {0}")]
    UnknownGift(GiftId),
    #[error("operation not permitted while session is {phase}")]
    PhaseClosed { phase: Phase },
    #[error("viewer {0} already has a wager in this session")]
    DuplicateWager(ViewerId),
    #[error("wager amount must be greater than zero")]
    InvalidAmount,
    #[error("wager of {amount} would overflow the pool")]
    PoolOverflow { amount: u64 },
    #[error("session already resolved")]
    AlreadyResolved,
    #[error("session {0} not found")]
    NotFound(SessionId),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("battle duration must be at least one second")]
    ZeroDuration,
    #[error("lock threshold {lock}s must be below the battle duration {duration}s")]
    LockThresholdTooLarge { lock: u32, duration: u32 },
    #[error("fee ({fee_bps} bps) plus winner bonus ({bonus_bps} bps) exceeds the pool")]
    RatesExceedPool { fee_bps: u32, bonus_bps: u32 },
    #[error("gift catalog lists id {0} more than once")]
    DuplicateGift(GiftId),
    #[error("gift {0} must be worth at least one point")]
    ZeroPointGift(GiftId),
    #[error("invalid configuration json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = BattleError> = std::result::Result<T, E>;

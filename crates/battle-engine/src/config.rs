use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{Participants, Side};

pub const DEFAULT_LOCK_THRESHOLD_SECS: u32 = 30;
pub const DEFAULT_ENDING_GRACE_SECS: u32 = 3;
/// 10% platform fee.
pub const DEFAULT_FEE_BPS: u32 = 1_000;
/// 20% winner bonus.
pub const DEFAULT_BONUS_BPS: u32 = 2_000;
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Who advances the session clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    /// The collaborator calls `tick` once per second.
    #[default]
    Manual,
    /// The registry runs a 1 Hz timer task per session.
    #[cfg(feature = "internal-clock")]
    Internal,
}

/// Per-battle settings. Every field except `participants` and
/// `duration_seconds` has a default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub participants: Participants,
    pub duration_seconds: u32,
    #[serde(default = "default_lock_threshold")]
    pub lock_threshold_seconds: u32,
    #[serde(default = "default_ending_grace")]
    pub ending_grace_seconds: u32,
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u32,
    #[serde(default = "default_bonus_bps")]
    pub bonus_bps: u32,
    /// Leader on equal scores, for display and for picking the winner.
    #[serde(default = "default_tie_break")]
    pub tie_break: Side,
    /// Repay every wager in full when nobody backed the winning side.
    #[serde(default)]
    pub refund_unbacked_winner: bool,
    #[serde(default)]
    pub clock: ClockMode,
}

fn default_lock_threshold() -> u32 {
    DEFAULT_LOCK_THRESHOLD_SECS
}

fn default_ending_grace() -> u32 {
    DEFAULT_ENDING_GRACE_SECS
}

fn default_fee_bps() -> u32 {
    DEFAULT_FEE_BPS
}

fn default_bonus_bps() -> u32 {
    DEFAULT_BONUS_BPS
}

fn default_tie_break() -> Side {
    Side::A
}

impl SessionConfig {
    pub fn new(participants: Participants, duration_seconds: u32) -> Self {
        SessionConfig {
            participants,
            duration_seconds,
            lock_threshold_seconds: DEFAULT_LOCK_THRESHOLD_SECS,
            ending_grace_seconds: DEFAULT_ENDING_GRACE_SECS,
            fee_bps: DEFAULT_FEE_BPS,
            bonus_bps: DEFAULT_BONUS_BPS,
            tie_break: Side::A,
            refund_unbacked_winner: false,
            clock: ClockMode::Manual,
        }
    }

    pub fn with_lock_threshold(mut self, seconds: u32) -> Self {
        self.lock_threshold_seconds = seconds;
        self
    }

    pub fn with_ending_grace(mut self, seconds: u32) -> Self {
        self.ending_grace_seconds = seconds;
        self
    }

    pub fn with_rates(mut self, fee_bps: u32, bonus_bps: u32) -> Self {
        self.fee_bps = fee_bps;
        self.bonus_bps = bonus_bps;
        self
    }

    pub fn with_tie_break(mut self, side: Side) -> Self {
        self.tie_break = side;
        self
    }

    pub fn with_refund_unbacked_winner(mut self, refund: bool) -> Self {
        self.refund_unbacked_winner = refund;
        self
    }

    pub fn with_clock(mut self, clock: ClockMode) -> Self {
        self.clock = clock;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.duration_seconds == 0 {
            return Err(ConfigError::ZeroDuration);
        }
        // Wagering must be open for at least one second.
        if self.lock_threshold_seconds >= self.duration_seconds {
            return Err(ConfigError::LockThresholdTooLarge {
                lock: self.lock_threshold_seconds,
                duration: self.duration_seconds,
            });
        }
        check_rates(self.fee_bps, self.bonus_bps)
    }
}

/// Fee and bonus together may take at most the whole pool.
pub(crate) fn check_rates(fee_bps: u32, bonus_bps: u32) -> Result<(), ConfigError> {
    if fee_bps.saturating_add(bonus_bps) > BPS_DENOMINATOR {
        return Err(ConfigError::RatesExceedPool { fee_bps, bonus_bps });
    }
    Ok(())
}

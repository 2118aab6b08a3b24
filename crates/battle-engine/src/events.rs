use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pool::Settlement;
use crate::types::{GiftId, Phase, SessionId, Side, ViewerId, Wager, WagerId};

/// Input routed to a session by the registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Gift {
        side: Side,
        gift_id: GiftId,
        sender_id: ViewerId,
    },
    Wager {
        bettor_id: ViewerId,
        side: Side,
        amount: u64,
    },
    Tick,
    Terminate,
}

/// Output pushed to the collaborator's sink, in the order it happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Update {
    ScoreChanged {
        session_id: SessionId,
        side: Side,
        gift_id: GiftId,
        sender_id: ViewerId,
        points: u64,
        score_a: u64,
        score_b: u64,
        leading_side: Side,
    },
    WagerPlaced {
        session_id: SessionId,
        wager_id: WagerId,
        side: Side,
        amount: u64,
        total_a: u64,
        total_b: u64,
    },
    PhaseChanged {
        session_id: SessionId,
        from: Phase,
        to: Phase,
        remaining_seconds: u32,
    },
    Resolved(BattleResult),
}

impl Update {
    pub fn session_id(&self) -> SessionId {
        match self {
            Update::ScoreChanged { session_id, .. }
            | Update::WagerPlaced { session_id, .. }
            | Update::PhaseChanged { session_id, .. } => *session_id,
            Update::Resolved(result) => result.session_id,
        }
    }
}

/// Final, immutable outcome of a battle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleResult {
    pub session_id: SessionId,
    pub winning_side: Side,
    pub winning_creator: String,
    /// Scores as frozen when the ending window opened.
    pub final_score_a: u64,
    pub final_score_b: u64,
    /// Ended through `terminate` rather than the clock.
    pub terminated: bool,
    pub total_pool: u64,
    pub platform_fee: u64,
    pub winner_bonus: u64,
    pub winners_pool: u64,
    pub retained: u64,
    pub per_bettor_payout: BTreeMap<ViewerId, u64>,
    pub wagers: Vec<Wager>,
}

impl BattleResult {
    pub(crate) fn new(
        session_id: SessionId,
        winning_creator: String,
        final_scores: (u64, u64),
        terminated: bool,
        settlement: Settlement,
    ) -> Self {
        BattleResult {
            session_id,
            winning_side: settlement.winning_side,
            winning_creator,
            final_score_a: final_scores.0,
            final_score_b: final_scores.1,
            terminated,
            total_pool: settlement.total_pool,
            platform_fee: settlement.platform_fee,
            winner_bonus: settlement.winner_bonus,
            winners_pool: settlement.winners_pool,
            retained: settlement.retained,
            per_bettor_payout: settlement.payouts,
            wagers: settlement.wagers,
        }
    }

    pub fn payout_for(&self, bettor: &ViewerId) -> u64 {
        self.per_bettor_payout.get(bettor).copied().unwrap_or(0)
    }

    pub fn total_paid(&self) -> u64 {
        self.per_bettor_payout.values().sum()
    }

    /// Every point of the pool is accounted for exactly once.
    pub fn is_conserved(&self) -> bool {
        let accounted = self.total_paid() as u128
            + self.platform_fee as u128
            + self.winner_bonus as u128
            + self.retained as u128;
        accounted == self.total_pool as u128
    }
}

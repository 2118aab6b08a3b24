use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::{self, SessionConfig, BPS_DENOMINATOR};
use crate::error::{BattleError, ConfigError, Result};
use crate::types::{SessionId, Side, ViewerId, Wager, WagerId, WagerOutcome};

/// Fee schedule applied when the pool settles. Fee plus bonus never
/// exceeds the pool; the only ways in are `new` and a validated config.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayoutRules {
    pub(crate) fee_bps: u32,
    pub(crate) bonus_bps: u32,
    pub(crate) refund_unbacked_winner: bool,
}

impl PayoutRules {
    pub fn new(fee_bps: u32, bonus_bps: u32, refund_unbacked_winner: bool) -> Result<Self, ConfigError> {
        config::check_rates(fee_bps, bonus_bps)?;
        Ok(PayoutRules {
            fee_bps,
            bonus_bps,
            refund_unbacked_winner,
        })
    }

    pub fn fee_bps(&self) -> u32 {
        self.fee_bps
    }

    pub fn bonus_bps(&self) -> u32 {
        self.bonus_bps
    }

    pub fn refund_unbacked_winner(&self) -> bool {
        self.refund_unbacked_winner
    }
}

impl From<&SessionConfig> for PayoutRules {
    fn from(config: &SessionConfig) -> Self {
        PayoutRules {
            fee_bps: config.fee_bps,
            bonus_bps: config.bonus_bps,
            refund_unbacked_winner: config.refund_unbacked_winner,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTotals {
    pub total_a: u64,
    pub total_b: u64,
    pub bettor_count: u32,
}

impl PoolTotals {
    pub fn side(&self, side: Side) -> u64 {
        match side {
            Side::A => self.total_a,
            Side::B => self.total_b,
        }
    }

    pub fn total(&self) -> u64 {
        self.total_a.saturating_add(self.total_b)
    }
}

/// How the pool was split at resolution.
///
/// `paid + platform_fee + winner_bonus + retained == total_pool` always holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub winning_side: Side,
    pub total_pool: u64,
    pub platform_fee: u64,
    pub winner_bonus: u64,
    pub winners_pool: u64,
    /// Kept by the platform: an unbacked winners pool plus rounding remainder.
    pub retained: u64,
    /// Winning (or refunded) bettors only. Absent bettors were paid nothing.
    pub payouts: BTreeMap<ViewerId, u64>,
    pub wagers: Vec<Wager>,
}

impl Settlement {
    pub fn paid(&self) -> u64 {
        self.payouts.values().sum()
    }

    pub fn payout_for(&self, bettor: &ViewerId) -> u64 {
        self.payouts.get(bettor).copied().unwrap_or(0)
    }
}

/// One pari-mutuel pool per session. One wager per viewer, settled once.
#[derive(Clone, Debug)]
pub struct WageringPool {
    session_id: SessionId,
    wagers: Vec<Wager>,
    by_bettor: HashMap<ViewerId, usize>,
    totals: PoolTotals,
    resolved: bool,
}

impl WageringPool {
    pub fn new(session_id: SessionId) -> Self {
        WageringPool {
            session_id,
            wagers: Vec::new(),
            by_bettor: HashMap::new(),
            totals: PoolTotals::default(),
            resolved: false,
        }
    }

    pub fn totals(&self) -> PoolTotals {
        self.totals
    }

    pub fn wagers(&self) -> &[Wager] {
        &self.wagers
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Record a wager. Phase gating is the session's job; the pool only
    /// refuses once it has been settled.
    pub fn place_wager(
        &mut self,
        bettor: ViewerId,
        side: Side,
        amount: u64,
        placed_at: u32,
    ) -> Result<WagerId> {
        if self.resolved {
            return Err(BattleError::AlreadyResolved);
        }
        if amount == 0 {
            return Err(BattleError::InvalidAmount);
        }
        if self.by_bettor.contains_key(&bettor) {
            return Err(BattleError::DuplicateWager(bettor));
        }

        // both the side total and the whole pool must stay representable
        let side_total = self
            .totals
            .side(side)
            .checked_add(amount)
            .ok_or(BattleError::PoolOverflow { amount })?;
        self.totals
            .total_a
            .checked_add(self.totals.total_b)
            .and_then(|pool| pool.checked_add(amount))
            .ok_or(BattleError::PoolOverflow { amount })?;

        let id = WagerId(self.wagers.len() as u64 + 1);
        match side {
            Side::A => self.totals.total_a = side_total,
            Side::B => self.totals.total_b = side_total,
        }
        self.totals.bettor_count += 1;
        self.by_bettor.insert(bettor.clone(), self.wagers.len());
        self.wagers.push(Wager {
            id,
            session_id: self.session_id,
            bettor_id: bettor,
            side,
            amount,
            placed_at,
            outcome: WagerOutcome::Pending,
        });
        Ok(id)
    }

    pub fn wager_of(&self, bettor: &ViewerId) -> Option<&Wager> {
        self.by_bettor.get(bettor).map(|&i| &self.wagers[i])
    }

    /// Settle the pool for `winning_side`. Works exactly once; later calls
    /// fail without recomputing anything.
    pub fn resolve(&mut self, winning_side: Side, rules: PayoutRules) -> Result<Settlement> {
        if self.resolved {
            return Err(BattleError::AlreadyResolved);
        }
        self.resolved = true;

        let settlement = settle(&self.wagers, self.totals, winning_side, rules);
        self.wagers.clone_from(&settlement.wagers);
        Ok(settlement)
    }
}

/// Pure pari-mutuel split.
///
/// 1. fee   = pool * fee_bps / 10 000
/// 2. bonus = pool * bonus_bps / 10 000
/// 3. winners pool = pool - fee - bonus
/// 4. each winner gets amount * winners_pool / winning_side_total (floored)
pub fn settle(
    wagers: &[Wager],
    totals: PoolTotals,
    winning_side: Side,
    rules: PayoutRules,
) -> Settlement {
    let total_pool = totals.total();
    let winning_total = totals.side(winning_side);

    if winning_total == 0 && total_pool > 0 && rules.refund_unbacked_winner {
        return refund_all(wagers, total_pool, winning_side);
    }

    let platform_fee = bps_of(total_pool, rules.fee_bps);
    let winner_bonus = bps_of(total_pool, rules.bonus_bps);
    let winners_pool = total_pool - platform_fee - winner_bonus;

    let mut payouts = BTreeMap::new();
    let mut tagged = Vec::with_capacity(wagers.len());
    let mut paid: u64 = 0;

    for wager in wagers {
        let mut wager = wager.clone();
        if wager.side == winning_side {
            // winning_total > 0 here: this wager is part of it
            let payout = (wager.amount as u128 * winners_pool as u128 / winning_total as u128) as u64;
            paid += payout;
            payouts.insert(wager.bettor_id.clone(), payout);
            wager.outcome = WagerOutcome::Won;
        } else {
            wager.outcome = WagerOutcome::Lost;
        }
        tagged.push(wager);
    }

    Settlement {
        winning_side,
        total_pool,
        platform_fee,
        winner_bonus,
        winners_pool,
        retained: winners_pool - paid,
        payouts,
        wagers: tagged,
    }
}

fn refund_all(wagers: &[Wager], total_pool: u64, winning_side: Side) -> Settlement {
    let mut payouts = BTreeMap::new();
    let tagged = wagers
        .iter()
        .map(|wager| {
            payouts.insert(wager.bettor_id.clone(), wager.amount);
            Wager {
                outcome: WagerOutcome::Refunded,
                ..wager.clone()
            }
        })
        .collect();

    Settlement {
        winning_side,
        total_pool,
        platform_fee: 0,
        winner_bonus: 0,
        winners_pool: 0,
        retained: 0,
        payouts,
        wagers: tagged,
    }
}

fn bps_of(amount: u64, bps: u32) -> u64 {
    (amount as u128 * bps as u128 / BPS_DENOMINATOR as u128) as u64
}

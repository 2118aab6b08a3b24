use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::GiftCatalog;
use crate::clock::BattleClock;
use crate::config::SessionConfig;
use crate::error::{BattleError, Result};
use crate::events::{BattleResult, Update};
use crate::ledger::ScoreLedger;
use crate::pool::{PayoutRules, PoolTotals, WageringPool};
use crate::types::{GiftEvent, GiftId, Participants, Phase, SessionId, Side, ViewerId, Wager, WagerId};

/// What a gift sender gets back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftReceipt {
    pub side: Side,
    pub score: u64,
    pub phase: Phase,
}

/// Consistent read of one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub participants: Participants,
    pub phase: Phase,
    pub duration_seconds: u32,
    pub remaining_seconds: u32,
    pub score_a: u64,
    pub score_b: u64,
    pub leading_side: Side,
    pub percent_a_bps: u32,
    pub percent_b_bps: u32,
    pub pool: PoolTotals,
    pub started_at: DateTime<Utc>,
}

/// One battle: clock, ledger and pool behind a single phase machine.
///
/// Every mutating method takes `&mut self`; the registry wraps the session
/// in a lock so only one of them runs at a time. Emitted updates collect in
/// an outbox that the owner drains after each call.
#[derive(Debug)]
pub struct BattleSession {
    id: SessionId,
    config: SessionConfig,
    catalog: Arc<GiftCatalog>,
    phase: Phase,
    clock: BattleClock,
    ledger: ScoreLedger,
    pool: WageringPool,
    gift_log: Vec<GiftEvent>,
    /// Winner and scores captured the instant `Ending` began.
    frozen: Option<(Side, u64, u64)>,
    terminated: bool,
    result: Option<BattleResult>,
    started_at: DateTime<Utc>,
    outbox: Vec<Update>,
}

impl BattleSession {
    pub fn new(
        id: SessionId,
        config: SessionConfig,
        catalog: Arc<GiftCatalog>,
        started_at: DateTime<Utc>,
    ) -> Result<Self> {
        config.validate()?;
        let clock = BattleClock::new(config.duration_seconds, config.ending_grace_seconds);
        Ok(BattleSession {
            id,
            catalog,
            phase: Phase::Active,
            clock,
            ledger: ScoreLedger::new(id),
            pool: WageringPool::new(id),
            gift_log: Vec::new(),
            frozen: None,
            terminated: false,
            result: None,
            started_at,
            outbox: Vec::new(),
            config,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.clock.remaining()
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.clock.elapsed()
    }

    pub fn result(&self) -> Option<&BattleResult> {
        self.result.as_ref()
    }

    pub fn gift_log(&self) -> &[GiftEvent] {
        &self.gift_log
    }

    pub fn wagers(&self) -> &[Wager] {
        self.pool.wagers()
    }

    /// Take every update emitted since the last drain.
    pub fn drain_updates(&mut self) -> Vec<Update> {
        std::mem::take(&mut self.outbox)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let scores = self.ledger.snapshot(self.config.tie_break);
        SessionSnapshot {
            session_id: self.id,
            participants: self.config.participants.clone(),
            phase: self.phase,
            duration_seconds: self.clock.duration(),
            remaining_seconds: self.clock.remaining(),
            score_a: scores.score_a,
            score_b: scores.score_b,
            leading_side: scores.leading_side,
            percent_a_bps: scores.percent_a_bps,
            percent_b_bps: scores.percent_b_bps,
            pool: self.pool.totals(),
            started_at: self.started_at,
        }
    }

    // -----------------------------------------------------------------------
    // Viewer operations
    // -----------------------------------------------------------------------

    pub fn submit_gift(&mut self, side: Side, gift: GiftId, sender: ViewerId) -> Result<GiftReceipt> {
        if !self.phase.accepts_gifts() {
            debug!(session = %self.id, phase = %self.phase, %gift, "gift refused");
            return Err(BattleError::PhaseClosed { phase: self.phase });
        }
        let (points, score) = self.ledger.apply_gift(&self.catalog, side, gift)?;

        self.gift_log.push(GiftEvent {
            seq: self.gift_log.len() as u64 + 1,
            session_id: self.id,
            recipient_side: side,
            catalog_entry_id: gift,
            sender_id: sender.clone(),
            points,
            timestamp: self.clock.elapsed(),
        });

        let scores = self.ledger.snapshot(self.config.tie_break);
        debug!(session = %self.id, %side, %gift, points, score, "gift applied");
        self.outbox.push(Update::ScoreChanged {
            session_id: self.id,
            side,
            gift_id: gift,
            sender_id: sender,
            points,
            score_a: scores.score_a,
            score_b: scores.score_b,
            leading_side: scores.leading_side,
        });

        Ok(GiftReceipt {
            side,
            score,
            phase: self.phase,
        })
    }

    pub fn place_wager(&mut self, bettor: ViewerId, side: Side, amount: u64) -> Result<WagerId> {
        if !self.phase.accepts_wagers() {
            debug!(session = %self.id, phase = %self.phase, %bettor, "wager refused");
            return Err(BattleError::PhaseClosed { phase: self.phase });
        }
        let wager_id = self
            .pool
            .place_wager(bettor.clone(), side, amount, self.clock.elapsed())?;

        let totals = self.pool.totals();
        debug!(session = %self.id, %wager_id, %bettor, %side, amount, "wager accepted");
        self.outbox.push(Update::WagerPlaced {
            session_id: self.id,
            wager_id,
            side,
            amount,
            total_a: totals.total_a,
            total_b: totals.total_b,
        });
        Ok(wager_id)
    }

    // -----------------------------------------------------------------------
    // Clock
    // -----------------------------------------------------------------------

    /// Advance the battle by one second and apply any transitions it triggers.
    pub fn tick(&mut self) -> Result<Phase> {
        if self.phase == Phase::Resolved {
            return Err(BattleError::PhaseClosed { phase: self.phase });
        }
        self.clock.tick();
        self.advance_phases();
        Ok(self.phase)
    }

    /// Catch up to `elapsed` seconds since start, one tick at a time.
    /// Returns the number of ticks applied.
    pub fn advance_to(&mut self, elapsed: u64) -> Result<u32> {
        if self.phase == Phase::Resolved {
            return Err(BattleError::PhaseClosed { phase: self.phase });
        }
        let owed = self.clock.ticks_behind(elapsed);
        let mut applied = 0;
        while applied < owed && self.phase != Phase::Resolved {
            self.tick()?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Force the battle to end now. Walks through every remaining phase and
    /// settles with whatever scores and wagers exist at this moment.
    pub fn terminate(&mut self) -> Result<&BattleResult> {
        if self.phase == Phase::Resolved {
            return Err(BattleError::AlreadyResolved);
        }
        info!(session = %self.id, phase = %self.phase, remaining = self.clock.remaining(), "terminating battle");
        self.terminated = true;
        if self.phase == Phase::Active {
            self.transition(Phase::Locking);
        }
        if self.phase == Phase::Locking {
            self.begin_ending();
        }
        self.settle();
        self.result.as_ref().ok_or(BattleError::AlreadyResolved)
    }

    fn advance_phases(&mut self) {
        loop {
            match self.phase {
                Phase::Active if self.clock.remaining() <= self.config.lock_threshold_seconds => {
                    self.transition(Phase::Locking);
                }
                Phase::Locking if self.clock.remaining() == 0 => {
                    self.begin_ending();
                }
                Phase::Ending if self.clock.grace_elapsed() >= self.config.ending_grace_seconds => {
                    self.settle();
                }
                _ => break,
            }
        }
    }

    fn begin_ending(&mut self) {
        self.ledger.freeze();
        let scores = self.ledger.snapshot(self.config.tie_break);
        self.frozen = Some((scores.leading_side, scores.score_a, scores.score_b));
        self.transition(Phase::Ending);
    }

    fn settle(&mut self) {
        let (winner, score_a, score_b) = match self.frozen {
            Some(frozen) => frozen,
            None => panic!("session {} settled before its ledger was frozen", self.id),
        };

        let settlement = match self.pool.resolve(winner, PayoutRules::from(&self.config)) {
            Ok(settlement) => settlement,
            // Only reachable if the phase guard failed: paying twice is worse than stopping.
            Err(err) => panic!("session {} settled twice: {}", self.id, err),
        };

        let result = BattleResult::new(
            self.id,
            self.config.participants.creator(winner).to_owned(),
            (score_a, score_b),
            self.terminated,
            settlement,
        );
        info!(
            session = %self.id,
            winner = %winner,
            score_a,
            score_b,
            pool = result.total_pool,
            fee = result.platform_fee,
            bonus = result.winner_bonus,
            retained = result.retained,
            terminated = self.terminated,
            "battle resolved"
        );

        self.transition(Phase::Resolved);
        self.outbox.push(Update::Resolved(result.clone()));
        self.result = Some(result);
    }

    fn transition(&mut self, to: Phase) {
        let from = self.phase;
        debug_assert!(to > from, "phase moved backwards: {} -> {}", from, to);
        self.phase = to;
        info!(session = %self.id, %from, %to, remaining = self.clock.remaining(), "phase changed");
        self.outbox.push(Update::PhaseChanged {
            session_id: self.id,
            from,
            to,
            remaining_seconds: self.clock.remaining(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WagerOutcome;

    // Default catalog: 0 rose 1, 1 heart 5, 3 star 50, 4 rocket 100, 5 crown 500
    const ROCKET: GiftId = GiftId(4);
    const CROWN: GiftId = GiftId(5);

    fn session(config: SessionConfig) -> BattleSession {
        BattleSession::new(SessionId(1), config, Arc::new(GiftCatalog::default()), Utc::now()).unwrap()
    }

    fn standard() -> BattleSession {
        session(SessionConfig::new(Participants::new("stella", "marco"), 60))
    }

    fn tick_n(s: &mut BattleSession, n: u32) {
        for _ in 0..n {
            s.tick().unwrap();
        }
    }

    fn phase_changes(updates: &[Update]) -> Vec<(Phase, Phase)> {
        updates
            .iter()
            .filter_map(|u| match u {
                Update::PhaseChanged { from, to, .. } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn starts_active_with_full_clock() {
        let s = standard();
        let snap = s.snapshot();
        assert_eq!(snap.phase, Phase::Active);
        assert_eq!(snap.remaining_seconds, 60);
        assert_eq!(snap.score_a, 0);
        assert_eq!(snap.percent_a_bps, 5_000);
    }

    #[test]
    fn rejects_invalid_config() {
        let config = SessionConfig::new(Participants::new("a", "b"), 10);
        let err = BattleSession::new(SessionId(1), config, Arc::new(GiftCatalog::default()), Utc::now())
            .unwrap_err();
        assert!(matches!(err, BattleError::Config(_)));
    }

    #[test]
    fn phases_follow_the_clock() {
        let mut s = standard();

        tick_n(&mut s, 29);
        assert_eq!(s.phase(), Phase::Active);
        assert_eq!(s.remaining_seconds(), 31);

        tick_n(&mut s, 1);
        assert_eq!(s.phase(), Phase::Locking);
        assert_eq!(s.remaining_seconds(), 30);

        tick_n(&mut s, 29);
        assert_eq!(s.phase(), Phase::Locking);

        tick_n(&mut s, 1);
        assert_eq!(s.phase(), Phase::Ending);
        assert_eq!(s.remaining_seconds(), 0);

        // 3s grace
        tick_n(&mut s, 2);
        assert_eq!(s.phase(), Phase::Ending);
        tick_n(&mut s, 1);
        assert_eq!(s.phase(), Phase::Resolved);

        let updates = s.drain_updates();
        assert_eq!(
            phase_changes(&updates),
            vec![
                (Phase::Active, Phase::Locking),
                (Phase::Locking, Phase::Ending),
                (Phase::Ending, Phase::Resolved),
            ]
        );
        assert!(matches!(updates.last(), Some(Update::Resolved(_))));
    }

    #[test]
    fn wager_window_closes_at_lock_threshold() {
        let mut s = standard();

        tick_n(&mut s, 29); // 31s remaining
        assert!(s.place_wager("early".into(), Side::A, 10).is_ok());

        tick_n(&mut s, 2); // 29s remaining
        let err = s.place_wager("late".into(), Side::A, 10).unwrap_err();
        assert!(matches!(err, BattleError::PhaseClosed { phase: Phase::Locking }));
        assert_eq!(s.snapshot().pool.bettor_count, 1);
    }

    #[test]
    fn gifts_count_during_locking_but_not_ending() {
        let mut s = standard();
        tick_n(&mut s, 45);
        assert_eq!(s.phase(), Phase::Locking);
        let receipt = s.submit_gift(Side::B, ROCKET, "fan".into()).unwrap();
        assert_eq!(receipt, GiftReceipt { side: Side::B, score: 100, phase: Phase::Locking });

        tick_n(&mut s, 15);
        assert_eq!(s.phase(), Phase::Ending);
        let err = s.submit_gift(Side::B, ROCKET, "fan".into()).unwrap_err();
        assert!(matches!(err, BattleError::PhaseClosed { phase: Phase::Ending }));
        assert_eq!(s.snapshot().score_b, 100);
    }

    #[test]
    fn gift_log_preserves_order() {
        let mut s = standard();
        s.submit_gift(Side::A, CROWN, "v1".into()).unwrap();
        tick_n(&mut s, 3);
        s.submit_gift(Side::B, ROCKET, "v2".into()).unwrap();
        s.submit_gift(Side::A, GiftId(0), "v3".into()).unwrap();

        let log = s.gift_log();
        assert_eq!(log.len(), 3);
        assert_eq!(log.iter().map(|g| g.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(log[0].points, 500);
        assert_eq!(log[0].timestamp, 0);
        assert_eq!(log[1].timestamp, 3);
        assert_eq!(log[2].sender_id, ViewerId::from("v3"));
    }

    #[test]
    fn score_update_carries_points_credited() {
        let mut s = standard();
        s.submit_gift(Side::B, ROCKET, "v1".into()).unwrap();
        let receipt = s.submit_gift(Side::B, CROWN, "v2".into()).unwrap();
        assert_eq!(receipt.score, 600);

        let credited: Vec<u64> = s
            .drain_updates()
            .iter()
            .filter_map(|u| match u {
                Update::ScoreChanged { points, .. } => Some(*points),
                _ => None,
            })
            .collect();
        assert_eq!(credited, vec![100, 500]);
        assert_eq!(s.gift_log().iter().map(|g| g.points).sum::<u64>(), receipt.score);
    }

    #[test]
    fn unknown_gift_is_not_logged() {
        let mut s = standard();
        assert!(matches!(
            s.submit_gift(Side::A, GiftId(400), "v".into()),
            Err(BattleError::UnknownGift(_))
        ));
        assert!(s.gift_log().is_empty());
        assert!(s.drain_updates().is_empty());
    }

    #[test]
    fn reference_battle() {
        let mut s = standard();
        s.place_wager("bettorX".into(), Side::A, 100).unwrap();
        s.place_wager("bettorY".into(), Side::B, 300).unwrap();

        // A: 500, B: 300
        s.submit_gift(Side::A, CROWN, "fan-a".into()).unwrap();
        for _ in 0..3 {
            s.submit_gift(Side::B, ROCKET, "fan-b".into()).unwrap();
        }
        tick_n(&mut s, 63);

        let result = s.result().unwrap();
        assert_eq!(result.winning_side, Side::A);
        assert_eq!(result.winning_creator, "stella");
        assert_eq!((result.final_score_a, result.final_score_b), (500, 300));
        assert_eq!(result.total_pool, 400);
        assert_eq!(result.platform_fee, 40);
        assert_eq!(result.winner_bonus, 80);
        assert_eq!(result.winners_pool, 280);
        assert_eq!(result.payout_for(&"bettorX".into()), 280);
        assert_eq!(result.payout_for(&"bettorY".into()), 0);
        assert!(result.is_conserved());
        assert!(!result.terminated);
        assert_eq!(s.wagers()[1].outcome, WagerOutcome::Lost);
    }

    #[test]
    fn winner_is_frozen_when_ending_begins() {
        let mut s = standard();
        s.submit_gift(Side::B, ROCKET, "b".into()).unwrap();
        tick_n(&mut s, 60);
        assert_eq!(s.phase(), Phase::Ending);

        // late gift for A bounces; B keeps the win
        assert!(s.submit_gift(Side::A, CROWN, "a".into()).is_err());
        tick_n(&mut s, 3);
        assert_eq!(s.result().unwrap().winning_side, Side::B);
    }

    #[test]
    fn tie_goes_to_configured_side() {
        let mut s = session(
            SessionConfig::new(Participants::new("stella", "marco"), 60).with_tie_break(Side::B),
        );
        s.submit_gift(Side::A, ROCKET, "a".into()).unwrap();
        s.submit_gift(Side::B, ROCKET, "b".into()).unwrap();
        assert_eq!(s.snapshot().leading_side, Side::B);
        tick_n(&mut s, 63);
        assert_eq!(s.result().unwrap().winning_side, Side::B);
        assert_eq!(s.result().unwrap().winning_creator, "marco");
    }

    #[test]
    fn zero_lock_and_grace_never_skip_a_phase() {
        let mut s = session(
            SessionConfig::new(Participants::new("a", "b"), 2)
                .with_lock_threshold(0)
                .with_ending_grace(0),
        );
        s.tick().unwrap();
        assert_eq!(s.phase(), Phase::Active);
        s.tick().unwrap();
        assert_eq!(s.phase(), Phase::Resolved);
        assert_eq!(
            phase_changes(&s.drain_updates()),
            vec![
                (Phase::Active, Phase::Locking),
                (Phase::Locking, Phase::Ending),
                (Phase::Ending, Phase::Resolved),
            ]
        );
    }

    #[test]
    fn ticks_after_resolution_fail() {
        let mut s = standard();
        tick_n(&mut s, 63);
        let first = s.result().cloned();
        assert!(matches!(s.tick(), Err(BattleError::PhaseClosed { phase: Phase::Resolved })));
        assert!(matches!(s.advance_to(1_000), Err(BattleError::PhaseClosed { .. })));
        assert_eq!(s.result().cloned(), first);
    }

    #[test]
    fn advance_to_catches_up_in_order() {
        let mut s = standard();
        assert_eq!(s.advance_to(45).unwrap(), 45);
        assert_eq!(s.phase(), Phase::Locking);
        // stale target: nothing to do
        assert_eq!(s.advance_to(40).unwrap(), 0);
        // far in the future: stops at resolution
        assert_eq!(s.advance_to(10_000).unwrap(), 18);
        assert_eq!(s.phase(), Phase::Resolved);
        assert_eq!(phase_changes(&s.drain_updates()).len(), 3);
    }

    #[test]
    fn terminate_mid_active() {
        let mut s = standard();
        s.place_wager("x".into(), Side::A, 70).unwrap();
        s.place_wager("y".into(), Side::B, 30).unwrap();
        s.submit_gift(Side::B, CROWN, "fan".into()).unwrap();
        tick_n(&mut s, 5);

        let result = s.terminate().unwrap().clone();
        assert!(result.terminated);
        assert_eq!(result.winning_side, Side::B);
        assert_eq!(result.total_pool, 100);
        // winners pool 70 all to y
        assert_eq!(result.payout_for(&"y".into()), 70);
        assert!(result.is_conserved());
        assert_eq!(s.phase(), Phase::Resolved);

        assert_eq!(
            phase_changes(&s.drain_updates()),
            vec![
                (Phase::Active, Phase::Locking),
                (Phase::Locking, Phase::Ending),
                (Phase::Ending, Phase::Resolved),
            ]
        );
    }

    #[test]
    fn terminate_during_ending_skips_grace() {
        let mut s = standard();
        tick_n(&mut s, 61);
        assert_eq!(s.phase(), Phase::Ending);
        s.terminate().unwrap();
        assert_eq!(s.phase(), Phase::Resolved);
        assert!(matches!(s.terminate(), Err(BattleError::AlreadyResolved)));
    }

    #[test]
    #[should_panic(expected = "settled twice")]
    fn double_settlement_panics() {
        let mut s = standard();
        s.terminate().unwrap();
        s.settle();
    }
}

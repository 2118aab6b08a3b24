use serde::{Deserialize, Serialize};

use crate::catalog::GiftCatalog;
use crate::config::BPS_DENOMINATOR;
use crate::error::{BattleError, Result};
use crate::types::{GiftId, Phase, SessionId, Side};

/// Gift-driven score per side. Scores only ever grow, and stop growing
/// once the ledger is frozen.
#[derive(Clone, Debug)]
pub struct ScoreLedger {
    session_id: SessionId,
    score_a: u64,
    score_b: u64,
    frozen: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub score_a: u64,
    pub score_b: u64,
    pub leading_side: Side,
    /// Share of the total score, in basis points. Always sums to 10 000 with `percent_b_bps`.
    pub percent_a_bps: u32,
    pub percent_b_bps: u32,
}

impl LedgerSnapshot {
    pub fn score(&self, side: Side) -> u64 {
        match side {
            Side::A => self.score_a,
            Side::B => self.score_b,
        }
    }

    pub fn is_tied(&self) -> bool {
        self.score_a == self.score_b
    }
}

impl ScoreLedger {
    pub fn new(session_id: SessionId) -> Self {
        ScoreLedger {
            session_id,
            score_a: 0,
            score_b: 0,
            frozen: false,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Credit a gift's point value to `side`. Returns the points credited
    /// and the side's new score.
    pub fn apply_gift(&mut self, catalog: &GiftCatalog, side: Side, gift: GiftId) -> Result<(u64, u64)> {
        if self.frozen {
            return Err(BattleError::PhaseClosed { phase: Phase::Ending });
        }
        let points = catalog.point_value(gift)?;
        Ok((points, self.credit(side, points)))
    }

    fn credit(&mut self, side: Side, points: u64) -> u64 {
        let score = match side {
            Side::A => &mut self.score_a,
            Side::B => &mut self.score_b,
        };
        *score = score.saturating_add(points);
        *score
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn score(&self, side: Side) -> u64 {
        match side {
            Side::A => self.score_a,
            Side::B => self.score_b,
        }
    }

    /// Current standings. Equal scores (including 0:0) lead with `tie_break`.
    pub fn snapshot(&self, tie_break: Side) -> LedgerSnapshot {
        let leading_side = leader(self.score_a, self.score_b, tie_break);
        let (percent_a_bps, percent_b_bps) = split_bps(self.score_a, self.score_b);
        LedgerSnapshot {
            score_a: self.score_a,
            score_b: self.score_b,
            leading_side,
            percent_a_bps,
            percent_b_bps,
        }
    }
}

/// Side with the strictly higher score, or `tie_break` on equality.
pub fn leader(score_a: u64, score_b: u64, tie_break: Side) -> Side {
    if score_a > score_b {
        Side::A
    } else if score_b > score_a {
        Side::B
    } else {
        tie_break
    }
}

/// Percentage split in basis points; 50/50 when nobody has scored.
pub fn split_bps(score_a: u64, score_b: u64) -> (u32, u32) {
    let total = score_a as u128 + score_b as u128;
    if total == 0 {
        return (BPS_DENOMINATOR / 2, BPS_DENOMINATOR / 2);
    }
    let a = (score_a as u128 * BPS_DENOMINATOR as u128 / total) as u32;
    (a, BPS_DENOMINATOR - a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::GiftCatalog;

    fn ledger() -> ScoreLedger {
        ScoreLedger::new(SessionId(1))
    }

    #[test]
    fn gifts_accumulate_per_side() {
        let catalog = GiftCatalog::default();
        let mut l = ledger();

        // crown (500) + rose (1) to A, rocket (100) to B
        assert_eq!(l.apply_gift(&catalog, Side::A, GiftId(5)).unwrap(), (500, 500));
        assert_eq!(l.apply_gift(&catalog, Side::A, GiftId(0)).unwrap(), (1, 501));
        assert_eq!(l.apply_gift(&catalog, Side::B, GiftId(4)).unwrap(), (100, 100));

        assert_eq!(l.score(Side::A), 501);
        assert_eq!(l.score(Side::B), 100);
    }

    #[test]
    fn scores_never_decrease() {
        let catalog = GiftCatalog::default();
        let mut l = ledger();
        let sequence = [
            (Side::A, 3u16),
            (Side::B, 7),
            (Side::B, 0),
            (Side::A, 6),
            (Side::A, 1),
            (Side::B, 2),
        ];
        let mut expected_a = 0u64;
        let mut expected_b = 0u64;
        for (side, gift) in sequence {
            let before = l.snapshot(Side::A);
            let (points, _) = l.apply_gift(&catalog, side, GiftId(gift)).unwrap();
            let after = l.snapshot(Side::A);
            assert!(after.score_a >= before.score_a);
            assert!(after.score_b >= before.score_b);
            assert_eq!(points, catalog.point_value(GiftId(gift)).unwrap());

            match side {
                Side::A => expected_a += points,
                Side::B => expected_b += points,
            }
        }
        assert_eq!(l.score(Side::A), expected_a);
        assert_eq!(l.score(Side::B), expected_b);
    }

    #[test]
    fn unknown_gift_leaves_scores_untouched() {
        let catalog = GiftCatalog::default();
        let mut l = ledger();
        let err = l.apply_gift(&catalog, Side::A, GiftId(77)).unwrap_err();
        assert!(matches!(err, BattleError::UnknownGift(GiftId(77))));
        assert_eq!(l.score(Side::A), 0);
    }

    #[test]
    fn frozen_ledger_rejects_gifts() {
        let catalog = GiftCatalog::default();
        let mut l = ledger();
        l.apply_gift(&catalog, Side::B, GiftId(1)).unwrap();
        l.freeze();
        let err = l.apply_gift(&catalog, Side::B, GiftId(1)).unwrap_err();
        assert!(matches!(err, BattleError::PhaseClosed { .. }));
        assert_eq!(l.score(Side::B), 5);
    }

    #[test]
    fn empty_ledger_splits_evenly() {
        let snap = ledger().snapshot(Side::A);
        assert_eq!(snap.percent_a_bps, 5_000);
        assert_eq!(snap.percent_b_bps, 5_000);
        assert_eq!(snap.leading_side, Side::A);
    }

    #[test]
    fn tie_resolves_to_requested_side() {
        let catalog = GiftCatalog::default();
        let mut l = ledger();
        l.apply_gift(&catalog, Side::A, GiftId(3)).unwrap();
        l.apply_gift(&catalog, Side::B, GiftId(3)).unwrap();

        assert_eq!(l.snapshot(Side::A).leading_side, Side::A);
        assert_eq!(l.snapshot(Side::B).leading_side, Side::B);
        assert!(l.snapshot(Side::A).is_tied());
    }

    #[test]
    fn strict_leader_ignores_tie_break() {
        assert_eq!(leader(500, 300, Side::B), Side::A);
        assert_eq!(leader(300, 500, Side::A), Side::B);
    }

    #[test]
    fn split_is_exact_in_bps() {
        // 500 / 800 = 62.5%
        assert_eq!(split_bps(500, 300), (6_250, 3_750));
        // 1 / 3 floors to 33.33%, B takes the remainder
        assert_eq!(split_bps(1, 2), (3_333, 6_667));
        assert_eq!(split_bps(0, 40), (0, 10_000));
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let mut l = ledger();
        l.credit(Side::A, u64::MAX - 1);
        l.credit(Side::A, 10);
        assert_eq!(l.score(Side::A), u64::MAX);
        assert_eq!(split_bps(u64::MAX, u64::MAX), (5_000, 5_000));
    }
}

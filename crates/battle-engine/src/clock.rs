/// Countdown for one battle, advanced in whole seconds.
///
/// `elapsed` runs from 0 up to `duration + grace`. The first `duration`
/// seconds are the battle proper; the trailing `grace` seconds belong to the
/// ending window. Nothing outside this type writes `elapsed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BattleClock {
    duration: u32,
    grace: u32,
    elapsed: u32,
}

impl BattleClock {
    pub fn new(duration: u32, grace: u32) -> Self {
        BattleClock {
            duration,
            grace,
            elapsed: 0,
        }
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn elapsed(&self) -> u32 {
        self.elapsed
    }

    pub fn remaining(&self) -> u32 {
        self.duration.saturating_sub(self.elapsed)
    }

    /// Seconds spent in the ending window so far.
    pub fn grace_elapsed(&self) -> u32 {
        self.elapsed.saturating_sub(self.duration)
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.end()
    }

    /// Advance one second. Returns false once the clock has run out.
    pub fn tick(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }
        self.elapsed += 1;
        true
    }

    /// Ticks still owed to reach `target` elapsed seconds, capped at the end.
    pub fn ticks_behind(&self, target: u64) -> u32 {
        let target = target.min(self.end() as u64) as u32;
        target.saturating_sub(self.elapsed)
    }

    fn end(&self) -> u32 {
        self.duration.saturating_add(self.grace)
    }
}

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::catalog::GiftCatalog;
use crate::config::SessionConfig;
use crate::error::{BattleError, Result};
use crate::events::{BattleResult, Event, Update};
use crate::session::{BattleSession, GiftReceipt, SessionSnapshot};
use crate::types::{GiftId, Phase, SessionId, Side, ViewerId, WagerId};

type SessionSlot = Arc<RwLock<BattleSession>>;

/// What is left of a battle after it resolves.
#[derive(Clone, Debug)]
pub struct FinishedSession {
    pub snapshot: SessionSnapshot,
    pub result: BattleResult,
}

/// How to answer an operation that targets an already retired session.
#[derive(Clone, Copy)]
enum Retired {
    PhaseClosed,
    AlreadyResolved,
}

/// Owns every battle. Cheap to clone; clones share the same sessions.
///
/// Each session sits behind its own lock, so work on one battle never waits
/// on another. Updates are pushed to the sink while the session lock is
/// held, which keeps them in order per session.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    catalog: Arc<GiftCatalog>,
    live: DashMap<SessionId, SessionSlot>,
    finished: DashMap<SessionId, Arc<FinishedSession>>,
    next_id: AtomicU64,
    sink: mpsc::UnboundedSender<Update>,
    sink_closed: AtomicBool,
}

impl SessionRegistry {
    /// Build a registry over a fixed gift catalog. The receiver yields every
    /// update from every session.
    pub fn new(catalog: GiftCatalog) -> (Self, mpsc::UnboundedReceiver<Update>) {
        let (sink, updates) = mpsc::unbounded_channel();
        let registry = SessionRegistry {
            inner: Arc::new(Inner {
                catalog: Arc::new(catalog),
                live: DashMap::new(),
                finished: DashMap::new(),
                next_id: AtomicU64::new(1),
                sink,
                sink_closed: AtomicBool::new(false),
            }),
        };
        (registry, updates)
    }

    pub fn catalog(&self) -> &GiftCatalog {
        &self.inner.catalog
    }

    pub async fn create_session(&self, config: SessionConfig) -> Result<SessionId> {
        let id = SessionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let clock = config.clock;
        let session = BattleSession::new(id, config, Arc::clone(&self.inner.catalog), Utc::now())?;
        {
            let c = session.config();
            info!(
                session = %id,
                side_a = %c.participants.side_a,
                side_b = %c.participants.side_b,
                duration = c.duration_seconds,
                lock = c.lock_threshold_seconds,
                clock = ?clock,
                "battle created"
            );
        }
        self.inner.live.insert(id, Arc::new(RwLock::new(session)));

        #[cfg(feature = "internal-clock")]
        if clock == crate::config::ClockMode::Internal {
            self.spawn_clock(id);
        }
        #[cfg(not(feature = "internal-clock"))]
        let _ = clock;

        Ok(id)
    }

    /// Route one event to its session. Returns the updates it produced.
    pub async fn dispatch(&self, id: SessionId, event: Event) -> Result<Vec<Update>> {
        let (_, updates) = match event {
            Event::Gift { side, gift_id, sender_id } => {
                self.with_session(id, Retired::PhaseClosed, |s| {
                    s.submit_gift(side, gift_id, sender_id).map(|_| ())
                })
                .await?
            }
            Event::Wager { bettor_id, side, amount } => {
                self.with_session(id, Retired::PhaseClosed, |s| {
                    s.place_wager(bettor_id, side, amount).map(|_| ())
                })
                .await?
            }
            Event::Tick => {
                self.with_session(id, Retired::PhaseClosed, |s| s.tick().map(|_| ()))
                    .await?
            }
            Event::Terminate => {
                self.with_session(id, Retired::AlreadyResolved, |s| s.terminate().map(|_| ()))
                    .await?
            }
        };
        Ok(updates)
    }

    pub async fn submit_gift(
        &self,
        id: SessionId,
        side: Side,
        gift: GiftId,
        sender: ViewerId,
    ) -> Result<GiftReceipt> {
        let (receipt, _) = self
            .with_session(id, Retired::PhaseClosed, |s| s.submit_gift(side, gift, sender))
            .await?;
        Ok(receipt)
    }

    pub async fn place_wager(
        &self,
        id: SessionId,
        bettor: ViewerId,
        side: Side,
        amount: u64,
    ) -> Result<WagerId> {
        let (wager_id, _) = self
            .with_session(id, Retired::PhaseClosed, |s| s.place_wager(bettor, side, amount))
            .await?;
        Ok(wager_id)
    }

    /// Advance a manually clocked session by one second.
    pub async fn tick(&self, id: SessionId) -> Result<Phase> {
        let (phase, _) = self
            .with_session(id, Retired::PhaseClosed, |s| s.tick())
            .await?;
        Ok(phase)
    }

    /// Bring a session up to `elapsed` seconds since its start.
    pub async fn advance_to(&self, id: SessionId, elapsed: u64) -> Result<Phase> {
        let (phase, _) = self
            .with_session(id, Retired::PhaseClosed, |s| {
                s.advance_to(elapsed)?;
                Ok(s.phase())
            })
            .await?;
        Ok(phase)
    }

    /// End a battle now, from any phase, and settle it.
    pub async fn terminate(&self, id: SessionId) -> Result<BattleResult> {
        let (result, _) = self
            .with_session(id, Retired::AlreadyResolved, |s| s.terminate().cloned())
            .await?;
        Ok(result)
    }

    pub async fn snapshot(&self, id: SessionId) -> Result<SessionSnapshot> {
        if let Some(slot) = self.live_slot(id) {
            return Ok(slot.read().await.snapshot());
        }
        self.inner
            .finished
            .get(&id)
            .map(|f| f.snapshot.clone())
            .ok_or(BattleError::NotFound(id))
    }

    /// The settled result, or `None` while the battle is still running.
    pub async fn result(&self, id: SessionId) -> Result<Option<BattleResult>> {
        if let Some(slot) = self.live_slot(id) {
            return Ok(slot.read().await.result().cloned());
        }
        self.inner
            .finished
            .get(&id)
            .map(|f| Some(f.result.clone()))
            .ok_or(BattleError::NotFound(id))
    }

    /// Drop the record of a finished battle. Live battles are left alone.
    pub fn forget(&self, id: SessionId) -> bool {
        self.inner.finished.remove(&id).is_some()
    }

    pub fn live_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.inner.live.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn live_slot(&self, id: SessionId) -> Option<SessionSlot> {
        // clone the Arc so no map guard is held across an await
        self.inner.live.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    fn lookup(&self, id: SessionId, retired: Retired) -> Result<SessionSlot> {
        if let Some(slot) = self.live_slot(id) {
            return Ok(slot);
        }
        if self.inner.finished.contains_key(&id) {
            return Err(match retired {
                Retired::PhaseClosed => BattleError::PhaseClosed { phase: Phase::Resolved },
                Retired::AlreadyResolved => BattleError::AlreadyResolved,
            });
        }
        Err(BattleError::NotFound(id))
    }

    /// Run `op` under the session's write lock, publish what it emitted and
    /// retire the session if `op` resolved it.
    async fn with_session<T, F>(&self, id: SessionId, retired: Retired, op: F) -> Result<(T, Vec<Update>)>
    where
        F: FnOnce(&mut BattleSession) -> Result<T>,
    {
        let slot = self.lookup(id, retired)?;
        let mut session = slot.write().await;

        let outcome = op(&mut session);
        let updates = session.drain_updates();
        self.publish(&updates);

        let resolved_now = updates.iter().any(|u| matches!(u, Update::Resolved(_)));
        if resolved_now {
            if let Some(result) = session.result().cloned() {
                self.retire(id, FinishedSession { snapshot: session.snapshot(), result });
            }
        }
        drop(session);

        outcome.map(|value| (value, updates))
    }

    fn retire(&self, id: SessionId, finished: FinishedSession) {
        // finished first, so a concurrent lookup always finds one of the two
        self.inner.finished.insert(id, Arc::new(finished));
        self.inner.live.remove(&id);
        info!(session = %id, live = self.inner.live.len(), "battle retired");
    }

    fn publish(&self, updates: &[Update]) {
        for update in updates {
            if self.inner.sink.send(update.clone()).is_err() {
                if !self.inner.sink_closed.swap(true, Ordering::Relaxed) {
                    warn!("update receiver dropped; updates are no longer delivered");
                }
                return;
            }
        }
    }

    #[cfg(feature = "internal-clock")]
    fn spawn_clock(&self, id: SessionId) {
        use std::time::Duration;

        let registry = self.clone();
        let started = tokio::time::Instant::now();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let elapsed = started.elapsed().as_secs();
                match registry.advance_to(id, elapsed).await {
                    Ok(Phase::Resolved) => break,
                    Ok(_) => {}
                    Err(err) => {
                        tracing::debug!(session = %id, error = %err, "battle clock stopped");
                        break;
                    }
                }
            }
        });
    }
}

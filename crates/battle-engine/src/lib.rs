//! Live creator-battle engine.
//!
//! Two creators compete for a fixed number of seconds. Viewers push the
//! score with gifts and back a side with a single wager each; when the
//! clock runs out the pool is split pari-mutuel style among the backers of
//! the winning side.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod pool;
pub mod registry;
pub mod session;
pub mod types;

pub use catalog::GiftCatalog;
pub use config::{ClockMode, SessionConfig};
pub use error::{BattleError, ConfigError};
pub use events::{BattleResult, Event, Update};
pub use registry::{FinishedSession, SessionRegistry};
pub use session::{BattleSession, GiftReceipt, SessionSnapshot};
pub use types::{GiftId, Participants, Phase, Rarity, SessionId, Side, ViewerId, WagerId, WagerOutcome};

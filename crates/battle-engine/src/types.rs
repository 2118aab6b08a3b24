use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    A = 0,
    B = 1,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => f.write_str("side A"),
            Side::B => f.write_str("side B"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Rarity {
    Common = 0,
    Rare = 1,
    Epic = 2,
    Mythic = 3,
}

/// Lifecycle position of a battle. Only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Phase {
    Active = 0,
    Locking = 1,
    Ending = 2,
    Resolved = 3,
}

impl Phase {
    pub fn accepts_gifts(self) -> bool {
        matches!(self, Phase::Active | Phase::Locking)
    }

    pub fn accepts_wagers(self) -> bool {
        self == Phase::Active
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Active => "active",
            Phase::Locking => "locking",
            Phase::Ending => "ending",
            Phase::Resolved => "resolved",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WagerOutcome {
    Pending,
    Won,
    Lost,
    Refunded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "battle-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WagerId(pub u64);

impl fmt::Display for WagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wager-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GiftId(pub u16);

impl fmt::Display for GiftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gift#{}", self.0)
    }
}

/// Viewer identity as handed over by the collaborator. Opaque to the engine.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewerId(pub String);

impl From<&str> for ViewerId {
    fn from(value: &str) -> Self {
        ViewerId(value.to_owned())
    }
}

impl From<String> for ViewerId {
    fn from(value: String) -> Self {
        ViewerId(value)
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creator handles for the two competing sides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participants {
    pub side_a: String,
    pub side_b: String,
}

impl Participants {
    pub fn new(side_a: impl Into<String>, side_b: impl Into<String>) -> Self {
        Participants {
            side_a: side_a.into(),
            side_b: side_b.into(),
        }
    }

    pub fn creator(&self, side: Side) -> &str {
        match side {
            Side::A => &self.side_a,
            Side::B => &self.side_b,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftCatalogEntry {
    pub id: GiftId,
    pub name: String,
    pub point_value: u64,
    pub rarity: Rarity,
}

/// One received gift, kept in the session's append-only audit log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftEvent {
    pub seq: u64,
    pub session_id: SessionId,
    pub recipient_side: Side,
    pub catalog_entry_id: GiftId,
    pub sender_id: ViewerId,
    pub points: u64,
    /// Session-clock second at which the gift landed.
    pub timestamp: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wager {
    pub id: WagerId,
    pub session_id: SessionId,
    pub bettor_id: ViewerId,
    pub side: Side,
    pub amount: u64,
    /// Session-clock second at which the wager was accepted.
    pub placed_at: u32,
    pub outcome: WagerOutcome,
}

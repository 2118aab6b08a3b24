use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{BattleError, ConfigError};
use crate::types::{GiftCatalogEntry, GiftId, Rarity};

/// Stock gift table used when the host does not ship its own catalog.
pub const DEFAULT_GIFTS: [(u16, &str, u64, Rarity); 8] = [
    // common: cheap taps, most of the volume
    (0, "rose", 1, Rarity::Common),
    (1, "heart", 5, Rarity::Common),
    (2, "confetti", 10, Rarity::Common),
    // rare
    (3, "star", 50, Rarity::Rare),
    (4, "rocket", 100, Rarity::Rare),
    // epic
    (5, "crown", 500, Rarity::Epic),
    (6, "lion", 1_000, Rarity::Epic),
    // mythic
    (7, "galaxy", 5_000, Rarity::Mythic),
];

/// Read-only gift reference data, shared by every session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "Vec<GiftCatalogEntry>", into = "Vec<GiftCatalogEntry>")]
pub struct GiftCatalog {
    entries: Vec<GiftCatalogEntry>,
    index: HashMap<GiftId, usize>,
}

impl GiftCatalog {
    /// Build a catalog, rejecting duplicate ids and worthless gifts.
    pub fn new(entries: Vec<GiftCatalogEntry>) -> Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if entry.point_value == 0 {
                return Err(ConfigError::ZeroPointGift(entry.id));
            }
            if index.insert(entry.id, i).is_some() {
                return Err(ConfigError::DuplicateGift(entry.id));
            }
        }
        Ok(GiftCatalog { entries, index })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let entries: Vec<GiftCatalogEntry> = serde_json::from_str(json)?;
        GiftCatalog::new(entries)
    }

    pub fn get(&self, id: GiftId) -> Result<&GiftCatalogEntry, BattleError> {
        self.index
            .get(&id)
            .map(|&i| &self.entries[i])
            .ok_or(BattleError::UnknownGift(id))
    }

    pub fn point_value(&self, id: GiftId) -> Result<u64, BattleError> {
        self.get(id).map(|entry| entry.point_value)
    }

    pub fn entries(&self) -> &[GiftCatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for GiftCatalog {
    fn default() -> Self {
        let entries: Vec<GiftCatalogEntry> = DEFAULT_GIFTS
            .iter()
            .map(|&(id, name, point_value, rarity)| GiftCatalogEntry {
                id: GiftId(id),
                name: name.to_owned(),
                point_value,
                rarity,
            })
            .collect();
        // DEFAULT_GIFTS ids are unique and non-zero; see default_table_is_valid.
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.id, i))
            .collect();
        GiftCatalog { entries, index }
    }
}

impl TryFrom<Vec<GiftCatalogEntry>> for GiftCatalog {
    type Error = ConfigError;

    fn try_from(entries: Vec<GiftCatalogEntry>) -> Result<Self, Self::Error> {
        GiftCatalog::new(entries)
    }
}

impl From<GiftCatalog> for Vec<GiftCatalogEntry> {
    fn from(catalog: GiftCatalog) -> Self {
        catalog.entries
    }
}

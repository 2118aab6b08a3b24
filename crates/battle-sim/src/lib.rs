//! Scripted traffic for the battle engine.
//!
//! A scenario file names the gift catalog, the battle settings and a list of
//! timed viewer actions. `run` replays it against a fresh registry with a
//! manual clock, so the same file always produces the same updates.

use battle_engine::types::GiftCatalogEntry;
use battle_engine::{
    BattleError, BattleResult, ClockMode, ConfigError, Event, GiftCatalog, Phase, SessionConfig,
    SessionRegistry, Update,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("could not read scenario {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scenario: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Battle(#[from] BattleError),
}

#[derive(Clone, Debug, Deserialize)]
pub struct Scenario {
    /// Falls back to the stock catalog when absent.
    #[serde(default)]
    pub gifts: Option<Vec<GiftCatalogEntry>>,
    pub session: SessionConfig,
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Step {
    /// Battle second at which the event is submitted.
    #[serde(default)]
    pub at: u32,
    #[serde(flatten)]
    pub event: Event,
}

/// An event the engine refused, kept for the report.
#[derive(Clone, Debug)]
pub struct Rejection {
    pub at: u32,
    pub event: Event,
    pub error: String,
}

#[derive(Debug)]
pub struct Report {
    pub updates: Vec<Update>,
    pub rejections: Vec<Rejection>,
    pub result: BattleResult,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &str) -> Result<Self, SimError> {
        let json = std::fs::read_to_string(path).map_err(|source| SimError::Io {
            path: path.to_owned(),
            source,
        })?;
        Scenario::from_json(&json)
    }
}

/// Replay `scenario` to completion.
pub async fn run(scenario: Scenario) -> Result<Report, SimError> {
    let catalog = match scenario.gifts {
        Some(entries) => GiftCatalog::new(entries)?,
        None => GiftCatalog::default(),
    };
    let (registry, mut updates) = SessionRegistry::new(catalog);

    // the script owns time
    let config = scenario.session.with_clock(ClockMode::Manual);
    let id = registry.create_session(config).await?;
    info!(session = %id, steps = scenario.steps.len(), "replaying scenario");

    let mut steps = scenario.steps;
    steps.sort_by_key(|step| step.at);

    let mut now: u32 = 0;
    let mut phase = Phase::Active;
    let mut rejections = Vec::new();

    for step in steps {
        while now < step.at && phase != Phase::Resolved {
            phase = registry.tick(id).await?;
            now += 1;
        }
        match registry.dispatch(id, step.event.clone()).await {
            Ok(_) => {
                if matches!(step.event, Event::Tick) {
                    now += 1;
                }
                if registry.result(id).await?.is_some() {
                    phase = Phase::Resolved;
                }
            }
            Err(err) => {
                debug!(at = step.at, error = %err, "step rejected");
                rejections.push(Rejection {
                    at: step.at,
                    event: step.event,
                    error: err.to_string(),
                });
            }
        }
    }

    while phase != Phase::Resolved {
        phase = registry.tick(id).await?;
    }

    let result = registry
        .result(id)
        .await?
        .ok_or(BattleError::NotFound(id))?;

    let mut emitted = Vec::new();
    while let Ok(update) = updates.try_recv() {
        emitted.push(update);
    }

    Ok(Report {
        updates: emitted,
        rejections,
        result,
    })
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cible surveillée, typiquement "host:port" (chaîne opaque pour le moteur)
pub type Target = String;

/// Dernier état observé et validé pour une cible
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityState {
    pub host: Target,
    #[serde(rename = "isOk")]
    pub is_ok: bool,
}

impl AvailabilityState {
    pub fn new<S: Into<Target>>(host: S, is_ok: bool) -> Self {
        Self { host: host.into(), is_ok }
    }
}

pub type StatesMap = BTreeMap<Target, AvailabilityState>;

/// Snapshot complet des états, unité de persistance.
/// Forme disque : `{ "states": { "<target>": { "host": "<target>", "isOk": <bool> } } }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub states: StatesMap,
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target: &str) -> Option<&AvailabilityState> {
        self.states.get(target)
    }

    pub fn insert(&mut self, state: AvailabilityState) {
        self.states.insert(state.host.clone(), state);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl FromIterator<AvailabilityState> for StateSnapshot {
    fn from_iter<I: IntoIterator<Item = AvailabilityState>>(iter: I) -> Self {
        let mut snapshot = StateSnapshot::new();
        for state in iter {
            snapshot.insert(state);
        }
        snapshot
    }
}

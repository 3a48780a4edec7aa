//! Détection des transitions up/down.
//!
//! Logique pure : aucun I/O, le résultat ne dépend que des entrées.

use crate::models::{AvailabilityState, StateSnapshot};

/// Résultat d'une réconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Snapshot complet à persister (toujours, même sans transition)
    pub updated: StateSnapshot,
    /// Transitions à notifier, dans l'ordre des résultats
    pub events: Vec<AvailabilityState>,
}

/// Compare un lot de résultats de sonde au snapshot courant.
///
/// - cible inconnue : enregistrée telle quelle, sans événement (première observation)
/// - même `is_ok` : état conservé, sans événement
/// - `is_ok` différent : état remplacé et ajouté aux événements
///
/// Les entrées du snapshot absentes du lot sont conservées.
pub fn reconcile(current: &StateSnapshot, results: &[AvailabilityState]) -> Reconciliation {
    let mut updated = current.clone();
    let mut events = Vec::new();

    for result in results {
        let previous = updated.get(&result.host).map(|s| s.is_ok);
        match previous {
            None => updated.insert(result.clone()),
            Some(was_ok) if was_ok == result.is_ok => {}
            Some(_) => {
                updated.insert(result.clone());
                events.push(result.clone());
            }
        }
    }

    Reconciliation { updated, events }
}

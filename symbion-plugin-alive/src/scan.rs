/**
 * SCAN COORDINATOR - Un cycle de scan complet, jamais deux en parallèle
 *
 * FONCTIONNEMENT :
 * 1. Verrou async (capacité 1, FIFO) : un scan concurrent attend son tour
 * 2. Sondes sur toutes les cibles, lot complet dans l'ordre de la config
 * 3. Réconciliation avec le snapshot en mémoire
 * 4. Sauvegarde systématique, même sans transition
 * 5. Notification de chaque transition, erreurs isolées par événement
 * 6. Libération du verrou sur tous les chemins (drop du guard)
 *
 * Le snapshot vit dans le mutex : aucun autre chemin ne peut le modifier.
 */

use crate::config::AliveConfig;
use crate::models::{AvailabilityState, StateSnapshot, Target};
use crate::notifier::{format_transition, Notifier};
use crate::probe::Prober;
use crate::store::{StateStore, StoreError};
use crate::transition::{reconcile, Reconciliation};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("failed to persist states: {0}")]
    Persist(#[from] StoreError),
}

/// Bilan d'un scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub probed: usize,
    pub transitions: Vec<AvailabilityState>,
    pub notified: usize,
}

pub struct ScanCoordinator<P, N> {
    targets: Vec<Target>,
    notify_channel: String,
    store: StateStore,
    prober: P,
    notifier: Arc<N>,
    snapshot: Mutex<StateSnapshot>,
}

impl<P: Prober, N: Notifier> ScanCoordinator<P, N> {
    pub fn new(
        config: &AliveConfig,
        store: StateStore,
        snapshot: StateSnapshot,
        prober: P,
        notifier: Arc<N>,
    ) -> Self {
        Self {
            targets: config.targets.clone(),
            notify_channel: config.notify_channel.clone(),
            store,
            prober,
            notifier,
            snapshot: Mutex::new(snapshot),
        }
    }

    /// Charge l'état persistant puis construit le coordinateur.
    /// Une erreur de lecture est fatale : pas de démarrage sans état de référence.
    pub async fn load(config: &AliveConfig, prober: P, notifier: Arc<N>) -> Result<Self, StoreError> {
        let store = StateStore::new(config.states_path());
        let snapshot = store.load().await?;
        Ok(Self::new(config, store, snapshot, prober, notifier))
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Copie du snapshot courant (attend la fin d'un scan en cours)
    pub async fn snapshot(&self) -> StateSnapshot {
        self.snapshot.lock().await.clone()
    }

    pub async fn scan(&self) -> Result<ScanReport, ScanError> {
        let mut snapshot = self.snapshot.lock().await;
        debug!(targets = ?self.targets, "scanning");

        let results = self.probe_all().await;
        let Reconciliation { updated, events } = reconcile(&snapshot, &results);
        *snapshot = updated;

        // La sauvegarde précède les notifications ; un échec n'empêche pas
        // de notifier, la mémoire reste la référence jusqu'au prochain save.
        let persisted = self.store.save(&snapshot).await;
        let notified = self.dispatch(&events).await;
        persisted?;

        debug!(states = ?snapshot.states, "states committed");
        Ok(ScanReport {
            probed: results.len(),
            transitions: events,
            notified,
        })
    }

    /// Sauvegarde finale à l'arrêt
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        let snapshot = self.snapshot.lock().await;
        self.store.save(&snapshot).await
    }

    async fn probe_all(&self) -> Vec<AvailabilityState> {
        let mut probes = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            probes.push(self.prober.is_reachable(target));
        }
        let outcomes = join_all(probes).await;

        self.targets
            .iter()
            .zip(outcomes)
            .map(|(target, is_ok)| AvailabilityState::new(target.clone(), is_ok))
            .collect()
    }

    /// Envoie une notification par transition. Retourne le nombre d'envois réussis.
    async fn dispatch(&self, events: &[AvailabilityState]) -> usize {
        if events.is_empty() {
            return 0;
        }

        for event in events {
            if event.is_ok {
                info!(host = %event.host, "server back online");
            } else {
                warn!(host = %event.host, "server went offline");
            }
        }

        let channel_id = match self.notifier.resolve_channel_id(&self.notify_channel).await {
            Ok(id) => id,
            Err(e) => {
                warn!(channel = %self.notify_channel, error = %e, dropped = events.len(), "cannot resolve notify channel");
                return 0;
            }
        };

        let mut sent = 0;
        for event in events {
            let message = format_transition(event);
            match self.notifier.send_notification(&channel_id, &message).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(host = %event.host, error = %e, "notification failed"),
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{ChannelId, NotifyError};
    use parking_lot::Mutex as SyncMutex;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MapProber {
        up: SyncMutex<HashMap<String, bool>>,
    }

    impl MapProber {
        fn set(&self, target: &str, is_ok: bool) {
            self.up.lock().insert(target.to_string(), is_ok);
        }
    }

    impl Prober for MapProber {
        async fn is_reachable(&self, target: &str) -> bool {
            self.up.lock().get(target).copied().unwrap_or(false)
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        sent: SyncMutex<Vec<(ChannelId, String)>>,
        resolves: SyncMutex<Vec<String>>,
        fail_resolve: bool,
        fail_for: Option<String>,
    }

    impl Notifier for FakeNotifier {
        async fn resolve_channel_id(&self, channel_name: &str) -> Result<ChannelId, NotifyError> {
            self.resolves.lock().push(channel_name.to_string());
            if self.fail_resolve {
                return Err(NotifyError::Dropped(channel_name.to_string()));
            }
            Ok(format!("id-{channel_name}"))
        }

        async fn send_notification(&self, channel_id: &ChannelId, message: &str) -> Result<(), NotifyError> {
            if let Some(host) = &self.fail_for {
                if message.contains(host.as_str()) {
                    return Err(NotifyError::Dropped(channel_id.clone()));
                }
            }
            self.sent.lock().push((channel_id.clone(), message.to_string()));
            Ok(())
        }
    }

    /// Cible injoignable après un délai propre à chaque cible ; note l'ordre de fin
    struct StaggeredTargets {
        delays: HashMap<String, u64>,
        finished: SyncMutex<Vec<String>>,
    }

    impl Prober for StaggeredTargets {
        async fn is_reachable(&self, target: &str) -> bool {
            let ms = self.delays.get(target).copied().unwrap_or(0);
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            self.finished.lock().push(target.to_string());
            false
        }
    }

    fn config(dir: &TempDir, targets: &[&str]) -> AliveConfig {
        AliveConfig {
            targets: targets.iter().map(|t| t.to_string()).collect(),
            data_dir: dir.path().join("data"),
            ..AliveConfig::default()
        }
    }

    #[tokio::test]
    async fn test_scenario_first_then_transition() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, &["10.0.0.1:80", "10.0.0.2:443"]);
        let notifier = Arc::new(FakeNotifier::default());
        let coordinator = ScanCoordinator::load(&cfg, MapProber::default(), notifier.clone())
            .await
            .unwrap();

        coordinator.prober.set("10.0.0.1:80", true);
        let first = coordinator.scan().await.unwrap();
        assert_eq!(first.probed, 2);
        assert!(first.transitions.is_empty());
        assert!(notifier.resolves.lock().is_empty());

        coordinator.prober.set("10.0.0.1:80", false);
        let second = coordinator.scan().await.unwrap();
        assert_eq!(second.transitions, vec![AvailabilityState::new("10.0.0.1:80", false)]);
        assert_eq!(second.notified, 1);

        let sent = notifier.sent.lock().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "id-general");
        assert!(sent[0].1.contains("went offline"));
        assert_eq!(notifier.resolves.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_storage_matches_memory_after_every_scan() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, &["a:1", "b:2"]);
        let coordinator = ScanCoordinator::load(&cfg, MapProber::default(), Arc::new(FakeNotifier::default()))
            .await
            .unwrap();
        let store = StateStore::new(cfg.states_path());

        for up in [true, true, false] {
            coordinator.prober.set("a:1", up);
            coordinator.scan().await.unwrap();
            assert_eq!(store.load().await.unwrap(), coordinator.snapshot().await);
        }
    }

    #[tokio::test]
    async fn test_notification_failures_are_contained() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, &["a:1", "b:2"]);
        let notifier = Arc::new(FakeNotifier {
            fail_for: Some("a:1".into()),
            ..FakeNotifier::default()
        });
        let initial: StateSnapshot = [AvailabilityState::new("a:1", false), AvailabilityState::new("b:2", false)]
            .into_iter()
            .collect();
        let coordinator = ScanCoordinator::new(
            &cfg,
            StateStore::new(cfg.states_path()),
            initial,
            MapProber::default(),
            notifier.clone(),
        );
        coordinator.prober.set("a:1", true);
        coordinator.prober.set("b:2", true);

        let report = coordinator.scan().await.unwrap();
        assert_eq!(report.transitions.len(), 2);
        assert_eq!(report.notified, 1);
        assert!(notifier.sent.lock()[0].1.contains("b:2"));
        assert!(coordinator.snapshot().await.get("a:1").unwrap().is_ok);
    }

    #[tokio::test]
    async fn test_unresolved_channel_does_not_fail_scan() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, &["a:1"]);
        let notifier = Arc::new(FakeNotifier { fail_resolve: true, ..FakeNotifier::default() });
        let initial: StateSnapshot = [AvailabilityState::new("a:1", true)].into_iter().collect();
        let coordinator = ScanCoordinator::new(
            &cfg,
            StateStore::new(cfg.states_path()),
            initial,
            MapProber::default(),
            notifier.clone(),
        );

        let report = coordinator.scan().await.unwrap();
        assert_eq!(report.transitions.len(), 1);
        assert_eq!(report.notified, 0);
        assert!(notifier.sent.lock().is_empty());
        let persisted = StateStore::new(cfg.states_path()).load().await.unwrap();
        assert!(!persisted.get("a:1").unwrap().is_ok);
    }

    #[tokio::test]
    async fn test_persist_failure_is_returned_and_lock_released() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let cfg = config(&dir, &["a:1"]);
        let notifier = Arc::new(FakeNotifier::default());
        let initial: StateSnapshot = [AvailabilityState::new("a:1", true)].into_iter().collect();
        let coordinator = ScanCoordinator::new(
            &cfg,
            StateStore::in_dir(&blocker),
            initial,
            MapProber::default(),
            notifier.clone(),
        );

        assert!(matches!(coordinator.scan().await, Err(ScanError::Persist(_))));
        // Mémoire à jour, notification partie, verrou libéré
        assert!(!coordinator.snapshot().await.get("a:1").unwrap().is_ok);
        assert_eq!(notifier.sent.lock().len(), 1);
        assert!(coordinator.scan().await.is_err());
    }

    #[tokio::test]
    async fn test_no_targets_still_persists() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, &[]);
        let coordinator = ScanCoordinator::load(&cfg, MapProber::default(), Arc::new(FakeNotifier::default()))
            .await
            .unwrap();
        std::fs::remove_file(cfg.states_path()).unwrap();

        let report = coordinator.scan().await.unwrap();
        assert_eq!(report.probed, 0);
        assert!(cfg.states_path().exists());
    }

    #[tokio::test]
    async fn test_transitions_follow_configured_order_when_checks_finish_out_of_order() {
        let dir = TempDir::new().unwrap();
        let targets = ["c:3", "a:1", "b:2"];
        let cfg = config(&dir, &targets);
        let prober = StaggeredTargets {
            delays: [("c:3", 90), ("a:1", 45), ("b:2", 0)]
                .into_iter()
                .map(|(t, ms)| (t.to_string(), ms))
                .collect(),
            finished: SyncMutex::new(Vec::new()),
        };
        let notifier = Arc::new(FakeNotifier::default());
        let initial: StateSnapshot = targets.iter().map(|t| AvailabilityState::new(*t, true)).collect();
        let coordinator = ScanCoordinator::new(
            &cfg,
            StateStore::new(cfg.states_path()),
            initial,
            prober,
            notifier.clone(),
        );

        let report = coordinator.scan().await.unwrap();

        assert_eq!(*coordinator.prober.finished.lock(), vec!["b:2", "a:1", "c:3"]);
        let expected: Vec<_> = targets.iter().map(|t| AvailabilityState::new(*t, false)).collect();
        assert_eq!(report.transitions, expected);
        let sent: Vec<_> = notifier.sent.lock().iter().map(|(_, m)| m.clone()).collect();
        assert_eq!(sent.len(), 3);
        for (message, target) in sent.iter().zip(targets) {
            assert!(message.contains(target));
        }
    }
}

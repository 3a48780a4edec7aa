/**
 * CONFIG - Configuration du plugin alive, lue une seule fois au démarrage
 *
 * Variables d'environnement (un `.env` est chargé par main via dotenvy) :
 * - ALIVE_MONITORING_TARGETS : "host:port,host:port"
 * - ALIVE_MONITORING_NOTIFY_CHANNEL : canal de notification ("general" par défaut)
 * - ALIVE_MONITORING_DATA_DIR : dossier de states.json ("data/" à côté de l'exécutable par défaut)
 * - ALIVE_MONITORING_PROBE_TIMEOUT_MS : timeout de connexion TCP (5000 par défaut)
 * - SYMBION_MQTT_HOST / SYMBION_MQTT_PORT : broker MQTT (localhost:1883)
 *
 * Les anciennes variables préfixées REC0_ENV_ restent acceptées en repli.
 */

use crate::models::Target;
use crate::store::{DATA_DIR_NAME, STATES_JSON_FILENAME};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_NOTIFY_CHANNEL: &str = "general";
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5000;
const LEGACY_PREFIX: &str = "REC0_ENV_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self { host: "localhost".into(), port: 1883 }
    }
}

#[derive(Debug, Clone)]
pub struct AliveConfig {
    pub targets: Vec<Target>,
    pub notify_channel: String,
    pub data_dir: PathBuf,
    pub probe_timeout: Duration,
    pub mqtt: MqttConf,
}

impl Default for AliveConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            notify_channel: DEFAULT_NOTIFY_CHANNEL.into(),
            data_dir: default_data_dir(),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            mqtt: MqttConf::default(),
        }
    }
}

impl AliveConfig {
    /// Lit la configuration depuis l'environnement du processus
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construit la configuration à partir d'une fonction de lookup (testable sans env global)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| -> Option<String> {
            lookup(name).or_else(|| lookup(&format!("{LEGACY_PREFIX}{name}")))
        };
        let defaults = Self::default();

        let notify_channel = get("ALIVE_MONITORING_NOTIFY_CHANNEL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.notify_channel);

        let targets = parse_targets(&get("ALIVE_MONITORING_TARGETS").unwrap_or_default());

        let data_dir = get("ALIVE_MONITORING_DATA_DIR")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let probe_timeout = match get("ALIVE_MONITORING_PROBE_TIMEOUT_MS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    warn!(value = %raw, "invalid probe timeout, using default");
                    defaults.probe_timeout
                }
            },
            None => defaults.probe_timeout,
        };

        let mqtt_host = lookup("SYMBION_MQTT_HOST")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.mqtt.host);
        let mqtt_port = match lookup("SYMBION_MQTT_PORT") {
            Some(raw) => raw.trim().parse::<u16>().unwrap_or_else(|_| {
                warn!(value = %raw, "invalid MQTT port, using default");
                defaults.mqtt.port
            }),
            None => defaults.mqtt.port,
        };

        Self {
            targets,
            notify_channel,
            data_dir,
            probe_timeout,
            mqtt: MqttConf { host: mqtt_host, port: mqtt_port },
        }
    }

    pub fn states_path(&self) -> PathBuf {
        self.data_dir.join(STATES_JSON_FILENAME)
    }
}

/// `data/` à côté de l'exécutable installé, indépendant du dossier courant.
/// Repli sur `./data` si l'emplacement de l'exécutable est introuvable.
pub fn default_data_dir() -> PathBuf {
    match std::env::current_exe() {
        Ok(exe) => data_dir_beside(&exe),
        Err(e) => {
            warn!(error = %e, "cannot locate executable, using ./data");
            Path::new(".").join(DATA_DIR_NAME)
        }
    }
}

fn data_dir_beside(exe: &Path) -> PathBuf {
    exe.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join(DATA_DIR_NAME)
}

/// Découpe la liste "host:port,host:port".
/// Les entrées qui n'ont pas exactement un ':' sont ignorées sans erreur.
pub fn parse_targets(raw: &str) -> Vec<Target> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| {
            let ok = entry.split(':').count() == 2;
            if !ok && !entry.is_empty() {
                debug!(entry = %entry, "dropping malformed target");
            }
            ok
        })
        .map(str::to_string)
        .collect()
}

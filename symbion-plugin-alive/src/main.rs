/**
 * SYMBION PLUGIN ALIVE - Point d'entrée du plugin de surveillance
 *
 * RÔLE :
 * Surveille des services TCP et prévient le chat quand l'un d'eux tombe
 * ou revient. L'état survit aux redémarrages (./data/states.json).
 *
 * CYCLE DE VIE :
 * - init : config (env + .env), chargement de l'état (fatal si illisible)
 * - start : boucle MQTT, un scan par déclencheur reçu
 * - stop (Ctrl-C) : attente du scan en cours puis sauvegarde finale
 */

use anyhow::{Context, Result};
use std::sync::Arc;
use symbion_plugin_alive::mqtt::{create_mqtt_client, run_event_loop};
use symbion_plugin_alive::{AliveConfig, ChatBridge, ScanCoordinator, TcpProber};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Ok si .env n'existe pas

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AliveConfig::from_env();
    if config.targets.is_empty() {
        warn!("no valid target in ALIVE_MONITORING_TARGETS, scans will only persist state");
    }

    let (client, eventloop) = create_mqtt_client(&config.mqtt);
    let bridge = Arc::new(ChatBridge::new(client.clone()));

    let coordinator = ScanCoordinator::load(&config, TcpProber::new(config.probe_timeout), bridge.clone())
        .await
        .with_context(|| format!("failed to load states from {}", config.states_path().display()))?;
    let coordinator = Arc::new(coordinator);

    info!(
        plugin = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        targets = ?coordinator.targets(),
        channel = %config.notify_channel,
        "plugin has been initialized"
    );

    debug!(broker = %config.mqtt.host, port = config.mqtt.port, "plugin starting");
    tokio::select! {
        _ = run_event_loop(client, eventloop, coordinator.clone(), bridge) => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
        }
    }

    debug!("plugin stopping");
    coordinator.shutdown().await.context("final state save failed")?;
    info!("states saved, bye");
    Ok(())
}

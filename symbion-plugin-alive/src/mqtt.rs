/**
 * MQTT - Déclencheurs de scan et transport du chat
 *
 * Écoute :
 * - symbion/chat/message@v1  : tout message de chat déclenche un scan
 * - symbion/plugins/event@v1 : seul l'événement "scheduled:check-alive" déclenche un scan
 * - symbion/chat/channel@v1  : réponses de résolution de canal (ChatBridge)
 *
 * Chaque scan tourne dans sa propre task : la boucle MQTT continue de tourner
 * (le ChatBridge a besoin des réponses pendant le scan), et le mutex du
 * coordinateur met les scans concurrents en file.
 */

use crate::config::MqttConf;
use crate::notifier::{ChatBridge, Notifier};
use crate::probe::Prober;
use crate::scan::ScanCoordinator;
use rumqttc::{AsyncClient, ClientError, Event, EventLoop, Incoming, MqttOptions, QoS};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const TOPIC_CHAT_MESSAGE: &str = "symbion/chat/message@v1";
pub const TOPIC_PLUGIN_EVENT: &str = "symbion/plugins/event@v1";
pub const TOPIC_CHAT_CHANNEL: &str = "symbion/chat/channel@v1";
pub const TOPIC_CHAT_RESOLVE: &str = "symbion/chat/resolve@v1";
pub const TOPIC_CHAT_SEND: &str = "symbion/chat/send@v1";

pub const SCHEDULED_CHECK_ALIVE: &str = "scheduled:check-alive";

const SUBSCRIPTIONS: [&str; 3] = [TOPIC_CHAT_MESSAGE, TOPIC_PLUGIN_EVENT, TOPIC_CHAT_CHANNEL];

/// Publication MQTT minimale dont le ChatBridge a besoin
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = Result<(), ClientError>> + Send;
}

impl Publisher for AsyncClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ClientError> {
        AsyncClient::publish(self, topic, QoS::AtLeastOnce, false, payload).await
    }
}

/// Événement plugin envoyé par l'hôte (planificateur, autres plugins)
#[derive(Debug, Deserialize)]
pub struct PluginEvent {
    pub event_name: String,
    pub value: Option<serde_json::Value>,
    pub from_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    ChatMessage,
    Scheduled,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    Scan(Trigger),
    ChannelReply,
    Ignored,
}

/// Classe un message entrant
pub fn classify(topic: &str, payload: &[u8]) -> Inbound {
    match topic {
        TOPIC_CHAT_MESSAGE => Inbound::Scan(Trigger::ChatMessage),
        TOPIC_PLUGIN_EVENT => match serde_json::from_slice::<PluginEvent>(payload) {
            Ok(event) if event.event_name == SCHEDULED_CHECK_ALIVE => Inbound::Scan(Trigger::Scheduled),
            Ok(event) => {
                debug!(event = %event.event_name, from = ?event.from_id, "ignoring plugin event");
                Inbound::Ignored
            }
            Err(e) => {
                warn!(error = %e, "invalid plugin event JSON");
                Inbound::Ignored
            }
        },
        TOPIC_CHAT_CHANNEL => Inbound::ChannelReply,
        _ => Inbound::Ignored,
    }
}

pub fn create_mqtt_client(conf: &MqttConf) -> (AsyncClient, EventLoop) {
    let mut opts = MqttOptions::new("symbion-plugin-alive", &conf.host, conf.port);
    opts.set_keep_alive(Duration::from_secs(30));
    AsyncClient::new(opts, 10)
}

/// Lance un scan dans sa propre task
pub fn spawn_scan<P, N>(coordinator: Arc<ScanCoordinator<P, N>>, trigger: Trigger)
where
    P: Prober + 'static,
    N: Notifier + 'static,
{
    tokio::spawn(async move {
        debug!(?trigger, "scan requested");
        match coordinator.scan().await {
            Ok(report) => debug!(
                ?trigger,
                probed = report.probed,
                transitions = report.transitions.len(),
                notified = report.notified,
                "scan done"
            ),
            Err(e) => error!(?trigger, error = %e, "scan failed"),
        }
    });
}

/// Boucle principale MQTT du plugin. Ne rend la main qu'en cas d'arrêt du processus.
pub async fn run_event_loop<P>(
    client: AsyncClient,
    mut eventloop: EventLoop,
    coordinator: Arc<ScanCoordinator<P, ChatBridge<AsyncClient>>>,
    bridge: Arc<ChatBridge<AsyncClient>>,
) where
    P: Prober + 'static,
{
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                info!("connected to MQTT broker");
                let client = client.clone();
                // (ré)abonnement à chaque connexion, hors de la boucle de poll
                tokio::spawn(async move {
                    for topic in SUBSCRIPTIONS {
                        if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce).await {
                            error!(%topic, error = ?e, "subscribe failed");
                        }
                    }
                });
            }
            Ok(Event::Incoming(Incoming::Publish(p))) => match classify(&p.topic, &p.payload) {
                Inbound::Scan(trigger) => spawn_scan(coordinator.clone(), trigger),
                Inbound::ChannelReply => bridge.handle_reply(&p.payload),
                Inbound::Ignored => {}
            },
            Ok(_) => {}
            Err(e) => {
                warn!(error = ?e, "MQTT error");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

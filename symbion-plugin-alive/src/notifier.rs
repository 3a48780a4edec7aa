/**
 * CHAT BRIDGE - Notifications up/down vers le chat via MQTT
 *
 * RÔLE :
 * Implémente le collaborateur Notifier du coordinateur de scan.
 *
 * FONCTIONNEMENT :
 * - Résolution du canal : requête sur `symbion/chat/resolve@v1` avec un request_id,
 *   réponse attendue sur `symbion/chat/channel@v1` (timeout 5s)
 * - Envoi : publication sur `symbion/chat/send@v1`
 * - Les réponses sont routées vers la requête en attente par handle_reply()
 */

use crate::models::AvailabilityState;
use crate::mqtt::{Publisher, TOPIC_CHAT_RESOLVE, TOPIC_CHAT_SEND};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};
use uuid::Uuid;

pub type ChannelId = String;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Collaborateur de notification utilisé par le coordinateur de scan
pub trait Notifier: Send + Sync {
    fn resolve_channel_id(
        &self,
        channel_name: &str,
    ) -> impl Future<Output = Result<ChannelId, NotifyError>> + Send;

    fn send_notification(
        &self,
        channel_id: &ChannelId,
        message: &str,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("MQTT publish failed: {0}")]
    Publish(#[from] rumqttc::ClientError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("timestamp formatting failed: {0}")]
    Timestamp(#[from] time::error::Format),
    #[error("no reply for channel '{0}' after {1:?}")]
    Timeout(String, Duration),
    #[error("reply channel closed for '{0}'")]
    Dropped(String),
    #[error("channel '{name}' not resolved: {reason}")]
    Unresolved { name: String, reason: String },
}

/// Message chat pour une transition
pub fn format_transition(state: &AvailabilityState) -> String {
    if state.is_ok {
        format!(
            ":information_source: Server  ' {} '  is backed online! :tada:",
            state.host
        )
    } else {
        format!(
            ":warning: Server  ' {} '  is went offline! Please check ASAP. :soon:",
            state.host
        )
    }
}

#[derive(Debug, Serialize)]
struct ResolveRequest<'a> {
    request_id: &'a str,
    channel_name: &'a str,
}

/// Réponse du bot à une demande de résolution
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelReply {
    pub request_id: String,
    pub channel_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatSend<'a> {
    channel_id: &'a str,
    message: &'a str,
    ts: String,
}

pub struct ChatBridge<P> {
    publisher: P,
    /// Requêtes en attente : request_id -> sender pour la réponse
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<ChannelReply>>>>,
    reply_timeout: Duration,
}

impl<P: Publisher> ChatBridge<P> {
    pub fn new(publisher: P) -> Self {
        Self {
            publisher,
            pending: Arc::new(Mutex::new(HashMap::new())),
            reply_timeout: REPLY_TIMEOUT,
        }
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    /// Route une réponse `symbion/chat/channel@v1` vers la requête en attente
    pub fn handle_reply(&self, payload: &[u8]) {
        let reply: ChannelReply = match serde_json::from_slice(payload) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "invalid channel reply JSON");
                return;
            }
        };

        let sender = self.pending.lock().remove(&reply.request_id);
        match sender {
            Some(sender) => {
                let request_id = reply.request_id.clone();
                if sender.send(reply).is_err() {
                    debug!(%request_id, "channel reply arrived after requester gave up");
                }
            }
            None => debug!(request_id = %reply.request_id, "reply for unknown request"),
        }
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }
}

impl<P: Publisher> Notifier for ChatBridge<P> {
    async fn resolve_channel_id(&self, channel_name: &str) -> Result<ChannelId, NotifyError> {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);

        let request = ResolveRequest { request_id: &request_id, channel_name };
        let sent = match serde_json::to_vec(&request) {
            Ok(payload) => self
                .publisher
                .publish(TOPIC_CHAT_RESOLVE, payload)
                .await
                .map_err(NotifyError::from),
            Err(e) => Err(NotifyError::from(e)),
        };
        if let Err(e) = sent {
            self.pending.lock().remove(&request_id);
            return Err(e);
        }

        let reply = match timeout(self.reply_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                self.pending.lock().remove(&request_id);
                return Err(NotifyError::Dropped(channel_name.to_string()));
            }
            Err(_) => {
                self.pending.lock().remove(&request_id);
                return Err(NotifyError::Timeout(channel_name.to_string(), self.reply_timeout));
            }
        };

        match (reply.channel_id, reply.error) {
            (Some(id), None) if !id.is_empty() => Ok(id),
            (_, Some(reason)) => Err(NotifyError::Unresolved { name: channel_name.to_string(), reason }),
            _ => Err(NotifyError::Unresolved {
                name: channel_name.to_string(),
                reason: "empty reply".into(),
            }),
        }
    }

    async fn send_notification(&self, channel_id: &ChannelId, message: &str) -> Result<(), NotifyError> {
        let ts = OffsetDateTime::now_utc().format(&Rfc3339)?;
        let payload = serde_json::to_vec(&ChatSend { channel_id, message, ts })?;
        self.publisher.publish(TOPIC_CHAT_SEND, payload).await?;
        Ok(())
    }
}

//! Sonde de joignabilité TCP.
//!
//! Une seule tentative de connexion par cible et par scan, bornée par un timeout.
//! Toute erreur (refus, résolution DNS, timeout) compte comme "injoignable".

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Collaborateur de sonde utilisé par le coordinateur de scan
pub trait Prober: Send + Sync {
    fn is_reachable(&self, target: &str) -> impl Future<Output = bool> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone)]
pub struct TcpProber {
    timeout: Duration,
}

impl TcpProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Tente une connexion TCP sur `host:port`
    pub async fn try_connect(&self, target: &str) -> Result<(), ProbeError> {
        let stream = timeout(self.timeout, TcpStream::connect(target))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))??;
        drop(stream);
        Ok(())
    }
}

impl Prober for TcpProber {
    async fn is_reachable(&self, target: &str) -> bool {
        match self.try_connect(target).await {
            Ok(()) => true,
            Err(e) => {
                debug!(host = %target, error = %e, "probe failed");
                false
            }
        }
    }
}

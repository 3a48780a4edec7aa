/*!
# Symbion Plugin Alive - Surveillance de disponibilité TCP

Sonde une liste de cibles `host:port`, garde le dernier état connu de chacune
dans `data/states.json` et notifie le chat à chaque passage up ↔ down.

- `transition` : détection pure des transitions
- `store` : persistance atomique du snapshot
- `scan` : cycle de scan sérialisé (un seul à la fois)
- `probe` / `notifier` : collaborateurs TCP et chat (MQTT)
- `mqtt` : déclencheurs (message de chat, événement planifié)
*/

pub mod config;
pub mod models;
pub mod mqtt;
pub mod notifier;
pub mod probe;
pub mod scan;
pub mod store;
pub mod transition;

pub use config::AliveConfig;
pub use models::{AvailabilityState, StateSnapshot, Target};
pub use notifier::{ChatBridge, Notifier, NotifyError};
pub use probe::{Prober, TcpProber};
pub use scan::{ScanCoordinator, ScanError, ScanReport};
pub use store::{StateStore, StoreError};
pub use transition::{reconcile, Reconciliation};

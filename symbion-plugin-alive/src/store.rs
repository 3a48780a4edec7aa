/**
 * STATE STORE - Persistance JSON des états de disponibilité
 *
 * RÔLE :
 * Charge le snapshot au démarrage et le réécrit en entier après chaque scan.
 *
 * FONCTIONNEMENT :
 * - Fichier absent ou vide : snapshot vide `{"states":{}}` écrit immédiatement
 * - Écriture atomique : fichier temporaire dans le même dossier, fsync, rename,
 *   puis fsync du dossier pour que le rename survive à une coupure
 * - Un lecteur ne voit jamais un fichier à moitié écrit
 */

use crate::models::StateSnapshot;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

pub const DATA_DIR_NAME: &str = "data";
pub const STATES_JSON_FILENAME: &str = "states.json";

/// Erreurs du store d'états
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid state document {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Store rangé dans `<dir>/states.json`
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self::new(dir.as_ref().join(STATES_JSON_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Charge le snapshot. Auto-initialise le fichier au premier lancement.
    pub async fn load(&self) -> Result<StateSnapshot, StoreError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(StoreError::Read { path: self.path.clone(), source });
            }
        };

        if raw.trim().is_empty() {
            let snapshot = StateSnapshot::new();
            self.save(&snapshot).await?;
            info!(path = %self.path.display(), "created empty state file");
            return Ok(snapshot);
        }

        let snapshot: StateSnapshot = serde_json::from_str(&raw)
            .map_err(|source| StoreError::Corrupt { path: self.path.clone(), source })?;
        info!(path = %self.path.display(), states = snapshot.len(), "loaded states from disk");
        Ok(snapshot)
    }

    /// Remplace le fichier d'états de manière atomique
    pub async fn save(&self, snapshot: &StateSnapshot) -> Result<(), StoreError> {
        let payload = serde_json::to_vec(snapshot)?;
        let tmp = self.tmp_path();

        if let Err(source) = self.write_then_rename(&tmp, &payload).await {
            if let Err(e) = fs::remove_file(&tmp).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %tmp.display(), error = %e, "failed to remove temporary state file");
                }
            }
            return Err(StoreError::Write { path: self.path.clone(), source });
        }

        debug!(path = %self.path.display(), states = snapshot.len(), "states saved");
        Ok(())
    }

    async fn write_then_rename(&self, tmp: &Path, payload: &[u8]) -> std::io::Result<()> {
        let parent = self.parent_dir();
        fs::create_dir_all(parent).await?;
        let mut file = fs::File::create(tmp).await?;
        file.write_all(payload).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(tmp, &self.path).await?;
        sync_dir(parent).await
    }

    fn parent_dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| STATES_JSON_FILENAME.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Rend le rename durable : l'entrée de répertoire doit aussi atteindre le disque
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

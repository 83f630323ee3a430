//! Application state management

use anyhow::{Context, Result};
use devcat_core::{Aspect, DeviceType};
use devcat_store::{
    Catalog, DocumentStore, IndexConfig, MemoryStore, QueryEngine, ReferenceChecker,
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;

/// Shared application state
pub struct AppState {
    /// Re-derivation of criteria rows and aspect closures
    pub catalog: Catalog,
    /// Read side of the criteria index
    pub queries: QueryEngine,
    /// Delete-time reference checks
    pub usage: ReferenceChecker,
    /// Configuration
    pub config: Config,
}

impl AppState {
    /// Create new application state
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let store: Arc<dyn DocumentStore> = match &config.store.snapshot_path {
            Some(path) => Arc::new(MemoryStore::open(PathBuf::from(path)).await?),
            None => Arc::new(MemoryStore::new()),
        };

        let index = IndexConfig::init(
            store.as_ref(),
            config.collections.clone(),
            config.store.request_timeout(),
        )
        .await?;

        let state = Arc::new(Self {
            catalog: Catalog::new(store.clone(), index.clone()),
            queries: QueryEngine::new(store.clone(), index.clone()),
            usage: ReferenceChecker::new(store, index),
            config,
        });

        state.seed().await?;
        Ok(state)
    }

    /// Derive the configured seed files
    async fn seed(&self) -> Result<()> {
        if let Some(path) = &self.config.seed.aspects {
            let aspects: Vec<Aspect> = read_json(Path::new(path))?;
            for aspect in &aspects {
                self.catalog.upsert_aspect_tree(aspect).await?;
            }
            info!(path = %path, trees = aspects.len(), "Seeded aspect taxonomy");
        }

        if let Some(path) = &self.config.seed.device_types {
            let device_types: Vec<DeviceType> = read_json(Path::new(path))?;
            for device_type in &device_types {
                self.catalog.upsert_device_type(device_type).await?;
            }
            info!(path = %path, device_types = device_types.len(), "Seeded device types");
        }

        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse seed file {}", path.display()))
}

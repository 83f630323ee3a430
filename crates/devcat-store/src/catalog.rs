//! Re-derivation of the criteria index and aspect closure table
//!
//! Every write replaces all derived rows of one key: the device-type id for
//! criteria, the root aspect id for closure rows. Writes to the same key are
//! serialized; writes to different keys and all reads proceed concurrently.
//! A failed re-derivation may leave the key without rows; rerunning it is
//! idempotent.

use devcat_core::{extract_criteria, idmodifier, Aspect, DeviceType};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::aspect::AspectRepository;
use crate::criteria::CriteriaRepository;
use crate::index::IndexConfig;
use crate::locks::KeyedLocks;
use crate::store::{within, DocumentStore, StoreError};

pub struct Catalog {
    store: Arc<dyn DocumentStore>,
    config: Arc<IndexConfig>,
    criteria: CriteriaRepository,
    aspects: AspectRepository,
    device_type_locks: KeyedLocks,
    aspect_tree_locks: KeyedLocks,
}

impl Catalog {
    pub fn new(store: Arc<dyn DocumentStore>, config: Arc<IndexConfig>) -> Self {
        Self {
            criteria: CriteriaRepository::new(store.clone(), config.clone()),
            aspects: AspectRepository::new(store.clone(), config.clone()),
            store,
            config,
            device_type_locks: KeyedLocks::new(),
            aspect_tree_locks: KeyedLocks::new(),
        }
    }

    /// Recompute and replace all criteria rows of a device type.
    ///
    /// Returns the number of rows written.
    pub async fn upsert_device_type(&self, device_type: &DeviceType) -> Result<usize, StoreError> {
        if idmodifier::is_modified(&device_type.id) {
            return Err(StoreError::InvalidFilter(format!(
                "device type id {} carries a modifier",
                device_type.id
            )));
        }
        within(self.config.request_timeout, async {
            let _guard = self.device_type_locks.lock(&device_type.id).await;
            let rows = extract_criteria(device_type);
            let removed = self
                .criteria
                .replace_device_type(&device_type.id, &rows)
                .await?;
            self.store.flush().await?;
            info!(
                device_type = %device_type.id,
                rows = rows.len(),
                replaced = removed,
                "Re-derived device type criteria"
            );
            Ok(rows.len())
        })
        .await
    }

    /// Remove all criteria rows of a device type; returns the number removed
    pub async fn delete_device_type(&self, device_type_id: &str) -> Result<usize, StoreError> {
        let pure_id = idmodifier::pure_id(device_type_id);
        within(self.config.request_timeout, async {
            let _guard = self.device_type_locks.lock(pure_id).await;
            let removed = self.criteria.remove_device_type(pure_id).await?;
            self.store.flush().await?;
            info!(device_type = %pure_id, rows = removed, "Removed device type criteria");
            Ok(removed)
        })
        .await
    }

    /// Rebuild the closure rows of a whole aspect tree.
    ///
    /// Trees losing aspects to `root` are rebuilt in the same replacement and
    /// locked along with it. Returns the number of nodes written for `root`.
    pub async fn upsert_aspect_tree(&self, root: &Aspect) -> Result<usize, StoreError> {
        within(self.config.request_timeout, async {
            let mut roots = self.aspects.affected_roots(root).await?;
            loop {
                let _guards = self
                    .aspect_tree_locks
                    .lock_all(roots.iter().map(String::as_str))
                    .await;
                // Another rebuild may have moved aspects while we waited
                let current = self.aspects.affected_roots(root).await?;
                if !current.is_subset(&roots) {
                    debug!(root = %root.id, "Affected aspect trees changed, relocking");
                    roots.extend(current);
                    continue;
                }

                let written = self.aspects.replace_tree(root, &current).await?;
                self.store.flush().await?;
                info!(
                    root = %root.id,
                    nodes = written,
                    trees = current.len(),
                    "Rebuilt aspect closure"
                );
                return Ok(written);
            }
        })
        .await
    }

    /// Remove the closure rows of the tree rooted at `root_id`.
    ///
    /// Non-root ids remove nothing; sub-aspects leave a tree through an
    /// upsert of the updated root.
    pub async fn delete_aspect_tree(&self, root_id: &str) -> Result<usize, StoreError> {
        within(self.config.request_timeout, async {
            let _guard = self.aspect_tree_locks.lock(root_id).await;
            let removed = self.aspects.remove_tree(root_id).await?;
            if removed == 0 {
                warn!(root = %root_id, "No aspect tree rooted here");
            }
            self.store.flush().await?;
            info!(root = %root_id, nodes = removed, "Removed aspect closure");
            Ok(removed)
        })
        .await
    }
}

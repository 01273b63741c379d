use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{ClustermError, Result};
use crate::inventory::{AssetTransition, Inventory};
use crate::node::NodeRegistry;

/// Batch status writes against the inventory, keeping the registry snapshot
/// of every written node in sync.
#[derive(Clone)]
pub struct StatusTransitions {
    inventory: Arc<dyn Inventory>,
    registry: Arc<RwLock<NodeRegistry>>,
}

impl std::fmt::Debug for StatusTransitions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusTransitions").finish_non_exhaustive()
    }
}

impl StatusTransitions {
    pub fn new(inventory: Arc<dyn Inventory>, registry: Arc<RwLock<NodeRegistry>>) -> Self {
        Self {
            inventory,
            registry,
        }
    }

    async fn apply(&self, name: &str, update: AssetTransition) -> Result<()> {
        update.apply(self.inventory.as_ref(), name).await?;
        self.sync_node(name).await;
        Ok(())
    }

    /// Reload one node's inventory record into the registry.
    pub async fn sync_node(&self, name: &str) {
        match self.inventory.get_status(name).await {
            Ok(info) => self.registry.write().await.set_inventory(name, info),
            Err(e) => tracing::debug!(node = name, error = %e, "Failed to reload inventory record"),
        }
    }

    /// Apply `update` to every node in order. Failures are logged and skipped.
    pub async fn set_assets_status_best_effort(&self, names: &[String], update: AssetTransition) {
        for name in names {
            if let Err(e) = self.apply(name, update).await {
                tracing::error!(
                    node = %name,
                    status = %update,
                    error = %e,
                    "failed to update state in inventory"
                );
            }
        }
    }

    /// Apply `update` to every node in order. On the first failure, `revert` is
    /// applied best effort to every node up to and including the failing one,
    /// and the failure is returned.
    pub async fn set_assets_status_atomic(
        &self,
        names: &[String],
        update: AssetTransition,
        revert: AssetTransition,
    ) -> Result<()> {
        for (i, name) in names.iter().enumerate() {
            if let Err(e) = self.apply(name, update).await {
                self.set_assets_status_best_effort(&names[..=i], revert).await;
                return Err(ClustermError::TransitionFailed {
                    node: name.clone(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }
}

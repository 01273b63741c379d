use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{ClustermError, Result};
use crate::inventory::{AssetInfo, AssetState, AssetStatus, Inventory};

/// In-process inventory store.
#[derive(Debug, Default)]
pub struct MemInventory {
    assets: RwLock<HashMap<String, AssetInfo>>,
}

impl MemInventory {
    pub fn new() -> Self {
        Self::default()
    }

    async fn set_status(&self, name: &str, status: AssetStatus) -> Result<()> {
        let mut assets = self.assets.write().await;
        let asset = assets
            .get_mut(name)
            .ok_or_else(|| ClustermError::AssetNotFound(name.to_string()))?;
        tracing::debug!(asset = name, from = %asset.status, to = %status, "Asset status updated");
        asset.status = status;
        Ok(())
    }

    async fn set_state(&self, name: &str, state: AssetState) -> Result<()> {
        let mut assets = self.assets.write().await;
        let asset = assets
            .get_mut(name)
            .ok_or_else(|| ClustermError::AssetNotFound(name.to_string()))?;
        asset.state = state;
        Ok(())
    }
}

#[async_trait]
impl Inventory for MemInventory {
    async fn add_asset(&self, name: &str) -> Result<()> {
        self.assets
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn get_status(&self, name: &str) -> Result<AssetInfo> {
        self.assets
            .read()
            .await
            .get(name)
            .copied()
            .ok_or_else(|| ClustermError::AssetNotFound(name.to_string()))
    }

    async fn list_assets(&self) -> Vec<(String, AssetInfo)> {
        let mut assets: Vec<(String, AssetInfo)> = self
            .assets
            .read()
            .await
            .iter()
            .map(|(name, info)| (name.clone(), *info))
            .collect();
        assets.sort_by(|a, b| a.0.cmp(&b.0));
        assets
    }

    async fn set_asset_discovered(&self, name: &str) -> Result<()> {
        self.set_state(name, AssetState::Discovered).await
    }

    async fn set_asset_disappeared(&self, name: &str) -> Result<()> {
        self.set_state(name, AssetState::NotDiscovered).await
    }

    async fn set_asset_provisioning(&self, name: &str) -> Result<()> {
        self.set_status(name, AssetStatus::Provisioning).await
    }

    async fn set_asset_commissioned(&self, name: &str) -> Result<()> {
        self.set_status(name, AssetStatus::Allocated).await
    }

    async fn set_asset_cancelled(&self, name: &str) -> Result<()> {
        self.set_status(name, AssetStatus::Cancelled).await
    }

    async fn set_asset_decommissioned(&self, name: &str) -> Result<()> {
        self.set_status(name, AssetStatus::Decommissioned).await
    }

    async fn set_asset_unallocated(&self, name: &str) -> Result<()> {
        self.set_status(name, AssetStatus::Unallocated).await
    }
}

//! Inventory collaborator: the per-node discovery and allocation store.
//!
//! The manager only talks to the store through the [`Inventory`] trait. Every
//! setter is atomic for a single asset; batching and rollback across assets are
//! handled by the manager's transition primitives.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use memory::MemInventory;

/// Allocation status of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Unallocated,
    Provisioning,
    /// Commissioned and in cluster service
    Allocated,
    Cancelled,
    Decommissioned,
}

impl std::fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetStatus::Unallocated => write!(f, "unallocated"),
            AssetStatus::Provisioning => write!(f, "provisioning"),
            AssetStatus::Allocated => write!(f, "allocated"),
            AssetStatus::Cancelled => write!(f, "cancelled"),
            AssetStatus::Decommissioned => write!(f, "decommissioned"),
        }
    }
}

/// Discovery state of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetState {
    NotDiscovered,
    Discovered,
}

impl std::fmt::Display for AssetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetState::NotDiscovered => write!(f, "not-discovered"),
            AssetState::Discovered => write!(f, "discovered"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub status: AssetStatus,
    pub state: AssetState,
}

impl Default for AssetInfo {
    fn default() -> Self {
        Self {
            status: AssetStatus::Unallocated,
            state: AssetState::NotDiscovered,
        }
    }
}

/// A status write for one asset, dispatched to the matching inventory setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetTransition {
    Provisioning,
    Commissioned,
    Cancelled,
    Decommissioned,
    Unallocated,
}

impl AssetTransition {
    pub async fn apply(self, inventory: &dyn Inventory, name: &str) -> Result<()> {
        match self {
            AssetTransition::Provisioning => inventory.set_asset_provisioning(name).await,
            AssetTransition::Commissioned => inventory.set_asset_commissioned(name).await,
            AssetTransition::Cancelled => inventory.set_asset_cancelled(name).await,
            AssetTransition::Decommissioned => inventory.set_asset_decommissioned(name).await,
            AssetTransition::Unallocated => inventory.set_asset_unallocated(name).await,
        }
    }
}

impl std::fmt::Display for AssetTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetTransition::Provisioning => write!(f, "provisioning"),
            AssetTransition::Commissioned => write!(f, "commissioned"),
            AssetTransition::Cancelled => write!(f, "cancelled"),
            AssetTransition::Decommissioned => write!(f, "decommissioned"),
            AssetTransition::Unallocated => write!(f, "unallocated"),
        }
    }
}

#[async_trait]
pub trait Inventory: Send + Sync {
    /// Create the asset if it doesn't exist yet. Existing assets are left untouched.
    async fn add_asset(&self, name: &str) -> Result<()>;

    async fn get_status(&self, name: &str) -> Result<AssetInfo>;

    /// All assets sorted by name
    async fn list_assets(&self) -> Vec<(String, AssetInfo)>;

    async fn set_asset_discovered(&self, name: &str) -> Result<()>;
    async fn set_asset_disappeared(&self, name: &str) -> Result<()>;

    async fn set_asset_provisioning(&self, name: &str) -> Result<()>;
    /// Marks the asset as in cluster service ([`AssetStatus::Allocated`])
    async fn set_asset_commissioned(&self, name: &str) -> Result<()>;
    async fn set_asset_cancelled(&self, name: &str) -> Result<()>;
    async fn set_asset_decommissioned(&self, name: &str) -> Result<()>;
    async fn set_asset_unallocated(&self, name: &str) -> Result<()>;
}

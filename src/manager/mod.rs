//! The cluster manager: node registry, job gate and collaborators in one place.
//!
//! Lifecycle events (commission, decommission, update, discover) are driven
//! from [`crate::event`]; this module holds the state they operate on plus the
//! non-job operations: monitor notifications, globals and configuration.

pub mod transition;
pub mod validate;

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::Config;
use crate::configuration::Configuration;
use crate::error::{ClustermError, Result};
use crate::inventory::Inventory;
use crate::node::{Node, NodeRegistry};
use crate::scheduler::{JobInfo, JobScheduler};

pub use transition::StatusTransitions;

pub struct Manager {
    pub(crate) registry: Arc<RwLock<NodeRegistry>>,
    pub(crate) scheduler: Arc<JobScheduler>,
    pub(crate) inventory: Arc<dyn Inventory>,
    pub(crate) configuration: Arc<dyn Configuration>,
    pub(crate) transitions: StatusTransitions,
    settings: RwLock<Config>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl Manager {
    pub fn new(
        inventory: Arc<dyn Inventory>,
        configuration: Arc<dyn Configuration>,
        settings: Config,
    ) -> Self {
        let registry = Arc::new(RwLock::new(NodeRegistry::new()));
        configuration.reconfigure(&settings.ansible);
        Self {
            transitions: StatusTransitions::new(inventory.clone(), registry.clone()),
            registry,
            scheduler: Arc::new(JobScheduler::new()),
            inventory,
            configuration,
            settings: RwLock::new(settings),
        }
    }

    pub fn scheduler(&self) -> &Arc<JobScheduler> {
        &self.scheduler
    }

    pub async fn node(&self, name: &str) -> Result<Node> {
        self.registry.read().await.find_node(name).cloned()
    }

    pub async fn nodes(&self) -> Vec<Node> {
        self.registry
            .read()
            .await
            .nodes()
            .into_iter()
            .cloned()
            .collect()
    }

    // ---------------------------------------------------------------------
    // Monitor notifications
    // ---------------------------------------------------------------------

    /// A node showed up on the management network.
    pub async fn node_discovered(&self, name: &str, mgmt_addr: &str) -> Result<()> {
        self.inventory.add_asset(name).await?;
        self.inventory.set_asset_discovered(name).await?;
        let info = self.inventory.get_status(name).await?;

        let mut registry = self.registry.write().await;
        registry.upsert_discovered(name, mgmt_addr).inv = Some(info);
        tracing::info!(node = name, mgmt_addr, status = %info.status, "Node discovered");
        Ok(())
    }

    /// A known node stopped answering on the management network.
    pub async fn node_disappeared(&self, name: &str) -> Result<()> {
        self.registry.read().await.find_node(name)?;
        self.inventory.set_asset_disappeared(name).await?;
        self.transitions.sync_node(name).await;
        tracing::warn!(node = name, "Node disappeared");
        Ok(())
    }

    /// Reload every inventory record into the registry.
    pub async fn refresh_nodes(&self) {
        let assets = self.inventory.list_assets().await;
        let mut registry = self.registry.write().await;
        for (name, info) in assets {
            registry.set_inventory(&name, info);
        }
        tracing::debug!(nodes = registry.len(), "Node registry refreshed");
    }

    // ---------------------------------------------------------------------
    // Globals and configuration
    // ---------------------------------------------------------------------

    pub async fn globals(&self) -> String {
        self.settings.read().await.ansible.extra_vars.clone()
    }

    /// Replace the global extra vars merged into every workflow run.
    pub async fn set_globals(&self, extra_vars: &str) -> Result<()> {
        validate::validate_extra_vars(extra_vars)?;
        let mut settings = self.settings.write().await;
        settings.ansible.extra_vars = extra_vars.to_string();
        self.configuration.reconfigure(&settings.ansible);
        tracing::info!(extra_vars, "Global extra vars updated");
        Ok(())
    }

    pub async fn settings(&self) -> Config {
        self.settings.read().await.clone()
    }

    /// Replace the manager configuration. Takes effect for the next job.
    pub async fn apply_config(&self, config: Config) -> Result<()> {
        validate::validate_extra_vars(&config.ansible.extra_vars)?;
        self.configuration.reconfigure(&config.ansible);
        *self.settings.write().await = config;
        tracing::info!("Manager configuration updated");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Jobs
    // ---------------------------------------------------------------------

    pub fn active_job(&self) -> Result<JobInfo> {
        self.scheduler
            .active_job()
            .map(|job| job.info())
            .ok_or(ClustermError::NoActiveJob)
    }

    pub fn last_job(&self) -> Option<JobInfo> {
        self.scheduler.last_job().map(|job| job.info())
    }

    pub fn cancel_active_job(&self) -> Result<String> {
        self.scheduler.cancel_active_job()
    }
}

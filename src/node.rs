use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::configuration::{HostConfig, HostGroup};
use crate::error::{ClustermError, Result};
use crate::inventory::{AssetInfo, AssetState, AssetStatus};

/// A managed cluster machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub mgmt_addr: Option<String>,
    /// Configuration descriptor, assigned when the node gets commissioned
    pub cfg: Option<HostConfig>,
    /// Last known inventory record
    pub inv: Option<AssetInfo>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mgmt_addr: None,
            cfg: None,
            inv: None,
        }
    }

    pub fn with_mgmt_addr(mut self, addr: impl Into<String>) -> Self {
        self.mgmt_addr = Some(addr.into());
        self
    }

    pub fn with_config(mut self, cfg: HostConfig) -> Self {
        self.cfg = Some(cfg);
        self
    }

    pub fn with_inventory(mut self, inv: AssetInfo) -> Self {
        self.inv = Some(inv);
        self
    }
}

/// Name-indexed view of all nodes the manager knows about.
#[derive(Debug, Default, Clone)]
pub struct NodeRegistry {
    nodes: HashMap<String, Node>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: Node) {
        self.nodes.insert(node.name.clone(), node);
    }

    /// Record a node reported by discovery, creating it on first sight.
    ///
    /// Management addresses are unique: any other node still holding
    /// `mgmt_addr` loses it.
    pub fn upsert_discovered(&mut self, name: &str, mgmt_addr: &str) -> &mut Node {
        for node in self.nodes.values_mut() {
            if node.name != name && node.mgmt_addr.as_deref() == Some(mgmt_addr) {
                tracing::info!(node = %node.name, mgmt_addr, "Management address moved to another node");
                node.mgmt_addr = None;
            }
        }
        let node = self
            .nodes
            .entry(name.to_string())
            .or_insert_with(|| Node::new(name));
        node.mgmt_addr = Some(mgmt_addr.to_string());
        node
    }

    pub fn set_config(&mut self, name: &str, cfg: HostConfig) -> Result<()> {
        let node = self
            .nodes
            .get_mut(name)
            .ok_or_else(|| ClustermError::NodeNotExists(name.to_string()))?;
        node.cfg = Some(cfg);
        Ok(())
    }

    /// Refresh the inventory snapshot of a node. Unknown names are added.
    pub fn set_inventory(&mut self, name: &str, inv: AssetInfo) {
        self.nodes
            .entry(name.to_string())
            .or_insert_with(|| Node::new(name))
            .inv = Some(inv);
    }

    /// Node names in lexical order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nodes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Nodes in lexical name order
    pub fn nodes(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.nodes.values().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find_node(&self, name: &str) -> Result<&Node> {
        self.nodes
            .get(name)
            .ok_or_else(|| ClustermError::NodeNotExists(name.to_string()))
    }

    pub fn find_node_by_mgmt_addr(&self, addr: &str) -> Result<&Node> {
        self.nodes
            .values()
            .find(|n| n.mgmt_addr.as_deref() == Some(addr))
            .ok_or_else(|| ClustermError::NodeNotExists(addr.to_string()))
    }

    fn node_group(&self, name: &str) -> Result<HostGroup> {
        let node = self.find_node(name)?;
        node.cfg
            .as_ref()
            .map(|cfg| cfg.group)
            .ok_or_else(|| ClustermError::NodeConfigNotExists(name.to_string()))
    }

    fn node_inventory(&self, name: &str) -> Result<AssetInfo> {
        let node = self.find_node(name)?;
        node.inv
            .ok_or_else(|| ClustermError::NodeInventoryNotExists(name.to_string()))
    }

    pub fn is_master_node(&self, name: &str) -> Result<bool> {
        Ok(self.node_group(name)? == HostGroup::Master)
    }

    pub fn is_worker_node(&self, name: &str) -> Result<bool> {
        Ok(self.node_group(name)? == HostGroup::Worker)
    }

    pub fn is_discovered_node(&self, name: &str) -> Result<bool> {
        Ok(self.node_inventory(name)?.state == AssetState::Discovered)
    }

    /// Succeeds if every node is discovered. Otherwise the error lists all the
    /// nodes that are not, so unreachable nodes can be told apart from a typo.
    pub fn are_discovered_nodes(&self, names: &[String]) -> Result<()> {
        let mut disappeared = Vec::new();
        for name in names {
            if !self.is_discovered_node(name)? {
                disappeared.push(name.clone());
            }
        }
        if !disappeared.is_empty() {
            return Err(ClustermError::NodesNotDiscovered(disappeared));
        }
        Ok(())
    }

    pub fn is_discovered_and_allocated_node(&self, name: &str) -> Result<bool> {
        let inv = self.node_inventory(name)?;
        Ok(inv.state == AssetState::Discovered && inv.status == AssetStatus::Allocated)
    }
}

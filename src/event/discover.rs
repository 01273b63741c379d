use std::fmt;
use std::net::IpAddr;

use crate::configuration::{Configuration, HostConfig, WorkflowRun};
use crate::error::{ClustermError, Result};
use crate::event::{LifecycleEvent, Prepared};
use crate::manager::validate::validate_multi_node_addrs;
use crate::manager::Manager;
use crate::node::NodeRegistry;
use crate::scheduler::JobInfo;

/// Bring the discovery agent up on a set of addresses. The nodes register
/// themselves through the monitor once it runs, so no inventory is touched.
#[derive(Debug, Clone)]
pub struct DiscoverEvent {
    addrs: Vec<IpAddr>,
    extra_vars: String,
}

impl DiscoverEvent {
    pub fn new(addrs: Vec<IpAddr>, extra_vars: impl Into<String>) -> Self {
        Self {
            addrs,
            extra_vars: extra_vars.into(),
        }
    }
}

impl fmt::Display for DiscoverEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "discoverEvent: addrs:{:?} extra-vars: {}",
            self.addrs, self.extra_vars
        )
    }
}

impl LifecycleEvent for DiscoverEvent {
    fn extra_vars(&self) -> &str {
        &self.extra_vars
    }

    fn prepare(&self, registry: &NodeRegistry) -> Result<Prepared> {
        for addr in &self.addrs {
            let addr = addr.to_string();
            let Ok(node) = registry.find_node_by_mgmt_addr(&addr) else {
                continue;
            };
            if registry.is_discovered_node(&node.name).unwrap_or(false) {
                tracing::debug!(node = %node.name, addr = %addr, "Address already discovered");
                return Err(ClustermError::NodeAlreadyExists(addr));
            }
        }
        Ok(Prepared::default())
    }

    fn launch(
        &self,
        configuration: &dyn Configuration,
        _hosts: &[HostConfig],
        extra_vars: &str,
    ) -> WorkflowRun {
        configuration.discover(&self.addrs, extra_vars)
    }
}

impl Manager {
    pub async fn discover_nodes(&self, addrs: &[String], extra_vars: &str) -> Result<JobInfo> {
        let addrs = validate_multi_node_addrs(addrs)?;
        self.process_event(DiscoverEvent::new(addrs, extra_vars)).await
    }
}

use std::fmt;

use crate::configuration::{Configuration, HostConfig, HostGroup, WorkflowRun};
use crate::error::{ClustermError, Result};
use crate::event::{common_event_validate, LifecycleEvent, Prepared};
use crate::inventory::{AssetStatus, AssetTransition};
use crate::manager::validate::{validate_multi_node_names, validate_one_arg};
use crate::manager::Manager;
use crate::node::NodeRegistry;
use crate::scheduler::{JobInfo, JobStatus};

/// Provision discovered nodes into a host group.
#[derive(Debug, Clone)]
pub struct CommissionEvent {
    nodes: Vec<String>,
    extra_vars: String,
    host_group: HostGroup,
}

impl CommissionEvent {
    pub fn new(nodes: Vec<String>, extra_vars: impl Into<String>, host_group: HostGroup) -> Self {
        Self {
            nodes,
            extra_vars: extra_vars.into(),
            host_group,
        }
    }
}

impl fmt::Display for CommissionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "commissionEvent: nodes:{:?} extra-vars: {} host-group: {}",
            self.nodes, self.extra_vars, self.host_group
        )
    }
}

impl LifecycleEvent for CommissionEvent {
    fn extra_vars(&self) -> &str {
        &self.extra_vars
    }

    fn prepare(&self, registry: &NodeRegistry) -> Result<Prepared> {
        let names = common_event_validate(registry, &self.nodes)?;
        registry.are_discovered_nodes(&names)?;

        let mut hosts = Vec::with_capacity(names.len());
        for name in &names {
            let node = registry.find_node(name)?;
            if node.inv.is_some_and(|inv| inv.status == AssetStatus::Allocated) {
                return Err(ClustermError::NodeAlreadyCommissioned(name.clone()));
            }
            let addr = node.mgmt_addr.clone().unwrap_or_else(|| name.clone());
            hosts.push(HostConfig::new(name.as_str(), addr, self.host_group));
        }
        Ok(Prepared { names, hosts })
    }

    fn provisional(&self) -> Option<(AssetTransition, AssetTransition)> {
        Some((AssetTransition::Provisioning, AssetTransition::Unallocated))
    }

    fn terminal(&self, status: JobStatus) -> Option<AssetTransition> {
        match status {
            JobStatus::Completed => Some(AssetTransition::Commissioned),
            _ => Some(AssetTransition::Unallocated),
        }
    }

    fn assigns_config(&self) -> bool {
        true
    }

    fn launch(
        &self,
        configuration: &dyn Configuration,
        hosts: &[HostConfig],
        extra_vars: &str,
    ) -> WorkflowRun {
        configuration.commission(hosts, extra_vars)
    }
}

impl Manager {
    pub async fn commission_node(
        &self,
        name: &str,
        extra_vars: &str,
        host_group: &str,
    ) -> Result<JobInfo> {
        let names = vec![name.to_string()];
        validate_one_arg(&names)?;
        self.commission_nodes(&names, extra_vars, host_group).await
    }

    /// Commission `names` into `host_group`.
    pub async fn commission_nodes(
        &self,
        names: &[String],
        extra_vars: &str,
        host_group: &str,
    ) -> Result<JobInfo> {
        validate_multi_node_names(names)?;
        let host_group: HostGroup = host_group.parse()?;
        self.process_event(CommissionEvent::new(names.to_vec(), extra_vars, host_group))
            .await
    }
}

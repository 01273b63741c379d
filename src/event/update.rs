use std::fmt;

use crate::configuration::{Configuration, HostConfig, HostGroup, WorkflowRun};
use crate::error::{ClustermError, Result};
use crate::event::{common_event_validate, LifecycleEvent, Prepared};
use crate::inventory::AssetTransition;
use crate::manager::validate::{validate_multi_node_names, validate_one_arg};
use crate::manager::Manager;
use crate::node::NodeRegistry;
use crate::scheduler::{JobInfo, JobStatus};

/// Re-provision commissioned nodes, optionally moving them to another group.
#[derive(Debug, Clone)]
pub struct UpdateEvent {
    nodes: Vec<String>,
    extra_vars: String,
    host_group: Option<HostGroup>,
}

impl UpdateEvent {
    pub fn new(
        nodes: Vec<String>,
        extra_vars: impl Into<String>,
        host_group: Option<HostGroup>,
    ) -> Self {
        Self {
            nodes,
            extra_vars: extra_vars.into(),
            host_group,
        }
    }
}

impl fmt::Display for UpdateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "updateEvent: nodes:{:?} extra-vars: {} host-group: {}",
            self.nodes,
            self.extra_vars,
            self.host_group.map(|g| g.as_str()).unwrap_or("")
        )
    }
}

impl LifecycleEvent for UpdateEvent {
    fn extra_vars(&self) -> &str {
        &self.extra_vars
    }

    fn prepare(&self, registry: &NodeRegistry) -> Result<Prepared> {
        let names = common_event_validate(registry, &self.nodes)?;
        registry.are_discovered_nodes(&names)?;

        let mut hosts = Vec::with_capacity(names.len());
        for name in &names {
            if !registry.is_discovered_and_allocated_node(name)? {
                return Err(ClustermError::NodeNotCommissioned(name.clone()));
            }
            let node = registry.find_node(name)?;
            let group = match (self.host_group, &node.cfg) {
                (Some(group), _) => group,
                (None, Some(cfg)) => cfg.group,
                (None, None) => return Err(ClustermError::NodeConfigNotExists(name.clone())),
            };
            let addr = node
                .mgmt_addr
                .clone()
                .or_else(|| node.cfg.as_ref().map(|cfg| cfg.addr.clone()))
                .unwrap_or_else(|| name.clone());
            hosts.push(HostConfig::new(name.as_str(), addr, group));
        }
        Ok(Prepared { names, hosts })
    }

    fn provisional(&self) -> Option<(AssetTransition, AssetTransition)> {
        Some((AssetTransition::Provisioning, AssetTransition::Commissioned))
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
        configuration.update(hosts, extra_vars)
    }
}

impl Manager {
    pub async fn update_node(
        &self,
        name: &str,
        extra_vars: &str,
        host_group: &str,
    ) -> Result<JobInfo> {
        let names = vec![name.to_string()];
        validate_one_arg(&names)?;
        self.update_nodes(&names, extra_vars, host_group).await
    }

    /// Update `names`. An empty `host_group` keeps each node's current group.
    pub async fn update_nodes(
        &self,
        names: &[String],
        extra_vars: &str,
        host_group: &str,
    ) -> Result<JobInfo> {
        validate_multi_node_names(names)?;
        let host_group = match host_group {
            "" => None,
            group => Some(group.parse::<HostGroup>()?),
        };
        self.process_event(UpdateEvent::new(names.to_vec(), extra_vars, host_group))
            .await
    }
}

use std::collections::HashSet;
use std::fmt;

use crate::configuration::{Configuration, HostConfig, WorkflowRun};
use crate::error::{ClustermError, Result};
use crate::event::{common_event_validate, LifecycleEvent, Prepared};
use crate::inventory::{AssetStatus, AssetTransition};
use crate::manager::validate::{validate_multi_node_names, validate_one_arg};
use crate::manager::Manager;
use crate::node::NodeRegistry;
use crate::scheduler::{JobInfo, JobStatus};

/// Tear cluster services down on commissioned nodes.
#[derive(Debug, Clone)]
pub struct DecommissionEvent {
    nodes: Vec<String>,
    extra_vars: String,
}

impl DecommissionEvent {
    pub fn new(nodes: Vec<String>, extra_vars: impl Into<String>) -> Self {
        Self {
            nodes,
            extra_vars: extra_vars.into(),
        }
    }
}

impl fmt::Display for DecommissionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "decommissionEvent: nodes:{:?} extra-vars: {}",
            self.nodes, self.extra_vars
        )
    }
}

/// Once the targets are gone, the remaining commissioned workers still need
/// a master. Nodes whose state can't be determined are left out of the count.
fn check_masters_left(registry: &NodeRegistry, targets: &HashSet<&str>) -> Result<()> {
    let mut masters_left = 0;
    let mut workers_left = 0;
    for name in registry.names() {
        if targets.contains(name.as_str()) {
            continue;
        }
        match registry.is_discovered_and_allocated_node(&name) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                tracing::debug!(node = %name, error = %e, "a node check failed");
                continue;
            }
        }
        match registry.is_worker_node(&name) {
            Ok(true) => workers_left += 1,
            Ok(false) => masters_left += 1,
            Err(e) => {
                tracing::debug!(node = %name, error = %e, "a node check failed");
            }
        }
    }

    if workers_left > 0 && masters_left <= 0 {
        return Err(ClustermError::WorkersWithoutMaster);
    }
    Ok(())
}

impl LifecycleEvent for DecommissionEvent {
    fn extra_vars(&self) -> &str {
        &self.extra_vars
    }

    fn prepare(&self, registry: &NodeRegistry) -> Result<Prepared> {
        let names = common_event_validate(registry, &self.nodes)?;
        let targets: HashSet<&str> = names.iter().map(String::as_str).collect();
        check_masters_left(registry, &targets)?;

        // the provisional revert restores Commissioned, so only commissioned
        // nodes can be targets
        let mut hosts = Vec::with_capacity(names.len());
        for name in &names {
            let node = registry.find_node(name)?;
            let cfg = node
                .cfg
                .clone()
                .ok_or_else(|| ClustermError::NodeConfigNotExists(name.clone()))?;
            match node.inv {
                Some(inv) if inv.status == AssetStatus::Allocated => {}
                Some(_) => return Err(ClustermError::NodeNotCommissioned(name.clone())),
                None => return Err(ClustermError::NodeInventoryNotExists(name.clone())),
            }
            hosts.push(cfg);
        }
        Ok(Prepared { names, hosts })
    }

    fn provisional(&self) -> Option<(AssetTransition, AssetTransition)> {
        Some((AssetTransition::Cancelled, AssetTransition::Commissioned))
    }

    fn terminal(&self, _status: JobStatus) -> Option<AssetTransition> {
        Some(AssetTransition::Decommissioned)
    }

    fn launch(
        &self,
        configuration: &dyn Configuration,
        hosts: &[HostConfig],
        extra_vars: &str,
    ) -> WorkflowRun {
        configuration.cleanup(hosts, extra_vars)
    }
}

impl Manager {
    pub async fn decommission_node(&self, name: &str, extra_vars: &str) -> Result<JobInfo> {
        let names = vec![name.to_string()];
        validate_one_arg(&names)?;
        self.decommission_nodes(&names, extra_vars).await
    }

    pub async fn decommission_nodes(&self, names: &[String], extra_vars: &str) -> Result<JobInfo> {
        validate_multi_node_names(names)?;
        self.process_event(DecommissionEvent::new(names.to_vec(), extra_vars))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::HostGroup;
    use crate::inventory::{AssetInfo, AssetState};
    use crate::node::Node;

    fn commissioned(name: &str, group: HostGroup) -> Node {
        Node::new(name)
            .with_config(HostConfig::new(name, name, group))
            .with_inventory(AssetInfo {
                status: AssetStatus::Allocated,
                state: AssetState::Discovered,
            })
    }

    fn event(names: &[&str]) -> DecommissionEvent {
        DecommissionEvent::new(names.iter().map(|s| s.to_string()).collect(), "")
    }

    #[test]
    fn last_master_cannot_leave_workers_behind() {
        let mut reg = NodeRegistry::new();
        reg.insert(commissioned("m1", HostGroup::Master));
        reg.insert(commissioned("w1", HostGroup::Worker));

        assert!(matches!(
            event(&["m1"]).prepare(&reg),
            Err(ClustermError::WorkersWithoutMaster)
        ));

        let prepared = event(&["w1"]).prepare(&reg).unwrap();
        assert_eq!(prepared.names, vec!["w1".to_string()]);
        assert_eq!(prepared.hosts[0].group, HostGroup::Worker);
    }

    #[test]
    fn whole_cluster_can_go_at_once() {
        let mut reg = NodeRegistry::new();
        reg.insert(commissioned("m1", HostGroup::Master));
        reg.insert(commissioned("w1", HostGroup::Worker));

        let prepared = event(&["m1", "w1"]).prepare(&reg).unwrap();
        assert_eq!(prepared.hosts.len(), 2);
    }

    #[test]
    fn undeterminable_nodes_are_skipped() {
        let mut reg = NodeRegistry::new();
        reg.insert(commissioned("m1", HostGroup::Master));
        reg.insert(commissioned("m2", HostGroup::Master));
        // no inventory record and no config: skipped, not an error
        reg.insert(Node::new("stray"));
        reg.insert(Node::new("half").with_inventory(AssetInfo {
            status: AssetStatus::Allocated,
            state: AssetState::Discovered,
        }));

        assert!(event(&["m1"]).prepare(&reg).is_ok());
    }

    #[test]
    fn target_must_be_commissioned() {
        let mut reg = NodeRegistry::new();
        reg.insert(commissioned("m1", HostGroup::Master));
        for (name, status) in [
            ("failed", AssetStatus::Unallocated),
            ("stuck", AssetStatus::Cancelled),
            ("gone", AssetStatus::Decommissioned),
        ] {
            reg.insert(
                Node::new(name)
                    .with_config(HostConfig::new(name, name, HostGroup::Worker))
                    .with_inventory(AssetInfo {
                        status,
                        state: AssetState::Discovered,
                    }),
            );
            assert!(matches!(
                event(&[name]).prepare(&reg),
                Err(ClustermError::NodeNotCommissioned(n)) if n == name
            ));
        }
    }

    #[test]
    fn target_needs_a_config() {
        let mut reg = NodeRegistry::new();
        reg.insert(commissioned("m1", HostGroup::Master));
        reg.insert(Node::new("raw"));

        assert!(matches!(
            event(&["raw"]).prepare(&reg),
            Err(ClustermError::NodeConfigNotExists(n)) if n == "raw"
        ));
    }
}

//! Lifecycle events and the job skeleton they share.
//!
//! Every event goes through [`Manager::process_event`]: register the job with
//! the single-flight gate, prepare against the registry, apply the provisional
//! inventory transition and hand the job to a background task. The event's
//! entry points on [`Manager`] validate the argument shape before any of that.

mod commission;
mod decommission;
mod discover;
mod update;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::configuration::{Configuration, HostConfig, WorkflowRun};
use crate::error::{ClustermError, Result};
use crate::inventory::AssetTransition;
use crate::manager::validate::merge_extra_vars;
use crate::manager::Manager;
use crate::node::NodeRegistry;
use crate::scheduler::{ActiveJobGuard, DoneCallback, JobInfo, JobRunner, JobStatus};
use crate::worker::log_output_and_return_status;

pub use commission::CommissionEvent;
pub use decommission::DecommissionEvent;
pub use discover::DiscoverEvent;
pub use update::UpdateEvent;

/// What an event resolved to against the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prepared {
    /// Target node names, in request order, without duplicates
    pub names: Vec<String>,
    /// Workflow hosts for the targets
    pub hosts: Vec<HostConfig>,
}

/// Everything the job runner and done-callback need, filled in once the
/// event has been prepared.
#[derive(Debug)]
struct Plan {
    prepared: Prepared,
    extra_vars: String,
}

pub trait LifecycleEvent: fmt::Display + Send + Sync + 'static {
    /// Event-specific extra vars, merged over the globals.
    fn extra_vars(&self) -> &str;

    /// Resolve the targets and enforce the event's invariants.
    fn prepare(&self, registry: &NodeRegistry) -> Result<Prepared>;

    /// Inventory transition applied atomically before the workflow starts,
    /// with the transition that undoes it.
    fn provisional(&self) -> Option<(AssetTransition, AssetTransition)> {
        None
    }

    /// Inventory transition applied best effort once the job ends.
    fn terminal(&self, _status: JobStatus) -> Option<AssetTransition> {
        None
    }

    /// Whether the prepared host configs are recorded on the nodes.
    fn assigns_config(&self) -> bool {
        false
    }

    fn launch(
        &self,
        configuration: &dyn Configuration,
        hosts: &[HostConfig],
        extra_vars: &str,
    ) -> WorkflowRun;
}

/// Resolve `names` against the registry: every name must exist. Duplicates
/// are dropped, first occurrence wins.
pub(crate) fn common_event_validate(registry: &NodeRegistry, names: &[String]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(names.len());
    for name in names {
        registry.find_node(name)?;
        if seen.insert(name.as_str()) {
            resolved.push(name.clone());
        }
    }
    Ok(resolved)
}

impl Manager {
    /// Register, prepare and launch a lifecycle event as the active job.
    ///
    /// Returns once the job has been handed to a background task. Any failure
    /// before that releases the gate again.
    pub async fn process_event<E: LifecycleEvent>(&self, event: E) -> Result<JobInfo> {
        let event = Arc::new(event);
        let plan: Arc<OnceLock<Plan>> = Arc::default();
        let settings = self.settings().await;

        let runner: JobRunner = {
            let event = event.clone();
            let plan = plan.clone();
            let configuration = self.configuration.clone();
            let ack_timeout = settings.jobs.cancel_ack_timeout();
            Box::new(move |cancel, logs| {
                Box::pin(async move {
                    let plan = plan.get().ok_or_else(|| {
                        ClustermError::Workflow("job started before it was prepared".to_string())
                    })?;
                    let run = event.launch(
                        configuration.as_ref(),
                        &plan.prepared.hosts,
                        &plan.extra_vars,
                    );
                    log_output_and_return_status(run, cancel, logs, ack_timeout).await
                })
            })
        };

        let done_cb: DoneCallback = {
            let event = event.clone();
            let plan = plan.clone();
            let transitions = self.transitions.clone();
            Box::new(move |status, err| {
                Box::pin(async move {
                    if status == JobStatus::Errored {
                        let reason = err.map(|e| e.to_string()).unwrap_or_default();
                        tracing::error!(job = %event, error = %reason, "Job failed");
                    }
                    let (Some(plan), Some(update)) = (plan.get(), event.terminal(status)) else {
                        return;
                    };
                    transitions
                        .set_assets_status_best_effort(&plan.prepared.names, update)
                        .await;
                })
            })
        };

        let job = self
            .scheduler
            .check_and_set_active_job(event.to_string(), runner, done_cb)?;
        let guard = ActiveJobGuard::new(&self.scheduler);

        let extra_vars = merge_extra_vars(&settings.ansible.extra_vars, event.extra_vars())?;
        let prepared = event.prepare(&*self.registry.read().await)?;

        if let Some((update, revert)) = event.provisional() {
            self.transitions
                .set_assets_status_atomic(&prepared.names, update, revert)
                .await?;
        }

        if event.assigns_config() {
            if let Err(e) = self.assign_configs(&prepared.hosts).await {
                if let Some((_, revert)) = event.provisional() {
                    self.transitions
                        .set_assets_status_best_effort(&prepared.names, revert)
                        .await;
                }
                return Err(e);
            }
        }

        plan.set(Plan {
            prepared,
            extra_vars,
        })
        .map_err(|_| ClustermError::Workflow("job prepared twice".to_string()))?;
        guard.disarm();

        let scheduler = self.scheduler.clone();
        tokio::spawn(async move { scheduler.run_active_job().await });

        tracing::info!(job = %job.desc(), job_id = %job.id(), "Job scheduled");
        Ok(job.info())
    }

    async fn assign_configs(&self, hosts: &[HostConfig]) -> Result<()> {
        let mut registry = self.registry.write().await;
        for host in hosts {
            registry.set_config(&host.name, host.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn common_validate_keeps_order_and_drops_duplicates() {
        let mut reg = NodeRegistry::new();
        for name in ["a", "b", "c"] {
            reg.insert(Node::new(name));
        }
        let resolved = common_event_validate(&reg, &names(&["c", "a", "c", "b", "a"])).unwrap();
        assert_eq!(resolved, names(&["c", "a", "b"]));
    }

    #[test]
    fn common_validate_fails_on_unknown_node() {
        let mut reg = NodeRegistry::new();
        reg.insert(Node::new("a"));
        assert!(matches!(
            common_event_validate(&reg, &names(&["a", "zz"])),
            Err(ClustermError::NodeNotExists(n)) if n == "zz"
        ));
    }
}

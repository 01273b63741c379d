//! Configuration collaborator: launches the provisioning workflows.
//!
//! A workflow is opaque to the manager. Launching one returns a [`WorkflowRun`]:
//! an output stream to be logged, a token that asks the workflow to stop, and a
//! channel that resolves once with the workflow's outcome.

pub mod ansible;

use std::net::IpAddr;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::AnsibleSettings;
use crate::error::{ClustermError, Result};

pub use ansible::AnsibleConfiguration;

pub const MASTER_GROUP_NAME: &str = "service-master";
pub const WORKER_GROUP_NAME: &str = "service-worker";
pub const DISCOVERY_GROUP_NAME: &str = "cluster-node";

/// Host group a commissioned node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostGroup {
    #[serde(rename = "service-master")]
    Master,
    #[serde(rename = "service-worker")]
    Worker,
}

impl HostGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostGroup::Master => MASTER_GROUP_NAME,
            HostGroup::Worker => WORKER_GROUP_NAME,
        }
    }
}

impl std::fmt::Display for HostGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostGroup {
    type Err = ClustermError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            MASTER_GROUP_NAME => Ok(HostGroup::Master),
            WORKER_GROUP_NAME => Ok(HostGroup::Worker),
            other => Err(ClustermError::InvalidHostGroup(other.to_string())),
        }
    }
}

/// Checks if the passed host group name is one the manager accepts.
pub fn is_valid_host_group(group: &str) -> bool {
    matches!(group, MASTER_GROUP_NAME | WORKER_GROUP_NAME)
}

/// Configuration descriptor of a node as handed to the workflows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    pub name: String,
    pub addr: String,
    pub group: HostGroup,
}

impl HostConfig {
    pub fn new(name: impl Into<String>, addr: impl Into<String>, group: HostGroup) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            group,
        }
    }
}

pub type OutputStream = Pin<Box<dyn AsyncRead + Send>>;

/// Handle to a launched workflow.
pub struct WorkflowRun {
    /// Combined workflow output, ends when the workflow is done writing
    pub output: OutputStream,
    /// Cancelling this asks the workflow to stop
    pub cancel: CancellationToken,
    /// Resolves once with the workflow outcome
    pub result: oneshot::Receiver<Result<()>>,
}

impl std::fmt::Debug for WorkflowRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRun")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

pub trait Configuration: Send + Sync {
    /// Provision the hosts into their groups
    fn commission(&self, hosts: &[HostConfig], extra_vars: &str) -> WorkflowRun;

    /// Tear the cluster services down on the hosts
    fn cleanup(&self, hosts: &[HostConfig], extra_vars: &str) -> WorkflowRun;

    /// Re-provision already commissioned hosts
    fn update(&self, hosts: &[HostConfig], extra_vars: &str) -> WorkflowRun;

    /// Bring up the discovery agent on the addresses
    fn discover(&self, addrs: &[IpAddr], extra_vars: &str) -> WorkflowRun;

    /// Replace the workflow settings. Runs already launched are unaffected.
    fn reconfigure(&self, _settings: &AnsibleSettings) {}
}

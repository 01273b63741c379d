use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings for the Ansible-backed configuration subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnsibleSettings {
    /// Directory holding the playbooks
    pub playbook_location: PathBuf,
    /// Playbook run to commission nodes (also the second half of an update)
    pub commission_playbook: String,
    /// Playbook run to decommission nodes (also the first half of an update)
    pub cleanup_playbook: String,
    /// Playbook run against freshly discovered addresses
    pub discover_playbook: String,
    /// Remote user used by ansible
    pub user: String,
    /// Private key used by ansible, if any
    pub private_key: Option<PathBuf>,
    /// Global extra vars (a JSON object) merged into every workflow run
    pub extra_vars: String,
}

impl Default for AnsibleSettings {
    fn default() -> Self {
        Self {
            playbook_location: PathBuf::from("/etc/clusterm/ansible"),
            commission_playbook: "site.yml".to_string(),
            cleanup_playbook: "cleanup.yml".to_string(),
            discover_playbook: "discover.yml".to_string(),
            user: "clusterm".to_string(),
            private_key: None,
            extra_vars: "{}".to_string(),
        }
    }
}

/// Settings for job execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// How long a cancelled workflow may take to acknowledge. 0 waits forever.
    pub cancel_ack_timeout_secs: u64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            cancel_ack_timeout_secs: 300,
        }
    }
}

impl JobSettings {
    pub fn cancel_ack_timeout(&self) -> Option<Duration> {
        match self.cancel_ack_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Bulk manager configuration, as posted by `clusterm config set` or loaded at
/// startup with `--config`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ansible: AnsibleSettings,
    pub jobs: JobSettings,
}

impl Config {
    /// Parse a JSON config. Missing sections and fields take their defaults.
    pub fn read<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub settings: Config,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9007)),
            settings: Config::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_settings(mut self, settings: Config) -> Self {
        self.settings = settings;
        self
    }
}

use std::fmt::Write as _;
use std::io::Write as _;
use std::net::IpAddr;
use std::process::Stdio;
use std::sync::{PoisonError, RwLock};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::AnsibleSettings;
use crate::configuration::{
    Configuration, HostConfig, HostGroup, WorkflowRun, DISCOVERY_GROUP_NAME,
};
use crate::error::{ClustermError, Result};

const OUTPUT_BUFFER_BYTES: usize = 64 * 1024;

/// Runs the lifecycle workflows as `ansible-playbook` invocations.
///
/// Each run gets its own inventory file listing the target hosts under their
/// group. Output from stdout and stderr is merged line by line into the run's
/// output stream. Cancelling a run kills the playbook process.
#[derive(Debug, Default)]
pub struct AnsibleConfiguration {
    settings: RwLock<AnsibleSettings>,
}

impl AnsibleConfiguration {
    pub fn new(settings: AnsibleSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    pub fn settings(&self) -> AnsibleSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn launch(&self, playbooks: Vec<String>, inventory: String, extra_vars: &str) -> WorkflowRun {
        let (reader, writer) = tokio::io::duplex(OUTPUT_BUFFER_BYTES);
        let cancel = CancellationToken::new();
        let (result_tx, result_rx) = oneshot::channel();

        let settings = self.settings();
        let extra_vars = extra_vars.to_string();
        let token = cancel.clone();
        tokio::spawn(async move {
            let result = run_playbooks(&settings, &playbooks, &inventory, &extra_vars, writer, token).await;
            if let Err(e) = &result {
                tracing::warn!(playbooks = ?playbooks, error = %e, "Ansible run did not succeed");
            }
            let _ = result_tx.send(result);
        });

        WorkflowRun {
            output: Box::pin(reader),
            cancel,
            result: result_rx,
        }
    }
}

impl Configuration for AnsibleConfiguration {
    fn commission(&self, hosts: &[HostConfig], extra_vars: &str) -> WorkflowRun {
        let playbooks = vec![self.settings().commission_playbook];
        self.launch(playbooks, host_inventory(hosts), extra_vars)
    }

    fn cleanup(&self, hosts: &[HostConfig], extra_vars: &str) -> WorkflowRun {
        let playbooks = vec![self.settings().cleanup_playbook];
        self.launch(playbooks, host_inventory(hosts), extra_vars)
    }

    fn update(&self, hosts: &[HostConfig], extra_vars: &str) -> WorkflowRun {
        let settings = self.settings();
        let playbooks = vec![settings.cleanup_playbook, settings.commission_playbook];
        self.launch(playbooks, host_inventory(hosts), extra_vars)
    }

    fn discover(&self, addrs: &[IpAddr], extra_vars: &str) -> WorkflowRun {
        let playbooks = vec![self.settings().discover_playbook];
        self.launch(playbooks, discovery_inventory(addrs), extra_vars)
    }

    fn reconfigure(&self, settings: &AnsibleSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings.clone();
        tracing::info!(
            playbook_location = %settings.playbook_location.display(),
            user = %settings.user,
            "Ansible settings updated"
        );
    }
}

/// Render an INI inventory with hosts listed under their group.
pub fn host_inventory(hosts: &[HostConfig]) -> String {
    let mut out = String::new();
    for group in [HostGroup::Master, HostGroup::Worker] {
        let members: Vec<&HostConfig> = hosts.iter().filter(|h| h.group == group).collect();
        if members.is_empty() {
            continue;
        }
        let _ = writeln!(out, "[{}]", group);
        for host in members {
            let _ = writeln!(out, "{} ansible_host={}", host.name, host.addr);
        }
    }
    out
}

pub fn discovery_inventory(addrs: &[IpAddr]) -> String {
    let mut out = format!("[{}]\n", DISCOVERY_GROUP_NAME);
    for addr in addrs {
        let _ = writeln!(out, "{addr} ansible_host={addr}");
    }
    out
}

async fn run_playbooks(
    settings: &AnsibleSettings,
    playbooks: &[String],
    inventory: &str,
    extra_vars: &str,
    mut writer: DuplexStream,
    cancel: CancellationToken,
) -> Result<()> {
    let mut inventory_file = tempfile::NamedTempFile::new()?;
    inventory_file.write_all(inventory.as_bytes())?;
    inventory_file.flush()?;

    for playbook in playbooks {
        let path = settings.playbook_location.join(playbook);
        let mut cmd = Command::new("ansible-playbook");
        cmd.arg("-i")
            .arg(inventory_file.path())
            .arg("--user")
            .arg(&settings.user);
        if let Some(key) = &settings.private_key {
            cmd.arg("--private-key").arg(key);
        }
        cmd.arg("--extra-vars")
            .arg(extra_vars)
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!(playbook = %path.display(), "Running playbook");
        let mut child = cmd.spawn()?;
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(ClustermError::Workflow(
                "playbook output pipes unavailable".to_string(),
            ));
        };

        let finished = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            (status, ()) = async {
                tokio::join!(child.wait(), pump_output(stdout, stderr, &mut writer))
            } => Some(status),
        };

        match finished {
            None => {
                tracing::info!(playbook = %path.display(), "Cancelling playbook run");
                let _ = child.start_kill();
                let _ = child.wait().await;
                let _ = writer.write_all(b"playbook run cancelled\n").await;
                return Err(ClustermError::JobCancelled);
            }
            Some(status) => {
                let status = status?;
                if !status.success() {
                    return Err(ClustermError::Workflow(format!(
                        "playbook {} exited with {}",
                        playbook, status
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Copy both pipes into the output stream. Keeps draining the pipes after the
/// reader is gone so the playbook never blocks on a full pipe.
async fn pump_output(stdout: ChildStdout, stderr: ChildStderr, writer: &mut DuplexStream) {
    let mut lines = LinesStream::new(BufReader::new(stdout).lines())
        .merge(LinesStream::new(BufReader::new(stderr).lines()));
    let mut reader_gone = false;

    while let Some(line) = lines.next().await {
        match line {
            Ok(line) if !reader_gone => {
                let framed = format!("{line}\n");
                if writer.write_all(framed.as_bytes()).await.is_err() {
                    reader_gone = true;
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read playbook output");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_inventory_groups_hosts() {
        let hosts = vec![
            HostConfig::new("w1", "10.0.0.2", HostGroup::Worker),
            HostConfig::new("m1", "10.0.0.1", HostGroup::Master),
            HostConfig::new("w2", "10.0.0.3", HostGroup::Worker),
        ];
        let inventory = host_inventory(&hosts);
        assert_eq!(
            inventory,
            "[service-master]\n\
             m1 ansible_host=10.0.0.1\n\
             [service-worker]\n\
             w1 ansible_host=10.0.0.2\n\
             w2 ansible_host=10.0.0.3\n"
        );
    }

    #[test]
    fn host_inventory_skips_empty_groups() {
        let hosts = vec![HostConfig::new("w1", "10.0.0.2", HostGroup::Worker)];
        assert!(!host_inventory(&hosts).contains("service-master"));
    }

    #[test]
    fn discovery_inventory_lists_addresses() {
        let addrs: Vec<IpAddr> = vec!["10.0.0.5".parse().unwrap(), "::1".parse().unwrap()];
        assert_eq!(
            discovery_inventory(&addrs),
            "[cluster-node]\n10.0.0.5 ansible_host=10.0.0.5\n::1 ansible_host=::1\n"
        );
    }

    #[test]
    fn reconfigure_replaces_settings() {
        let cfg = AnsibleConfiguration::new(AnsibleSettings::default());
        let mut settings = AnsibleSettings::default();
        settings.user = "ops".to_string();
        cfg.reconfigure(&settings);
        assert_eq!(cfg.settings().user, "ops");
    }
}

//! `virsh` command-line backend
//!
//! Drives the local hypervisor through `virsh -c <uri> ...`. Each call is a
//! separate process, so concurrent queries need no extra locking.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use vs_core::traits::Hypervisor;
use vs_core::{DomainState, HypervisorError};

/// Hypervisor backend that shells out to `virsh`
pub struct VirshHypervisor {
    program: String,
    uri: String,
}

impl VirshHypervisor {
    /// Create a backend for the given `virsh` executable and connection URI
    pub fn new(program: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            uri: uri.into(),
        }
    }

    /// Run a `virsh` subcommand and return its stdout
    ///
    /// `domain` names the domain the command targets, so a lookup failure
    /// can be reported as `DomainNotFound`.
    async fn run(&self, args: &[&str], domain: Option<&str>) -> Result<String, HypervisorError> {
        tracing::trace!(uri = %self.uri, ?args, "Running virsh");

        let output = Command::new(&self.program)
            .arg("-c")
            .arg(&self.uri)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| HypervisorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match domain {
            Some(name) if is_missing_domain(&stderr) => {
                Err(HypervisorError::DomainNotFound(name.to_string()))
            }
            _ => Err(HypervisorError::Command {
                operation: format!("virsh {}", args.join(" ")),
                message: if stderr.is_empty() {
                    format!("exited with {}", output.status)
                } else {
                    stderr
                },
            }),
        }
    }
}

fn is_missing_domain(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("failed to get domain") || stderr.contains("domain not found")
}

fn non_empty_lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(str::trim).filter(|line| !line.is_empty())
}

#[async_trait]
impl Hypervisor for VirshHypervisor {
    async fn list_defined_domains(&self) -> Result<Vec<String>, HypervisorError> {
        let output = self.run(&["list", "--inactive", "--name"], None).await?;
        Ok(non_empty_lines(&output).map(String::from).collect())
    }

    async fn list_running_domains(&self) -> Result<Vec<u32>, HypervisorError> {
        let output = self.run(&["list", "--id"], None).await?;
        non_empty_lines(&output)
            .map(|line| {
                line.parse::<u32>().map_err(|_| HypervisorError::Command {
                    operation: "virsh list --id".to_string(),
                    message: format!("unexpected domain ID {:?}", line),
                })
            })
            .collect()
    }

    async fn domain_name(&self, id: u32) -> Result<String, HypervisorError> {
        let id = id.to_string();
        let output = self.run(&["domname", id.as_str()], Some(id.as_str())).await?;
        Ok(output.trim().to_string())
    }

    async fn domain_state(&self, name: &str) -> Result<DomainState, HypervisorError> {
        let output = self.run(&["domstate", name], Some(name)).await?;
        output.parse()
    }

    async fn start_domain(&self, name: &str) -> Result<(), HypervisorError> {
        self.run(&["start", name], Some(name)).await?;
        Ok(())
    }

    async fn domain_xml(&self, name: &str) -> Result<String, HypervisorError> {
        self.run(&["dumpxml", name], Some(name)).await
    }

    fn uri(&self) -> &str {
        &self.uri
    }
}

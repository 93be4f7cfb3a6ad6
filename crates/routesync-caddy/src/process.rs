// # Process Control
//
// Two collaborators that shell out:
//
// - `DockerRuntime` lists and restarts containers through the `docker` CLI.
// - `CaddyReloader` runs `caddy validate` followed by `caddy reload` (or a
//   container restart), either inside the container or on the host.
//
// Validation and reload are reported with different error variants so the
// saga can tell "the new config is wrong" from "the daemon did not pick it
// up". Neither collaborator retries.

use async_trait::async_trait;
use routesync_core::traits::{
    ContainerHandle, ContainerRuntime, ProxyReloader, ReloadMethod, ReloadTarget,
};
use routesync_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Executables used for process control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Binaries {
    /// Docker CLI
    pub docker: String,
    /// Caddy CLI (used directly for [`ReloadMethod::Host`])
    pub caddy: String,
}

impl Default for Binaries {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
            caddy: "caddy".to_string(),
        }
    }
}

/// A command line to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Run to completion and return stdout
    ///
    /// Spawn failures are I/O errors; a non-zero exit is mapped through
    /// `on_failure` with the trimmed stderr (or stdout when stderr is empty).
    async fn run(&self, on_failure: fn(String) -> Error) -> Result<String> {
        debug!("running {} {}", self.program, self.args.join(" "));
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        warn!("{} exited with {}: {}", self.program, output.status, detail);
        Err(on_failure(format!("{} ({})", detail, output.status)))
    }
}

/// [`ContainerRuntime`] over the docker CLI
#[derive(Debug, Clone, Default)]
pub struct DockerRuntime {
    binaries: Binaries,
}

impl DockerRuntime {
    pub fn new(binaries: Binaries) -> Self {
        Self { binaries }
    }

    fn ps(&self, image: Option<&str>) -> Invocation {
        let mut args = vec!["ps".to_string(), "--format".to_string(), PS_FORMAT.to_string()];
        if let Some(image) = image {
            args.push("--filter".to_string());
            args.push(format!("ancestor={}", image));
        }
        Invocation::new(&self.binaries.docker, args)
    }
}

const PS_FORMAT: &str = "{{.ID}}\t{{.Names}}\t{{.Image}}";

/// Parse `docker ps` output in [`PS_FORMAT`]
fn parse_ps(output: &str) -> Vec<ContainerHandle> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let id = fields.next()?.trim();
            let name = fields.next()?.trim();
            let image = fields.next()?.trim();
            if id.is_empty() {
                return None;
            }
            Some(ContainerHandle {
                id: id.to_string(),
                name: name.to_string(),
                image: image.to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn restart(&self, handle: &ContainerHandle) -> Result<()> {
        Invocation::new(&self.binaries.docker, ["restart", container_ref(handle)])
            .run(Error::reload)
            .await?;
        Ok(())
    }

    async fn list_running(&self, image: Option<&str>) -> Result<Vec<ContainerHandle>> {
        let stdout = self.ps(image).run(Error::reload).await?;
        Ok(parse_ps(&stdout))
    }
}

fn container_ref(handle: &ContainerHandle) -> &str {
    if handle.id.is_empty() {
        &handle.name
    } else {
        &handle.id
    }
}

/// [`ProxyReloader`] running the caddy CLI
#[derive(Debug, Clone, Default)]
pub struct CaddyReloader {
    binaries: Binaries,
}

impl CaddyReloader {
    pub fn new(binaries: Binaries) -> Self {
        Self { binaries }
    }

    /// `caddy <verb> --config <path> --adapter caddyfile`, in the container or on the host
    fn caddy(&self, verb: &str, target: &ReloadTarget) -> Result<Invocation> {
        let caddy_args = |path: &Path| {
            vec![
                verb.to_string(),
                "--config".to_string(),
                path.display().to_string(),
                "--adapter".to_string(),
                "caddyfile".to_string(),
            ]
        };

        match target.method {
            ReloadMethod::Host => Ok(Invocation::new(
                &self.binaries.caddy,
                caddy_args(&target.config_host_path),
            )),
            ReloadMethod::Exec | ReloadMethod::Restart => {
                let container = target.container.as_ref().ok_or_else(|| {
                    Error::reload(format!("reload method {:?} needs a container", target.method))
                })?;
                let mut args = vec!["exec".to_string(), container_ref(container).to_string()];
                args.push(self.binaries.caddy.clone());
                args.extend(caddy_args(&target.config_container_path));
                Ok(Invocation::new(&self.binaries.docker, args))
            }
        }
    }

    /// Commands run for `target`, in order: validation first, then the reload
    pub fn plan(&self, target: &ReloadTarget) -> Result<(Invocation, Invocation)> {
        let validate = self.caddy("validate", target)?;
        let reload = match (target.method, &target.container) {
            (ReloadMethod::Restart, Some(container)) => Invocation::new(
                &self.binaries.docker,
                ["restart", container_ref(container)],
            ),
            _ => self.caddy("reload", target)?,
        };
        Ok((validate, reload))
    }
}

#[async_trait]
impl ProxyReloader for CaddyReloader {
    async fn validate_and_reload(&self, target: &ReloadTarget) -> Result<()> {
        let (validate, reload) = self.plan(target)?;
        validate.run(Error::validation).await?;
        reload.run(Error::reload).await?;
        debug!(
            "caddy reloaded {} via {:?}",
            target.config_host_path.display(),
            target.method
        );
        Ok(())
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, InspectContainerOptions,
    ListContainersOptions, LogOutput, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::service::HostConfig;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    IsolationBackend, ResourceLimits, RunOutput, SandboxError, SandboxId, MANAGED_LABEL,
    PROGRAM_FILE, STDIN_FILE, WORKSPACE_MOUNT,
};
use crate::config::SandboxConfig;

/// Seconds bollard waits on a single API request.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Runs submissions in throwaway Docker containers.
pub struct DockerBackend {
    /// `None` once the daemon was found unreachable.
    docker: Option<Docker>,
    image: String,
    command: Vec<String>,
}

impl DockerBackend {
    /// Connect to the Docker daemon.
    ///
    /// An unreachable daemon is not an error: the backend comes up
    /// disabled and every provision call fails fast. Only an invalid
    /// interpreter command is rejected.
    pub async fn connect(config: &SandboxConfig) -> Result<Self> {
        let command = parse_command(&config.command)?;

        let docker = match open_client(config.docker_host.as_deref()) {
            Ok(docker) => docker,
            Err(e) => {
                warn!("Docker client initialization failed: {e}. Code execution is disabled.");
                return Ok(Self::disabled(&config.image, command));
            }
        };

        if let Err(e) = docker.ping().await {
            warn!("Cannot ping Docker daemon: {e}. Code execution is disabled.");
            return Ok(Self::disabled(&config.image, command));
        }
        info!("Docker client initialized");

        if config.pull_missing_image {
            if let Err(e) = ensure_image(&docker, &config.image).await {
                warn!("Could not make image {} available: {e:#}", config.image);
            }
        }

        Ok(Self {
            docker: Some(docker),
            image: config.image.clone(),
            command,
        })
    }

    fn disabled(image: &str, command: Vec<String>) -> Self {
        Self {
            docker: None,
            image: image.to_string(),
            command,
        }
    }

    fn client(&self) -> Result<&Docker, SandboxError> {
        self.docker
            .as_ref()
            .ok_or_else(|| SandboxError::unavailable("Docker daemon is not reachable"))
    }

    /// Command run inside the container.
    ///
    /// `sh` redirects the input file to stdin and then execs the
    /// interpreter, so no user-controlled text is ever shell-parsed.
    fn container_command(&self) -> Vec<String> {
        let mut cmd = vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("exec \"$@\" < {WORKSPACE_MOUNT}/{STDIN_FILE}"),
            "coderun".to_string(),
        ];
        cmd.extend(self.command.iter().cloned());
        cmd.push(format!("{WORKSPACE_MOUNT}/{PROGRAM_FILE}"));
        cmd
    }

    fn build_container_config(
        &self,
        limits: &ResourceLimits,
        workspace: &Path,
    ) -> Result<ContainerConfig<String>, SandboxError> {
        let host_path = workspace
            .to_str()
            .ok_or_else(|| SandboxError::container_failed("Workspace path is not valid UTF-8"))?;

        let binds = vec![format!(
            "{host_path}:{WORKSPACE_MOUNT}:{}",
            limits.mount.as_bind_suffix()
        )];

        let tmpfs = HashMap::from([(
            "/tmp".to_string(),
            "rw,noexec,nosuid,size=16m".to_string(),
        )]);
        let labels = HashMap::from([(MANAGED_LABEL.to_string(), "true".to_string())]);

        Ok(ContainerConfig {
            image: Some(self.image.clone()),
            cmd: Some(self.container_command()),
            working_dir: Some(WORKSPACE_MOUNT.to_string()),
            labels: Some(labels),
            network_disabled: Some(limits.network.is_disabled()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(HostConfig {
                binds: Some(binds),
                memory: Some(limits.memory_bytes),
                memory_swap: Some(limits.memory_bytes),
                cpu_quota: Some(limits.cpu_quota),
                cpu_period: Some(limits.cpu_period),
                pids_limit: Some(limits.pids_limit),
                network_mode: Some(limits.network.as_docker().to_string()),
                readonly_rootfs: Some(true),
                tmpfs: Some(tmpfs),
                cap_drop: Some(vec!["ALL".to_string()]),
                security_opt: Some(vec!["no-new-privileges".to_string()]),
                auto_remove: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    async fn wait_exit(&self, docker: &Docker, id: &SandboxId) -> Result<i64, SandboxError> {
        let mut stream = docker.wait_container(
            id.as_str(),
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        );

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports non-zero exits as errors
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(SandboxError::runtime_fault(format!(
                "Failed to wait for container: {e}"
            ))),
            None => Err(SandboxError::runtime_fault(
                "Container wait stream ended without a status",
            )),
        }
    }

    async fn collect_logs(&self, docker: &Docker, id: &SandboxId) -> Result<String, SandboxError> {
        let mut stream = docker.logs(
            id.as_str(),
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                follow: false,
                tail: "all".to_string(),
                ..Default::default()
            }),
        );

        let mut output = Vec::new();
        while let Some(chunk) = stream.next().await {
            let frame = chunk.map_err(|e| {
                SandboxError::runtime_fault(format!("Failed to read container logs: {e}"))
            })?;
            output.extend_from_slice(frame_bytes(&frame));
        }
        Ok(decode_output(output))
    }

    async fn was_oom_killed(&self, docker: &Docker, id: &SandboxId) -> bool {
        docker
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .ok()
            .and_then(|info| info.state)
            .and_then(|state| state.oom_killed)
            .unwrap_or(false)
    }
}

#[async_trait]
impl IsolationBackend for DockerBackend {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn is_available(&self) -> bool {
        self.docker.is_some()
    }

    async fn provision(
        &self,
        limits: &ResourceLimits,
        workspace: &Path,
    ) -> Result<SandboxId, SandboxError> {
        let docker = self.client()?;
        let config = self.build_container_config(limits, workspace)?;
        let name = format!("coderun-{}", uuid::Uuid::new_v4().simple());

        debug!("Creating container: {}", name);
        let response = docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| match e {
                DockerError::DockerResponseServerError {
                    status_code: 404, ..
                } => SandboxError::image_not_found(&self.image),
                other => SandboxError::container_failed(format!(
                    "Failed to create container: {other}"
                )),
            })?;

        for warning in &response.warnings {
            warn!(container = %name, "Docker: {warning}");
        }

        Ok(SandboxId::new(response.id))
    }

    async fn run(&self, id: &SandboxId, timeout: Duration) -> Result<RunOutput, SandboxError> {
        let docker = self.client()?;

        debug!(sandbox = %id.short(), "Starting container");
        docker
            .start_container(id.as_str(), None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SandboxError::container_failed(format!("Failed to start container: {e}")))?;

        let exit_code = tokio::time::timeout(timeout, self.wait_exit(docker, id))
            .await
            .map_err(|_| SandboxError::timeout(timeout))??;

        let output = self.collect_logs(docker, id).await?;
        let oom_killed = exit_code != 0 && self.was_oom_killed(docker, id).await;

        debug!(sandbox = %id.short(), exit_code, "Container exited");
        Ok(RunOutput {
            exit_code,
            output,
            oom_killed,
        })
    }

    async fn fetch_output(&self, id: &SandboxId) -> Result<String, SandboxError> {
        let docker = self.client()?;
        self.collect_logs(docker, id).await
    }

    async fn destroy(&self, id: &SandboxId) -> Result<(), SandboxError> {
        // Nothing can have been created while disabled
        let Some(docker) = self.docker.as_ref() else {
            return Ok(());
        };

        let result = docker
            .remove_container(
                id.as_str(),
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await;

        match result {
            Ok(()) => {
                debug!(sandbox = %id.short(), "Removed container");
                Ok(())
            }
            // 404: already gone. 409: removal already in progress.
            Err(DockerError::DockerResponseServerError {
                status_code: 404 | 409,
                ..
            }) => Ok(()),
            Err(e) => Err(SandboxError::destroy_failed(id.as_str(), e.to_string())),
        }
    }

    async fn list_managed(&self) -> Result<Vec<SandboxId>, SandboxError> {
        let docker = self.client()?;

        let filters = HashMap::from([(
            "label".to_string(),
            vec![format!("{MANAGED_LABEL}=true")],
        )]);
        let containers = docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| SandboxError::container_failed(format!("Failed to list containers: {e}")))?;

        Ok(containers
            .into_iter()
            .filter_map(|c| c.id)
            .map(SandboxId::new)
            .collect())
    }
}

fn open_client(docker_host: Option<&str>) -> Result<Docker> {
    match docker_host {
        Some(host) => Docker::connect_with_socket(host, REQUEST_TIMEOUT_SECS, API_DEFAULT_VERSION)
            .with_context(|| format!("Failed to connect to Docker at {host}")),
        None => Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker. Is Docker running?"),
    }
}

/// Pull `image` unless it already exists locally.
async fn ensure_image(docker: &Docker, image: &str) -> Result<()> {
    if docker.inspect_image(image).await.is_ok() {
        return Ok(());
    }

    info!("Pulling image: {}", image);
    let mut stream = docker.create_image(
        Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        }),
        None,
        None,
    );

    while let Some(progress) = stream.next().await {
        progress.context("Failed to pull Docker image")?;
    }

    info!("Image ready: {}", image);
    Ok(())
}

/// Split the configured interpreter command into argv.
fn parse_command(command: &str) -> Result<Vec<String>> {
    let parts = shell_words::split(command)
        .with_context(|| format!("Failed to parse sandbox command: {command}"))?;
    if parts.is_empty() {
        anyhow::bail!("Sandbox command cannot be empty");
    }
    Ok(parts)
}

/// Program output carried by a log frame. Frames may split a multi-byte
/// character, so they are concatenated before decoding.
fn frame_bytes(frame: &LogOutput) -> &[u8] {
    match frame {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::Console { message } => &message[..],
        LogOutput::StdIn { .. } => &[],
    }
}

fn decode_output(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

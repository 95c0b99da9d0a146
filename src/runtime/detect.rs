use crate::config::RuntimePreference;
use serde::Serialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

impl ContainerRuntime {
    pub fn binary(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Podman => "podman",
        }
    }
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.binary())
    }
}

/// Pick the runtime CLI to drive, honouring an explicit preference.
///
/// Returns None when the preferred (or, under `auto`, any) runtime does not
/// answer `--version`.
pub async fn detect_runtime(prefer: RuntimePreference) -> Option<ContainerRuntime> {
    let candidates: &[ContainerRuntime] = match prefer {
        RuntimePreference::Auto => &[ContainerRuntime::Docker, ContainerRuntime::Podman],
        RuntimePreference::Docker => &[ContainerRuntime::Docker],
        RuntimePreference::Podman => &[ContainerRuntime::Podman],
    };

    for runtime in candidates {
        if probe(*runtime).await {
            info!(runtime = %runtime, "Container runtime detected");
            return Some(*runtime);
        }
        debug!(runtime = %runtime, "Container runtime not available");
    }

    warn!(prefer = ?prefer, "No container runtime found");
    None
}

async fn probe(runtime: ContainerRuntime) -> bool {
    Command::new(runtime.binary())
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ContainerRuntime::Podman).unwrap(),
            "\"podman\""
        );
        assert_eq!(ContainerRuntime::Docker.to_string(), "docker");
    }
}

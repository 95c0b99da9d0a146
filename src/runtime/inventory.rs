use super::detect::ContainerRuntime;
use super::tail::{spawn_tail_process, LogSource, TailHandle, TailRequest};
use super::{validate_container_id, RuntimeError};
use crate::session::dispatch::filter_chunk;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub state: String,
}

/// Query string of the historical log endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub until: Option<String>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub tail: Option<u32>,
}

/// Request/response access to the container runtime, used by the HTTP API.
#[async_trait]
pub trait ContainerInventory: Send + Sync {
    fn runtime(&self) -> Option<ContainerRuntime>;

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError>;

    async fn fetch_logs(
        &self,
        container_id: &str,
        query: &HistoryQuery,
    ) -> Result<String, RuntimeError>;
}

/// Drives the `docker` or `podman` CLI detected at startup.
#[derive(Debug, Clone)]
pub struct CliRuntime {
    runtime: Option<ContainerRuntime>,
}

impl CliRuntime {
    pub fn new(runtime: Option<ContainerRuntime>) -> Self {
        Self { runtime }
    }

    fn require_runtime(&self) -> Result<ContainerRuntime, RuntimeError> {
        self.runtime.ok_or(RuntimeError::Unavailable)
    }

    async fn run(&self, runtime: ContainerRuntime, args: &[String]) -> Result<(String, String), RuntimeError> {
        debug!(runtime = %runtime, args = ?args, "Running runtime command");

        let output = Command::new(runtime.binary())
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                binary: runtime.binary(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: format!("{} {}", runtime.binary(), args.join(" ")),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok((stdout, stderr))
    }
}

#[async_trait]
impl ContainerInventory for CliRuntime {
    fn runtime(&self) -> Option<ContainerRuntime> {
        self.runtime
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let runtime = self.require_runtime()?;
        let (stdout, _) = self.run(runtime, &list_args(runtime)).await?;
        match runtime {
            ContainerRuntime::Docker => parse_docker_ps(&stdout),
            ContainerRuntime::Podman => parse_podman_ps(&stdout),
        }
    }

    async fn fetch_logs(
        &self,
        container_id: &str,
        query: &HistoryQuery,
    ) -> Result<String, RuntimeError> {
        let runtime = self.require_runtime()?;
        validate_container_id(container_id)?;

        let (stdout, stderr) = self.run(runtime, &history_args(container_id, query)).await?;

        let mut text = stdout;
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        Ok(filter_chunk(&text, query.filter.as_deref()).unwrap_or_default())
    }
}

impl LogSource for CliRuntime {
    fn spawn_tail(&self, request: &TailRequest) -> Result<TailHandle, RuntimeError> {
        spawn_tail_process(self.require_runtime()?, request)
    }
}

fn list_args(runtime: ContainerRuntime) -> Vec<String> {
    let format = match runtime {
        ContainerRuntime::Docker => "{{json .}}",
        ContainerRuntime::Podman => "json",
    };
    vec![
        "ps".to_string(),
        "-a".to_string(),
        "--format".to_string(),
        format.to_string(),
    ]
}

pub fn history_args(container_id: &str, query: &HistoryQuery) -> Vec<String> {
    let mut args = vec!["logs".to_string()];
    if let Some(since) = query.since.as_deref().filter(|s| !s.is_empty()) {
        args.push("--since".to_string());
        args.push(since.to_string());
    }
    if let Some(until) = query.until.as_deref().filter(|s| !s.is_empty()) {
        args.push("--until".to_string());
        args.push(until.to_string());
    }
    if let Some(tail) = query.tail {
        args.push("--tail".to_string());
        args.push(tail.to_string());
    }
    args.push(container_id.to_string());
    args
}

#[derive(Debug, Deserialize)]
struct DockerPsRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names", default)]
    names: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "State", default)]
    state: String,
}

/// `docker ps --format '{{json .}}'` prints one object per line.
pub fn parse_docker_ps(stdout: &str) -> Result<Vec<ContainerSummary>, RuntimeError> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let row: DockerPsRow = serde_json::from_str(line).map_err(|e| RuntimeError::Parse {
                binary: "docker",
                message: e.to_string(),
            })?;
            Ok(ContainerSummary {
                id: row.id,
                name: row.names,
                image: row.image,
                status: row.status,
                state: row.state,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct PodmanPsRow {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names", default)]
    names: Vec<String>,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "State", default)]
    state: String,
}

/// `podman ps --format json` prints a single JSON array.
pub fn parse_podman_ps(stdout: &str) -> Result<Vec<ContainerSummary>, RuntimeError> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }

    let rows: Vec<PodmanPsRow> = serde_json::from_str(stdout).map_err(|e| RuntimeError::Parse {
        binary: "podman",
        message: e.to_string(),
    })?;

    Ok(rows
        .into_iter()
        .map(|row| ContainerSummary {
            id: row.id,
            name: row.names.join(","),
            image: row.image,
            status: row.status,
            state: row.state,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_docker_ps_lines() {
        let stdout = concat!(
            r#"{"Command":"\"nginx\"","ID":"a1b2c3","Image":"nginx:latest","Names":"web","State":"running","Status":"Up 2 hours"}"#,
            "\n",
            r#"{"ID":"d4e5f6","Image":"redis:7","Names":"cache","State":"exited","Status":"Exited (0) 1 day ago"}"#,
            "\n"
        );
        let containers = parse_docker_ps(stdout).unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(
            containers[0],
            ContainerSummary {
                id: "a1b2c3".to_string(),
                name: "web".to_string(),
                image: "nginx:latest".to_string(),
                status: "Up 2 hours".to_string(),
                state: "running".to_string(),
            }
        );
        assert_eq!(containers[1].state, "exited");
    }

    #[test]
    fn test_parse_docker_ps_rejects_garbage() {
        assert!(matches!(
            parse_docker_ps("not json\n"),
            Err(RuntimeError::Parse { binary: "docker", .. })
        ));
    }

    #[test]
    fn test_parse_podman_ps_array() {
        let stdout = r#"[{"Id":"abc123","Names":["api"],"Image":"localhost/api:dev","State":"running","Status":"Up 5 minutes"}]"#;
        let containers = parse_podman_ps(stdout).unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].id, "abc123");
        assert_eq!(containers[0].name, "api");
        assert_eq!(containers[0].image, "localhost/api:dev");
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_docker_ps("").unwrap().is_empty());
        assert!(parse_podman_ps("  \n").unwrap().is_empty());
    }

    #[test]
    fn test_history_args_skip_empty_values() {
        let query = HistoryQuery {
            since: Some("10m".to_string()),
            until: Some(String::new()),
            filter: Some("error".to_string()),
            tail: Some(200),
        };
        assert_eq!(
            history_args("web", &query),
            vec!["logs", "--since", "10m", "--tail", "200", "web"]
        );
    }

    #[tokio::test]
    async fn test_missing_runtime_is_reported() {
        let runtime = CliRuntime::new(None);
        assert!(matches!(
            runtime.list_containers().await,
            Err(RuntimeError::Unavailable)
        ));
        assert!(matches!(
            runtime.spawn_tail(&TailRequest {
                container_id: "web".to_string(),
                since: None,
                tail: 10,
            }),
            Err(RuntimeError::Unavailable)
        ));
    }
}

pub mod detect;
pub mod inventory;
pub mod tail;

use thiserror::Error;

pub use detect::{detect_runtime, ContainerRuntime};
pub use inventory::{CliRuntime, ContainerInventory, ContainerSummary, HistoryQuery};
pub use tail::{LogSource, OutputStream, TailEvent, TailHandle, TailRequest};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("no container runtime available (tried docker, podman)")]
    Unavailable,

    #[error("invalid container id '{0}'")]
    InvalidContainerId(String),

    #[error("failed to start {binary}: {source}")]
    Spawn {
        binary: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("failed to parse {binary} output: {message}")]
    Parse {
        binary: &'static str,
        message: String,
    },
}

/// Container ids and names are passed straight to the runtime CLI, so only
/// the characters either runtime accepts are allowed and the first one must
/// be alphanumeric (never a `-` that could be read as a flag).
pub fn validate_container_id(id: &str) -> Result<(), RuntimeError> {
    let mut chars = id.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_alphanumeric()
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        }
        None => false,
    };

    if valid && id.len() <= 256 {
        Ok(())
    } else {
        Err(RuntimeError::InvalidContainerId(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_container_ids() {
        assert!(validate_container_id("a1b2c3d4e5f6").is_ok());
        assert!(validate_container_id("my_app.web-1").is_ok());
    }

    #[test]
    fn test_invalid_container_ids() {
        assert!(validate_container_id("").is_err());
        assert!(validate_container_id("--privileged").is_err());
        assert!(validate_container_id("web; rm -rf /").is_err());
        assert!(validate_container_id("web/../etc").is_err());
        assert!(validate_container_id(&"a".repeat(300)).is_err());
    }
}

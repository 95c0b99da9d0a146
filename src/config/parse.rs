use super::types::*;
use crate::config::{expand_env_vars, unexpanded_env_vars};
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML in '{path}': {source}")]
    YamlParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid environment variable pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let config = parse_config_str(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse { source, .. } => ConfigError::YamlParse {
            path: path.display().to_string(),
            source,
        },
        other => other,
    })?;

    Ok(config)
}

/// Parse and validate a config document held in memory.
pub fn parse_config_str(yaml: &str) -> Result<Config, ConfigError> {
    let yaml = expand_env_vars(yaml)?;
    check_unexpanded_vars(&yaml)?;

    // An empty document is a valid "all defaults" config
    let config: Config = if yaml.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&yaml).map_err(|source| ConfigError::YamlParse {
            path: "<memory>".to_string(),
            source,
        })?
    };

    validate_config(&config)?;
    Ok(config)
}

fn check_unexpanded_vars(yaml: &str) -> Result<(), ConfigError> {
    let names = unexpanded_env_vars(yaml)?;
    match names.len() {
        0 => Ok(()),
        1 => Err(ConfigError::Validation(format!(
            "Environment variable $env{{{0}}} is not set.\n\
             Set it (export {0}=...) or replace the reference in the config file",
            names[0]
        ))),
        _ => Err(ConfigError::Validation(format!(
            "Environment variables are not set: {}",
            names.join(", ")
        ))),
    }
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.server.listen.parse::<SocketAddr>().is_err() {
        errors.push(format!(
            "server.listen '{}' is not a valid socket address",
            config.server.listen
        ));
    }

    if config.client.flush_interval.is_zero() {
        errors.push("client.flush_interval must be greater than zero".to_string());
    }

    if config.client.reconnect_delay.is_zero() {
        errors.push("client.reconnect_delay must be greater than zero".to_string());
    }

    if config.client.max_logs > MAX_LOGS_LIMIT {
        errors.push(format!(
            "client.max_logs must be between 0 and {}, got {}",
            MAX_LOGS_LIMIT, config.client.max_logs
        ));
    }

    if !(config.client.url.starts_with("ws://") || config.client.url.starts_with("wss://")) {
        errors.push(format!(
            "client.url '{}' must start with ws:// or wss://",
            config.client.url
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = parse_config_str("").unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:7300");
        assert_eq!(config.client.flush_interval, Duration::from_millis(500));
        assert_eq!(config.client.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.client.max_logs, 1000);
        assert_eq!(config.stream.default_tail, 100);
        assert_eq!(config.runtime.prefer, RuntimePreference::Auto);
    }

    #[test]
    fn test_partial_document() {
        let yaml = r#"
runtime:
  prefer: podman
client:
  flush_interval: 250ms
  max_logs: 0
"#;
        let config = parse_config_str(yaml).unwrap();
        assert_eq!(config.runtime.prefer, RuntimePreference::Podman);
        assert_eq!(config.client.flush_interval, Duration::from_millis(250));
        assert_eq!(config.client.max_logs, 0);
        assert_eq!(config.client.reconnect_delay, Duration::from_secs(3));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let yaml = r#"
server:
  listen: "not an address"
client:
  url: "http://localhost"
  max_logs: 5000
  flush_interval: 0s
"#;
        match parse_config_str(yaml) {
            Err(ConfigError::ValidationList(errors)) => {
                assert_eq!(errors.len(), 4);
                assert!(errors.iter().any(|e| e.contains("server.listen")));
                assert!(errors.iter().any(|e| e.contains("client.url")));
                assert!(errors.iter().any(|e| e.contains("client.max_logs")));
                assert!(errors.iter().any(|e| e.contains("client.flush_interval")));
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_runtime_rejected() {
        let result = parse_config_str("runtime:\n  prefer: containerd\n");
        assert!(matches!(result, Err(ConfigError::YamlParse { .. })));
    }

    #[test]
    fn test_unexpanded_env_var_rejected() {
        let result = parse_config_str("server:\n  listen: $env{CONTAIL_SURELY_UNSET}\n");
        match result {
            Err(ConfigError::Validation(msg)) => assert!(msg.contains("CONTAIL_SURELY_UNSET")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}

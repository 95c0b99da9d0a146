pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# CONTAIL CONFIGURATION
# =============================================================================
# Every section is optional; omitted values fall back to the defaults shown.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/contail/config.yml
#   3. /etc/contail/config.yml
#
# Values may reference environment variables with $env{NAME}.

# HTTP + WebSocket server
server:
  listen: "127.0.0.1:7300"

# Container runtime CLI used for listing, history and live tails.
# 'auto' probes docker first, then podman.
runtime:
  prefer: auto

# Live tail defaults
stream:
  # Lines of history replayed when a start request does not set `tail`
  default_tail: 100

# Settings for `contail watch`
client:
  url: "ws://127.0.0.1:7300/ws"
  # Incoming log messages are coalesced and rendered once per interval
  flush_interval: 500ms
  # Fixed delay between reconnect attempts
  reconnect_delay: 3s
  # Retained log lines; 0 keeps everything
  max_logs: 1000
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse::parse_config_str;

    #[test]
    fn test_starter_config_parses() {
        let config = parse_config_str(&generate_starter_config()).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:7300");
        assert_eq!(config.client.max_logs, 1000);
    }
}

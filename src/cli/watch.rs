use super::run::RunError;
use crate::client::{
    BatchBuffer, ConnectionState, LogEntry, LogStream, StreamClient, Subject, Viewer,
};
use crate::config::{load_or_default, ClientConfig};
use crate::protocol::StreamMessage;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct WatchArgs {
    pub container: String,
    pub filter: Option<String>,
    pub tail: Option<u32>,
    pub max_logs: Option<String>,
    pub url: Option<String>,
}

pub async fn watch(config_path: Option<PathBuf>, args: WatchArgs) -> Result<(), RunError> {
    let config = load_or_default(config_path.as_deref())?;
    run_watch(&config.client, args).await
}

/// Follow one container through the server until Ctrl+C, printing every
/// accepted entry to stdout.
pub async fn run_watch(client_config: &ClientConfig, args: WatchArgs) -> Result<(), RunError> {
    let mut logs = LogStream::new(client_config.max_logs);
    if let Some(raw) = &args.max_logs {
        logs.handle_max_logs_change(raw)?;
    }

    let url = args.url.unwrap_or_else(|| client_config.url.clone());
    info!(url = %url, container_id = %args.container, "Watching container");

    let (buffer, mut batches) = BatchBuffer::new(client_config.flush_interval);
    let client = StreamClient::connect(url, client_config.reconnect_delay, buffer.clone());
    let mut state = client.subscribe_state();
    let mut control = client.subscribe_control();

    let mut viewer = Viewer::new(client, buffer, logs);
    viewer.set_tail(args.tail);
    let subject = Subject::new(args.container, args.filter);

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,

            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                match current {
                    ConnectionState::Open => {
                        // The transport never queues, so every (re)connect
                        // has to ask for the stream again
                        let result = if viewer.subject().is_some() {
                            viewer.resubscribe()
                        } else {
                            viewer.switch_subject(subject.clone())
                        };
                        if let Err(e) = result {
                            warn!(error = %e, "Failed to request log stream");
                        }
                    }
                    ConnectionState::Closed => eprintln!("[disconnected]"),
                    ConnectionState::Connecting => {}
                }
            }

            changed = control.changed() => {
                if changed.is_err() {
                    break;
                }
                let message = control.borrow_and_update().clone();
                if let Some(message) = message {
                    eprintln!("{}", describe_control(&message));
                    viewer.handle_control(&message);
                }
            }

            Some(snapshot) = batches.recv() => {
                for entry in viewer.apply_batch(&snapshot) {
                    println!("{}", format_entry(&entry));
                }
            }
        }
    }

    viewer.into_sink().close().await;
    Ok(())
}

pub fn format_entry(entry: &LogEntry) -> String {
    format!("{} {}", entry.timestamp.to_rfc3339(), entry.text)
}

pub fn describe_control(message: &StreamMessage) -> String {
    match message {
        StreamMessage::Started { container_id } => format!("[started] {}", container_id),
        StreamMessage::End { message } => format!("[end] {}", message),
        StreamMessage::Error { message } => format!("[error] {}", message),
        StreamMessage::Stopped => "[stopped]".to_string(),
        StreamMessage::Log(log) => format!("[log] {}", log.container_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MaxLogsError;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_format_entry() {
        let entry = LogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            text: "GET /health 200".to_string(),
        };
        assert_eq!(format_entry(&entry), "2024-05-01T12:30:00+00:00 GET /health 200");
    }

    #[test]
    fn test_describe_control() {
        assert_eq!(
            describe_control(&StreamMessage::Started {
                container_id: "web".into()
            }),
            "[started] web"
        );
        assert_eq!(
            describe_control(&StreamMessage::End {
                message: "Log stream ended".into()
            }),
            "[end] Log stream ended"
        );
        assert_eq!(describe_control(&StreamMessage::error("boom")), "[error] boom");
        assert_eq!(describe_control(&StreamMessage::Stopped), "[stopped]");
    }

    #[tokio::test]
    async fn test_invalid_max_logs_fails_before_connecting() {
        let args = WatchArgs {
            container: "web".into(),
            filter: None,
            tail: None,
            max_logs: Some("lots".into()),
            url: None,
        };
        let err = run_watch(&ClientConfig::default(), args).await.unwrap_err();
        assert!(matches!(err, RunError::MaxLogs(MaxLogsError::InvalidNumber)));
    }
}

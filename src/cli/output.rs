//! Output formatting for CLI commands

use serde::Serialize;

use crate::delivery::EngineStatus;

/// Format output as pretty JSON or a short human-readable line
pub fn format_output<T: Serialize>(data: &T, json: bool) -> String {
    if json {
        serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
    } else {
        serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string())
    }
}

/// 引擎状态的单行摘要
pub fn format_status(status: &EngineStatus) -> String {
    format!(
        "{} | delivered {} | queued {} | dropped {} | skipped {} | backoff {}ms",
        status.state.as_str(),
        status.delivered,
        status.queued,
        status.dropped,
        status.skipped,
        status.backoff_ms
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::ConnectionState;

    #[test]
    fn test_format_status() {
        let status = EngineStatus {
            state: ConnectionState::Connected,
            queued: 2,
            pending: 0,
            backoff_ms: 1000,
            delivered: 5,
            dropped: 1,
            skipped: 3,
            last_connected_at: None,
            shut_down: false,
        };
        assert_eq!(
            format_status(&status),
            "connected | delivered 5 | queued 2 | dropped 1 | skipped 3 | backoff 1000ms"
        );
        assert!(format_output(&status, true).contains("\"state\": \"connected\""));
    }
}

//! Access log format module
//!
//! Supports:
//! - `combined` (Apache/Nginx combined format)
//! - `common` (Common Log Format - CLF)
//! - `json` (one JSON object per line)
//!
//! Unknown format names fall back to `combined`.

use chrono::{DateTime, Local};
use serde::Serialize;

/// Access log entry describing one handled request
#[derive(Debug, Clone, Serialize)]
pub struct AccessLogEntry {
    /// Client address
    pub remote_addr: String,
    /// Request timestamp
    #[serde(serialize_with = "serialize_rfc3339")]
    pub time: DateTime<Local>,
    pub method: String,
    pub path: String,
    /// HTTP version (1.0, 1.1, 2)
    pub http_version: String,
    pub status: u16,
    /// Response body size in bytes
    pub body_bytes: usize,
    pub user_agent: Option<String>,
    /// Assembly outcome, when the request reached the assembler
    pub compiled: Option<bool>,
    /// Request processing time in microseconds
    pub request_time_us: u64,
}

impl AccessLogEntry {
    /// Create a new access log entry with current timestamp
    pub fn new(remote_addr: String, method: String, path: String) -> Self {
        Self {
            remote_addr,
            time: Local::now(),
            method,
            path,
            http_version: "1.1".to_string(),
            status: 200,
            body_bytes: 0,
            user_agent: None,
            compiled: None,
            request_time_us: 0,
        }
    }

    /// Format the log entry according to the specified format
    pub fn format(&self, format: &str) -> String {
        match format {
            "common" => self.format_common(),
            "json" => self.format_json(),
            _ => self.format_combined(),
        }
    }

    /// `$remote_addr - - [$time_local] "$request" $status $body_bytes_sent "-" "$http_user_agent" $request_time`
    fn format_combined(&self) -> String {
        format!(
            "{} \"-\" \"{}\" {}us",
            self.format_common(),
            self.user_agent.as_deref().unwrap_or("-"),
            self.request_time_us,
        )
    }

    /// `$remote_addr - - [$time_local] "$request" $status $body_bytes_sent`
    fn format_common(&self) -> String {
        format!(
            "{} - - [{}] \"{} {} HTTP/{}\" {} {}",
            self.remote_addr,
            self.time.format("%d/%b/%Y:%H:%M:%S %z"),
            self.method,
            self.path,
            self.http_version,
            self.status,
            self.body_bytes,
        )
    }

    fn format_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"error":"unserializable access log entry: {e}"}}"#)
        })
    }
}

fn serialize_rfc3339<S>(time: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&time.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> AccessLogEntry {
        let mut entry = AccessLogEntry::new(
            "10.0.0.7:51234".to_string(),
            "POST".to_string(),
            "/assembly/validate/".to_string(),
        );
        entry.time = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        entry.body_bytes = 48;
        entry.user_agent = Some("curl/8.5".to_string());
        entry.compiled = Some(false);
        entry.request_time_us = 1520;
        entry
    }

    #[test]
    fn test_common_format() {
        let line = sample().format("common");
        assert!(line.starts_with("10.0.0.7:51234 - - [09/Mar/2024:14:05:00 "));
        assert!(line.ends_with("\"POST /assembly/validate/ HTTP/1.1\" 200 48"));
    }

    #[test]
    fn test_combined_format() {
        let line = sample().format("combined");
        assert!(line.ends_with("200 48 \"-\" \"curl/8.5\" 1520us"));
    }

    #[test]
    fn test_unknown_format_is_combined() {
        let entry = sample();
        assert_eq!(entry.format("fancy"), entry.format("combined"));
    }

    #[test]
    fn test_json_format() {
        let line = sample().format("json");
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["method"], "POST");
        assert_eq!(value["status"], 200);
        assert_eq!(value["compiled"], false);
        assert_eq!(value["user_agent"], "curl/8.5");
        assert!(value["time"].as_str().unwrap().starts_with("2024-03-09T14:05:00"));
    }
}

//! Access log entry
//!
//! One entry per request, built from the resolved origin rather than the
//! socket peer so proxied clients are logged with their real address.

use chrono::Local;

use crate::trust::ResolvedOrigin;

/// Access log entry containing all request/response information
#[derive(Debug, Clone)]
pub struct AccessLogEntry {
    /// Effective client IP after proxy resolution
    pub remote_addr: String,
    pub time: chrono::DateTime<Local>,
    pub method: String,
    pub path: String,
    /// Query string (without leading ?)
    pub query: Option<String>,
    pub scheme: String,
    pub host: Option<String>,
    pub status: u16,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    /// Request processing time in microseconds
    pub request_time_us: u64,
}

impl AccessLogEntry {
    /// Create a new access log entry with current timestamp
    pub fn new(origin: &ResolvedOrigin, method: &str, path: &str) -> Self {
        Self {
            remote_addr: origin.ip.to_string(),
            time: Local::now(),
            method: method.to_string(),
            path: path.to_string(),
            query: None,
            scheme: origin.scheme.to_string(),
            host: origin.hostname.clone(),
            status: 200,
            referer: None,
            user_agent: None,
            request_time_us: 0,
        }
    }

    /// Apache/Nginx Combined Log Format, body size replaced by `-`
    /// because streamed bodies are not measured here
    pub fn format_combined(&self) -> String {
        format!(
            "{} - - [{}] \"{} {}{}\" {} - \"{}\" \"{}\"",
            self.remote_addr,
            self.time.format("%d/%b/%Y:%H:%M:%S %z"),
            self.method,
            self.path,
            self.query
                .as_ref()
                .map(|q| format!("?{q}"))
                .unwrap_or_default(),
            self.status,
            self.referer.as_deref().unwrap_or("-"),
            self.user_agent.as_deref().unwrap_or("-"),
        )
    }
}

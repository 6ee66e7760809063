// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub files: FilesConfig,
    #[serde(default)]
    pub trust: TrustConfig,
    pub uploads: UploadsConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    /// Set when the accepted sockets are already TLS-terminated
    pub encrypted: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub max_connections: Option<u64>,
}

/// Static file configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FilesConfig {
    pub root_dir: PathBuf,
    /// Pre-compressed variants, tried in this order for each accepted encoding
    #[serde(default = "default_compression")]
    pub compression: Vec<CompressionVariant>,
    /// `Cache-Control` max-age in seconds
    pub max_age: u32,
    pub disposition: DispositionType,
}

/// Suffix of a pre-compressed file and the encoding token it stands for
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CompressionVariant {
    pub suffix: String,
    pub encoding: String,
}

impl CompressionVariant {
    pub fn new(suffix: &str, encoding: &str) -> Self {
        Self {
            suffix: suffix.to_string(),
            encoding: encoding.to_string(),
        }
    }
}

fn default_compression() -> Vec<CompressionVariant> {
    vec![
        CompressionVariant::new(".br", "br"),
        CompressionVariant::new(".gz", "gzip"),
    ]
}

/// `Content-Disposition` type for served files
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispositionType {
    #[default]
    Inline,
    Attachment,
}

/// Proxy trust configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TrustConfig {
    /// Peers allowed to assert forwarded headers (IP, CIDR or `*`)
    #[serde(default)]
    pub trusted_ip: Vec<String>,
    /// Peers never trusted, checked before `trusted_ip`
    #[serde(default)]
    pub untrusted_ip: Vec<String>,
    /// Hostnames the server answers for (exact, `*.suffix` or `*`)
    #[serde(default)]
    pub trusted_hosts: Vec<String>,
}

/// Multipart upload configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UploadsConfig {
    /// Request path accepting multipart uploads
    pub path: String,
    /// Directory for upload temp files, system temp dir when unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Per-file limit; writing stops once a file exceeds it
    pub max_file_size: u64,
    /// Whole-body limit; exceeding it fails the upload
    pub max_body_size: u64,
}

impl UploadsConfig {
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

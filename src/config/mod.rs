// Configuration module entry point
// Manages application configuration and shared runtime state

mod state;
mod types;

use std::net::SocketAddr;

// Re-export public types
pub use state::AppState;
pub use types::{
    CompressionVariant, Config, DispositionType, FilesConfig, LoggingConfig, PerformanceConfig,
    ServerConfig, TrustConfig, UploadsConfig,
};

impl Config {
    /// Load configuration from specified file path (without extension)
    /// Default config file is "config.toml" when no path specified
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("QUAY")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("trust.trusted_ip")
                    .with_list_parse_key("trust.untrusted_ip")
                    .with_list_parse_key("trust.trusted_hosts")
                    .try_parsing(true),
            )
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.encrypted", false)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("files.root_dir", "public")?
            .set_default("files.max_age", 3600)?
            .set_default("files.disposition", "inline")?
            .set_default("uploads.path", "/upload")?
            .set_default("uploads.max_file_size", 10_485_760)? // 10MB
            .set_default("uploads.max_body_size", 52_428_800)? // 50MB
            .build()?;

        settings.try_deserialize()
    }

    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}

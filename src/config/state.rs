// Application state module
// Holds the read-only configuration derived at startup

use std::sync::Arc;

use super::types::Config;
use crate::handler::static_files::StaticFiles;
use crate::multipart::{Limits, MultipartIngestor};
use crate::trust::TrustPolicy;

/// Application state shared by every connection
pub struct AppState {
    pub config: Config,
    pub trust: TrustPolicy,
    pub static_files: StaticFiles,
    pub uploads: MultipartIngestor,
}

impl AppState {
    /// Derive the request-scoped collaborators from configuration
    pub fn new(config: Config) -> Result<Arc<Self>, String> {
        let trust = TrustPolicy::from_config(&config.trust)?;
        let static_files = StaticFiles::from_config(&config.files);
        let uploads = MultipartIngestor::new(
            config.uploads.temp_dir(),
            Limits {
                file_size: Some(config.uploads.max_file_size),
                body_size: Some(config.uploads.max_body_size),
            },
        );

        Ok(Arc::new(Self {
            config,
            trust,
            static_files,
            uploads,
        }))
    }
}

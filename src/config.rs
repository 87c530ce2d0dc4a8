use std::path::PathBuf;

/// Where the registry lives, and optionally where its storage lives on disk.
///
/// `data_path` must point at the registry's `docker/registry/v2` directory
/// and is only needed to delete repositories.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub registry_url: String,
    pub data_path: Option<PathBuf>,
}

impl AdminConfig {
    pub fn new(registry_url: impl Into<String>) -> Self {
        Self {
            registry_url: registry_url.into(),
            data_path: None,
        }
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = Some(path.into());
        self
    }

    pub fn with_optional_data_path(mut self, path: Option<PathBuf>) -> Self {
        self.data_path = path;
        self
    }
}

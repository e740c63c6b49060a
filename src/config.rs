use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Overall bound for the graceful shutdown path.
    pub shutdown_timeout: Duration,
    /// Sub-deadline for in-flight work to finish once draining starts.
    pub drain_timeout: Duration,
    /// Where the compiled provider manifest is cached between runs. `None` keeps it in memory only.
    pub manifest_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            manifest_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn with_manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = Some(path.into());
        self
    }

    pub fn with_timeouts(mut self, shutdown: Duration, drain: Duration) -> Self {
        self.shutdown_timeout = shutdown;
        self.drain_timeout = drain;
        self
    }
}

pub fn default_manifest_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("provider-lifecycle")
        .join("providers.json")
}

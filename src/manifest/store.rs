use std::path::{Path, PathBuf};

use super::ProviderManifest;
use crate::Result;

/// JSON file holding the last compiled manifest.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no manifest has been written yet.
    pub async fn load(&self) -> Result<Option<ProviderManifest>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_slice(&data)?))
    }

    pub async fn save(&self, manifest: &ProviderManifest) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let data = serde_json::to_vec_pretty(manifest)?;
        tokio::fs::write(&self.path, data).await?;
        Ok(())
    }
}

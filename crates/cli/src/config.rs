use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use storager_core::{FsStorage, Pair, S3Storage, Storager};

const CONFIG_FILE: &str = "storager.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageConfig {
    #[serde(rename = "fs")]
    Fs {
        root: String,
        work_dir: Option<String>,
    },
    #[serde(rename = "s3")]
    S3 {
        endpoint: String,
        region: String,
        bucket: String,
        access_key: String,
        secret_key: String,
        work_dir: Option<String>,
    },
}

impl StorageConfig {
    fn work_dir(&self) -> Option<&str> {
        match self {
            StorageConfig::Fs { work_dir, .. } | StorageConfig::S3 { work_dir, .. } => {
                work_dir.as_deref()
            }
        }
    }
}

impl AppConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("storager")
            .join(CONFIG_FILE)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("config not found at {}", path.display()))?;
        toml::from_str(&content).context("failed to parse config")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    pub async fn open_storager(&self) -> Result<Arc<dyn Storager>> {
        let pairs: Vec<Pair> = self
            .storage
            .work_dir()
            .map(|wd| Pair::WorkDir(wd.to_string()))
            .into_iter()
            .collect();

        match &self.storage {
            StorageConfig::Fs { root, .. } => {
                let mut storage = FsStorage::new(root);
                storage.init(&pairs).await?;
                Ok(Arc::new(storage))
            }
            StorageConfig::S3 {
                endpoint,
                region,
                bucket,
                access_key,
                secret_key,
                ..
            } => {
                let mut storage =
                    S3Storage::connect(bucket, endpoint, region, access_key, secret_key)?;
                storage.init(&pairs).await?;
                Ok(Arc::new(storage))
            }
        }
    }
}

use anyhow::Result;
use clap::Args;
use tracing::info;

use crate::commands::Session;
use crate::config::{AppConfig, StorageConfig};

#[derive(Args)]
pub struct InitArgs {
    /// Storage backend: fs or s3
    #[arg(long)]
    backend: String,

    /// Root directory for fs storage
    #[arg(long)]
    root: Option<String>,

    /// S3 endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// S3 bucket name
    #[arg(long)]
    bucket: Option<String>,

    /// S3 region
    #[arg(long, default_value = "us-east-1")]
    region: String,

    /// S3 access key
    #[arg(long)]
    access_key: Option<String>,

    /// S3 secret key
    #[arg(long)]
    secret_key: Option<String>,

    /// Directory every path is resolved against
    #[arg(long)]
    work_dir: Option<String>,
}

pub async fn run(args: InitArgs, session: &Session) -> Result<()> {
    let storage = match args.backend.as_str() {
        "fs" => {
            let root = args
                .root
                .ok_or_else(|| anyhow::anyhow!("--root required for fs storage"))?;
            StorageConfig::Fs {
                root,
                work_dir: args.work_dir,
            }
        }
        "s3" => {
            let endpoint = args
                .endpoint
                .ok_or_else(|| anyhow::anyhow!("--endpoint required for S3 storage"))?;
            let bucket = args
                .bucket
                .ok_or_else(|| anyhow::anyhow!("--bucket required for S3 storage"))?;
            let access_key = args
                .access_key
                .ok_or_else(|| anyhow::anyhow!("--access-key required for S3 storage"))?;
            let secret_key = args
                .secret_key
                .ok_or_else(|| anyhow::anyhow!("--secret-key required for S3 storage"))?;
            StorageConfig::S3 {
                endpoint,
                region: args.region,
                bucket,
                access_key,
                secret_key,
                work_dir: args.work_dir,
            }
        }
        other => anyhow::bail!("unknown backend: {other} (supported: fs, s3)"),
    };

    let config = AppConfig { storage };
    let storager = config.open_storager().await?;
    let meta = storager.metadata(&session.pairs()).await?;
    config.save(&session.config_path)?;

    info!(
        config_path = %session.config_path.display(),
        storage = %storager,
        "Storage configured"
    );
    println!("Storage {} ready (work dir {}).", meta.name, meta.work_dir);
    println!("Config: {}", session.config_path.display());
    Ok(())
}

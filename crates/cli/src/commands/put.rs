use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use storager_core::{Pair, StorageClass};

use crate::commands::Session;

#[derive(Args)]
pub struct PutArgs {
    /// Local file to upload
    source: PathBuf,

    /// Destination path
    target: String,

    /// Content type to store with the object
    #[arg(long)]
    content_type: Option<String>,

    /// Storage class: hot, warm, cold or archive
    #[arg(long)]
    storage_class: Option<StorageClass>,
}

pub async fn run(args: PutArgs, session: &Session) -> Result<()> {
    let storager = session.open().await?;

    let file = tokio::fs::File::open(&args.source)
        .await
        .with_context(|| format!("failed to open {}", args.source.display()))?;
    let size = file.metadata().await?.len();

    let mut pairs = session.pairs();
    pairs.push(Pair::Size(size));
    pairs.extend(args.content_type.map(Pair::ContentType));
    pairs.extend(args.storage_class.map(Pair::StorageClass));

    storager.write(&args.target, Box::new(file), &pairs).await?;

    info!(target = %args.target, size, "uploaded");
    println!("Uploaded {} ({size} bytes)", args.target);
    Ok(())
}

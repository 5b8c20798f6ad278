use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::ProgressBar;
use tokio::io::AsyncSeekExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use storager_core::{Pair, Storager};

use crate::commands::Session;
use crate::progress;

#[derive(Args)]
pub struct UploadArgs {
    /// Local file to upload
    source: PathBuf,

    /// Destination path
    target: String,

    /// Part size in MiB
    #[arg(long, default_value_t = 16)]
    part_size: u64,

    /// Parts uploaded at the same time
    #[arg(long, default_value_t = 4)]
    jobs: usize,

    /// Content type to store with the object
    #[arg(long)]
    content_type: Option<String>,
}

/// Part boundaries `(offset, size)` covering `total` bytes.
fn plan_parts(total: u64, part_size: u64) -> Vec<(u64, u64)> {
    let mut parts = Vec::new();
    let mut offset = 0;
    while offset < total {
        let size = part_size.min(total - offset);
        parts.push((offset, size));
        offset += size;
    }
    parts
}

pub async fn run(args: UploadArgs, session: &Session) -> Result<()> {
    if args.part_size == 0 {
        anyhow::bail!("--part-size must be at least 1 MiB");
    }
    let part_size = args.part_size * 1024 * 1024;
    let total = tokio::fs::metadata(&args.source)
        .await
        .with_context(|| format!("failed to stat {}", args.source.display()))?
        .len();
    if total == 0 {
        anyhow::bail!("{} is empty", args.source.display());
    }

    let storager = session.open().await?;

    let mut pairs = session.pairs();
    pairs.push(Pair::PartSize(part_size));
    pairs.extend(args.content_type.map(Pair::ContentType));
    let id = storager.init_segment(&args.target, &pairs).await?;

    let parts = plan_parts(total, part_size);
    info!(segment = %id, target = %args.target, parts = parts.len(), "upload started");

    let pb = progress::create_bytes_progress(total, &args.target);
    let uploaded = upload_parts(
        storager.clone(),
        &id,
        &args.source,
        parts,
        args.jobs.max(1),
        &pb,
        session.pairs(),
    )
    .await;

    if let Err(err) = uploaded {
        pb.abandon_with_message("failed");
        if let Err(abort_err) = storager.abort_segment(&id, &session.pairs()).await {
            warn!(segment = %id, error = %abort_err, "failed to abort upload");
        }
        return Err(err);
    }

    storager.complete_segment(&id, &session.pairs()).await?;
    pb.finish_with_message("done");
    println!("Uploaded {} ({total} bytes)", args.target);
    Ok(())
}

async fn upload_parts(
    storager: Arc<dyn Storager>,
    id: &str,
    source: &Path,
    parts: Vec<(u64, u64)>,
    jobs: usize,
    pb: &ProgressBar,
    pairs: Vec<Pair>,
) -> Result<()> {
    let permits = Arc::new(Semaphore::new(jobs));
    let pairs = Arc::new(pairs);
    let mut tasks = JoinSet::new();

    for (offset, size) in parts {
        let permit = permits.clone().acquire_owned().await?;
        let storager = storager.clone();
        let id = id.to_string();
        let source = source.to_path_buf();
        let pairs = pairs.clone();
        let pb = pb.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let mut file = tokio::fs::File::open(&source).await?;
            file.seek(SeekFrom::Start(offset)).await?;
            storager
                .write_segment(&id, offset, size, Box::new(file), &pairs)
                .await?;
            pb.inc(size);
            Ok::<_, anyhow::Error>(())
        });

        while let Some(done) = tasks.try_join_next() {
            done??;
        }
    }

    while let Some(done) = tasks.join_next().await {
        done??;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_cover_file_with_short_tail() {
        assert_eq!(plan_parts(10, 4), vec![(0, 4), (4, 4), (8, 2)]);
        assert_eq!(plan_parts(8, 4), vec![(0, 4), (4, 4)]);
        assert_eq!(plan_parts(3, 4), vec![(0, 3)]);
        assert!(plan_parts(0, 4).is_empty());
    }
}

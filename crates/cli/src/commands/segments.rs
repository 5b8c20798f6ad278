use anyhow::Result;
use clap::Args;
use futures::TryStreamExt;

use storager_core::Pair;

use crate::commands::Session;

#[derive(Args)]
pub struct SegmentsArgs {
    /// Only uploads whose target starts with this path
    #[arg(default_value = "")]
    prefix: String,

    /// Resume a previous listing from this marker
    #[arg(long)]
    marker: Option<String>,
}

pub async fn run(args: SegmentsArgs, session: &Session) -> Result<()> {
    let storager = session.open().await?;

    let mut pairs = session.pairs();
    pairs.extend(args.marker.map(Pair::Marker));

    let mut segments = storager.list_segments(&args.prefix, &pairs).await?;
    let mut count = 0usize;
    while let Some(segment) = segments.try_next().await? {
        println!("{}\t{}", segment.id, segment.path);
        count += 1;
    }
    if count == 0 {
        println!("No uploads in progress.");
    }
    Ok(())
}

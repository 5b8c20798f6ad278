use anyhow::Result;
use clap::Args;
use tokio::io::AsyncWriteExt;

use storager_core::Pair;

use crate::commands::Session;

#[derive(Args)]
pub struct CatArgs {
    path: String,

    /// First byte to read
    #[arg(long)]
    offset: Option<u64>,

    /// Number of bytes to read
    #[arg(long)]
    size: Option<u64>,
}

pub async fn run(args: CatArgs, session: &Session) -> Result<()> {
    let storager = session.open().await?;

    let mut pairs = session.pairs();
    pairs.extend(args.offset.map(Pair::Offset));
    pairs.extend(args.size.map(Pair::Size));

    let mut reader = storager.read(&args.path, &pairs).await?;
    let mut stdout = tokio::io::stdout();
    tokio::io::copy(&mut reader, &mut stdout).await?;
    stdout.flush().await?;
    Ok(())
}

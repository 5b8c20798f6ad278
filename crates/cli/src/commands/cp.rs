use anyhow::Result;
use clap::Args;

use crate::commands::Session;

#[derive(Args)]
pub struct CopyArgs {
    src: String,
    dst: String,
}

pub async fn run_copy(args: CopyArgs, session: &Session) -> Result<()> {
    let storager = session.open().await?;
    storager
        .copy(&args.src, &args.dst, &session.pairs())
        .await?;
    println!("Copied {} -> {}", args.src, args.dst);
    Ok(())
}

pub async fn run_move(args: CopyArgs, session: &Session) -> Result<()> {
    let storager = session.open().await?;
    storager
        .rename(&args.src, &args.dst, &session.pairs())
        .await?;
    println!("Moved {} -> {}", args.src, args.dst);
    Ok(())
}

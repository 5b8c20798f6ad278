use anyhow::Result;
use clap::Args;

use crate::commands::Session;

#[derive(Args)]
pub struct RmArgs {
    /// Paths to delete
    #[arg(required = true)]
    paths: Vec<String>,
}

pub async fn run(args: RmArgs, session: &Session) -> Result<()> {
    let storager = session.open().await?;
    let pairs = session.pairs();
    for path in &args.paths {
        storager.delete(path, &pairs).await?;
        println!("Deleted {path}");
    }
    Ok(())
}

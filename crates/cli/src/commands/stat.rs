use anyhow::Result;
use clap::Args;

use crate::commands::Session;

#[derive(Args)]
pub struct StatArgs {
    path: String,

    /// Print the object as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: StatArgs, session: &Session) -> Result<()> {
    let storager = session.open().await?;
    let object = storager.stat(&args.path, &session.pairs()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&object)?);
        return Ok(());
    }

    println!("Name:    {}", object.name);
    println!("Id:      {}", object.id);
    println!("Type:    {}", object.kind);
    println!("Size:    {}", object.size);
    if let Some(updated_at) = object.updated_at {
        println!("Updated: {}", updated_at.to_rfc3339());
    }
    if let Some(content_type) = object.meta.content_type() {
        println!("Content: {content_type}");
    }
    if let Some(etag) = object.meta.etag() {
        println!("ETag:    {etag}");
    }
    if let Some(class) = object.meta.storage_class() {
        println!("Class:   {class}");
    }
    Ok(())
}

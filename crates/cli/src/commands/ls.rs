use anyhow::Result;
use clap::Args;
use futures::TryStreamExt;

use storager_core::{Object, Pair};

use crate::commands::Session;

#[derive(Args)]
pub struct LsArgs {
    /// Path to list, relative to the work dir
    #[arg(default_value = "")]
    path: String,

    /// List every object below the path instead of one level
    #[arg(short, long)]
    recursive: bool,

    /// Resume a previous listing from this marker
    #[arg(long)]
    marker: Option<String>,

    /// One JSON document per line
    #[arg(long)]
    json: bool,
}

pub async fn run(args: LsArgs, session: &Session) -> Result<()> {
    let storager = session.open().await?;

    let mut pairs = session.pairs();
    pairs.push(Pair::Recursive(args.recursive));
    if let Some(marker) = args.marker {
        pairs.push(Pair::Marker(marker));
    }

    let mut objects = storager.list(&args.path, &pairs).await?;
    let mut count = 0usize;
    while let Some(object) = objects.try_next().await? {
        if args.json {
            println!("{}", serde_json::to_string(&object)?);
        } else {
            println!("{}", format_line(&object));
        }
        count += 1;
    }
    tracing::debug!(count, path = %args.path, "listing done");
    Ok(())
}

fn format_line(object: &Object) -> String {
    let updated = object
        .updated_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".repeat(16));
    let class = object
        .meta
        .storage_class()
        .map(|c| c.to_string())
        .unwrap_or_default();
    format!(
        "{:<4} {:>12} {} {:<7} {}",
        object.kind.to_string(),
        object.size,
        updated,
        class,
        object.name
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use storager_core::{ObjectMeta, ObjectType, StorageClass};

    use super::*;

    #[test]
    fn line_shows_kind_size_time_and_class() {
        let object = Object::new("data/a.txt", "a.txt", ObjectType::File)
            .with_size(42)
            .with_updated_at(Some(chrono::Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap()))
            .with_meta(ObjectMeta::new().set_storage_class(StorageClass::Warm));
        assert_eq!(
            format_line(&object),
            "file           42 2026-03-04 05:06 warm    a.txt"
        );

        let dir = Object::new("data/sub/", "sub/", ObjectType::Dir);
        assert_eq!(
            format_line(&dir),
            "dir             0 ----------------         sub/"
        );
    }
}

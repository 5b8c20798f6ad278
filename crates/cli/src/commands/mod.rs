pub mod cat;
pub mod cp;
pub mod init;
pub mod ls;
pub mod put;
pub mod rm;
pub mod segments;
pub mod stat;
pub mod upload;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Subcommand;

use storager_core::{Pair, Storager};

use crate::config::AppConfig;

#[derive(Subcommand)]
pub enum Command {
    /// Write a config file for a storage backend
    Init(init::InitArgs),
    /// List objects under a path
    Ls(ls::LsArgs),
    /// Show one object's metadata
    Stat(stat::StatArgs),
    /// Print an object (or a byte range of it) to stdout
    Cat(cat::CatArgs),
    /// Upload a local file in a single request
    Put(put::PutArgs),
    /// Delete an object
    Rm(rm::RmArgs),
    /// Copy an object inside the backend
    Cp(cp::CopyArgs),
    /// Move an object inside the backend
    Mv(cp::CopyArgs),
    /// Upload a local file as a multipart segment
    Upload(upload::UploadArgs),
    /// List multipart uploads still in progress on the backend
    Segments(segments::SegmentsArgs),
}

/// Settings shared by every command.
pub struct Session {
    pub config_path: PathBuf,
    pub timeout: Option<Duration>,
}

impl Session {
    pub async fn open(&self) -> Result<Arc<dyn Storager>> {
        AppConfig::load(&self.config_path)?.open_storager().await
    }

    /// Pairs every request carries.
    pub fn pairs(&self) -> Vec<Pair> {
        self.timeout.map(Pair::Timeout).into_iter().collect()
    }
}

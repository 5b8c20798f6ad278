pub mod fs;
pub mod s3;

pub use fs::FsStorage;
pub use s3::S3Storage;

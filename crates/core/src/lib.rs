pub mod error;
pub mod object;
pub mod options;
pub mod pager;
pub mod path;
pub mod segment;
pub mod services;
pub mod storage_class;
pub mod storager;

pub use error::{Error, Result};
pub use object::{MetaKey, MetaValue, Object, ObjectMeta, ObjectType, StorageMeta};
pub use options::Pair;
pub use segment::{Part, Segment, SegmentManager};
pub use services::{FsStorage, S3Storage};
pub use storage_class::{StorageClass, StorageClassTable};
pub use storager::{ObjectStream, Reader, SegmentStream, Storager, reader};

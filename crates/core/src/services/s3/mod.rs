mod bucket;


use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;
use tracing::debug;

pub use bucket::{
    BucketApi, CompletedPart, ListObjectsInput, ListObjectsOutput, ListUploadsOutput, ObjectInfo,
    PutOptions, UploadInfo,
};

use crate::error::{Error, Result};
use crate::object::{Object, ObjectMeta, ObjectType, StorageMeta};
use crate::options::{
    Deadline, InitOptions, InitSegmentOptions, ListOptions, ListSegmentsOptions, OpOptions, Pair,
    ReadOptions, WriteOptions,
};
use crate::pager::{Page, PageSource, paginate};
use crate::path::WorkDir;
use crate::segment::{Segment, SegmentManager};
use crate::storage_class::{StorageClass, StorageClassTable};
use crate::storager::{ObjectStream, Reader, SegmentStream, Storager, read_sized, reader};

pub const STORAGE_CLASSES: StorageClassTable = StorageClassTable::new(&[
    ("STANDARD", StorageClass::Hot),
    ("STANDARD_IA", StorageClass::Warm),
    ("GLACIER", StorageClass::Cold),
    ("DEEP_ARCHIVE", StorageClass::Archive),
]);

/// Keys requested per listing page.
pub const LIST_LIMIT: usize = 200;
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;
/// Largest object a single PUT accepts.
pub const MAX_WRITE_SIZE: u64 = 5 * 1024 * 1024 * 1024;
pub const MAX_PART_NUMBER: u64 = 10_000;

const DIR_CONTENT_TYPE: &str = "application/x-directory";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// S3-compatible bucket storager with multipart segments.
pub struct S3Storage<B: BucketApi = Bucket> {
    bucket: Arc<B>,
    work_dir: WorkDir,
    location: Option<String>,
    segments: SegmentManager,
}

impl S3Storage<Bucket> {
    pub fn connect(
        bucket_name: &str,
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };
        let location = region.to_string();
        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(Error::unhandled)?;
        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(Error::unhandled)?
            .with_path_style();
        Ok(Self::with_bucket(*bucket, Some(location)))
    }
}

impl<B: BucketApi> S3Storage<B> {
    pub fn with_bucket(bucket: B, location: Option<String>) -> Self {
        Self {
            bucket: Arc::new(bucket),
            work_dir: WorkDir::default(),
            location,
            segments: SegmentManager::new(),
        }
    }

    fn abs(&self, path: &str) -> String {
        self.work_dir.abs(path)
    }
}

impl<B: BucketApi> fmt::Display for S3Storage<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "s3 {{name: {}, work_dir: {}}}",
            self.bucket.name(),
            self.work_dir
        )
    }
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_rfc2822(s))
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Canonical name for `key`. Directories never keep the trailing slash.
fn dir_name(work_dir: &WorkDir, key: &str, kind: ObjectType) -> String {
    let name = work_dir.rel(key);
    match kind {
        ObjectType::Dir => name.trim_end_matches('/').to_string(),
        _ => name.to_string(),
    }
}

fn to_object(work_dir: &WorkDir, info: ObjectInfo) -> Result<Object> {
    let kind = if info.content_type.as_deref() == Some(DIR_CONTENT_TYPE) || info.key.ends_with('/')
    {
        ObjectType::Dir
    } else {
        ObjectType::File
    };

    let mut meta = ObjectMeta::new();
    if let Some(content_type) = info.content_type {
        meta = meta.set_content_type(content_type);
    }
    if let Some(etag) = info.etag {
        meta = meta.set_etag(etag.trim_matches('"'));
    }
    if let Some(class) = info.storage_class.as_deref() {
        meta = meta.set_storage_class(STORAGE_CLASSES.normalize(class)?);
    }

    let name = dir_name(work_dir, &info.key, kind);
    Ok(Object::new(info.key, name, kind)
        .with_size(info.size)
        .with_updated_at(info.last_modified.as_deref().and_then(parse_time))
        .with_meta(meta))
}

enum ListEntry {
    Prefix(String),
    Object(ObjectInfo),
}

struct ObjectPages<B> {
    bucket: Arc<B>,
    work_dir: WorkDir,
    prefix: String,
    delimiter: Option<String>,
    deadline: Deadline,
}

#[async_trait]
impl<B: BucketApi> PageSource for ObjectPages<B> {
    type Raw = ListEntry;
    type Item = Object;

    async fn fetch(&mut self, marker: Option<String>) -> Result<Page<ListEntry>> {
        let input = ListObjectsInput {
            prefix: self.prefix.clone(),
            delimiter: self.delimiter.clone(),
            marker,
            limit: LIST_LIMIT,
        };
        let output = self.deadline.run(self.bucket.list_objects(input)).await?;

        let prefixes = output.common_prefixes.into_iter().map(ListEntry::Prefix);
        let objects = output
            .objects
            .into_iter()
            .filter(|o| o.key != self.prefix)
            .map(ListEntry::Object);
        Ok(Page::new(prefixes.chain(objects).collect(), output.next_marker))
    }

    fn normalize(&self, raw: ListEntry) -> Result<Object> {
        match raw {
            ListEntry::Prefix(key) => {
                let name = dir_name(&self.work_dir, &key, ObjectType::Dir);
                Ok(Object::new(key, name, ObjectType::Dir))
            }
            ListEntry::Object(info) => to_object(&self.work_dir, info),
        }
    }
}

struct UploadPages<B> {
    bucket: Arc<B>,
    work_dir: WorkDir,
    prefix: String,
    deadline: Deadline,
}

#[async_trait]
impl<B: BucketApi> PageSource for UploadPages<B> {
    type Raw = UploadInfo;
    type Item = Segment;

    async fn fetch(&mut self, marker: Option<String>) -> Result<Page<UploadInfo>> {
        let output = self
            .deadline
            .run(
                self.bucket
                    .list_multipart_uploads(&self.prefix, marker, LIST_LIMIT),
            )
            .await?;
        Ok(Page::new(output.uploads, output.next_marker))
    }

    fn normalize(&self, raw: UploadInfo) -> Result<Segment> {
        Ok(Segment::new(self.work_dir.rel(&raw.key), raw.upload_id, 0))
    }
}

#[async_trait]
impl<B: BucketApi> Storager for S3Storage<B> {
    async fn init(&mut self, pairs: &[Pair]) -> Result<()> {
        let opt = InitOptions::parse(pairs).map_err(|e| e.context(&*self, "init", ""))?;
        if let Some(work_dir) = opt.work_dir {
            self.work_dir = WorkDir::new(&work_dir);
        }
        debug!(bucket = %self.bucket.name(), work_dir = %self.work_dir, "s3 storager ready");
        Ok(())
    }

    async fn metadata(&self, _pairs: &[Pair]) -> Result<StorageMeta> {
        let meta = StorageMeta::new(self.bucket.name(), self.work_dir.to_string());
        Ok(match &self.location {
            Some(location) => meta.set_location(location),
            None => meta,
        })
    }

    async fn list(&self, path: &str, pairs: &[Pair]) -> Result<ObjectStream> {
        let opt = ListOptions::parse(pairs).map_err(|e| e.context(self, "list", path))?;
        let source = ObjectPages {
            bucket: self.bucket.clone(),
            work_dir: self.work_dir.clone(),
            prefix: self.abs(path),
            delimiter: (!opt.recursive).then(|| "/".to_string()),
            deadline: opt.deadline,
        };
        let service = self.to_string();
        let target = path.to_string();
        Ok(paginate(source, opt.marker)
            .map_err(move |e| e.context(&service, "list", target.clone()))
            .boxed())
    }

    async fn read(&self, path: &str, pairs: &[Pair]) -> Result<Reader> {
        let key = self.abs(path);
        let read = async {
            let opt = ReadOptions::parse(pairs)?;
            let data = opt
                .deadline
                .run(self.bucket.get_object(&key, opt.range()))
                .await?;
            Ok::<_, Error>(reader(data))
        };
        read.await.map_err(|e| e.context(self, "read", path))
    }

    async fn write(&self, path: &str, reader: Reader, pairs: &[Pair]) -> Result<()> {
        let key = self.abs(path);
        let write = async {
            let opt = WriteOptions::parse(pairs)?;
            if opt.size > MAX_WRITE_SIZE {
                return Err(Error::validation(
                    "size",
                    format!("{} exceeds the single write limit of {MAX_WRITE_SIZE}", opt.size),
                ));
            }
            let storage_class = opt
                .storage_class
                .map(|class| STORAGE_CLASSES.denormalize(class))
                .transpose()?;
            let put = PutOptions {
                content_type: opt.content_type,
                content_md5: opt.content_md5,
                storage_class,
            };
            opt.deadline
                .run(async {
                    let data = read_sized(reader, opt.size).await?;
                    self.bucket.put_object(&key, data, &put).await
                })
                .await
        };
        write.await.map_err(|e| e.context(self, "write", path))
    }

    async fn stat(&self, path: &str, pairs: &[Pair]) -> Result<Object> {
        let key = self.abs(path);
        let stat = async {
            let opt = OpOptions::parse(pairs)?;
            let info = opt.deadline.run(self.bucket.head_object(&key)).await?;
            to_object(&self.work_dir, info)
        };
        stat.await.map_err(|e| e.context(self, "stat", path))
    }

    async fn delete(&self, path: &str, pairs: &[Pair]) -> Result<()> {
        let key = self.abs(path);
        let delete = async {
            let opt = OpOptions::parse(pairs)?;
            match opt.deadline.run(self.bucket.delete_object(&key)).await {
                Err(e) if !e.is_not_exist() => Err(e),
                _ => Ok(()),
            }
        };
        delete.await.map_err(|e| e.context(self, "delete", path))
    }

    async fn copy(&self, src: &str, dst: &str, pairs: &[Pair]) -> Result<()> {
        let (from, to) = (self.abs(src), self.abs(dst));
        let copy = async {
            let opt = OpOptions::parse(pairs)?;
            opt.deadline.run(self.bucket.copy_object(&from, &to)).await
        };
        copy.await.map_err(|e| e.context(self, "copy", src))
    }

    async fn init_segment(&self, path: &str, pairs: &[Pair]) -> Result<String> {
        let key = self.abs(path);
        let init = async {
            let opt = InitSegmentOptions::parse(pairs)?;
            if opt.part_size > MAX_PART_SIZE {
                return Err(Error::validation(
                    "part_size",
                    format!("{} exceeds the {MAX_PART_SIZE} byte limit", opt.part_size),
                ));
            }
            let content_type = opt.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
            let initiate = opt
                .deadline
                .run(self.bucket.create_multipart_upload(&key, content_type));
            self.segments.init(path, opt.part_size, initiate).await
        };
        init.await.map_err(|e| e.context(self, "init_segment", path))
    }

    async fn write_segment(
        &self,
        id: &str,
        offset: u64,
        size: u64,
        reader: Reader,
        pairs: &[Pair],
    ) -> Result<()> {
        let write = async {
            let opt = OpOptions::parse(pairs)?;
            self.segments
                .write(id, offset, size, |target| async move {
                    let part_number = target.index + 1;
                    if part_number > MAX_PART_NUMBER {
                        return Err(Error::validation(
                            "offset",
                            format!("part number {part_number} exceeds {MAX_PART_NUMBER}"),
                        ));
                    }
                    let part_number = u32::try_from(part_number).map_err(Error::unhandled)?;
                    let key = self.abs(&target.path);
                    let etag = opt
                        .deadline
                        .run(async {
                            let data = read_sized(reader, target.size).await?;
                            self.bucket
                                .upload_part(&key, &target.segment_id, part_number, data)
                                .await
                        })
                        .await?;
                    Ok(Some(etag))
                })
                .await
        };
        write.await.map_err(|e| e.context(self, "write_segment", id))
    }

    async fn complete_segment(&self, id: &str, pairs: &[Pair]) -> Result<()> {
        let complete = async {
            let opt = OpOptions::parse(pairs)?;
            self.segments
                .complete(id, |segment| async move {
                    let parts = segment
                        .sorted_parts()
                        .into_iter()
                        .map(|part| CompletedPart {
                            part_number: (part.offset / segment.part_size + 1) as u32,
                            etag: part.etag.unwrap_or_default(),
                        })
                        .collect();
                    let key = self.abs(&segment.path);
                    opt.deadline
                        .run(
                            self.bucket
                                .complete_multipart_upload(&key, &segment.id, parts),
                        )
                        .await
                })
                .await
        };
        complete
            .await
            .map_err(|e| e.context(self, "complete_segment", id))
    }

    async fn abort_segment(&self, id: &str, pairs: &[Pair]) -> Result<()> {
        let abort = async {
            let opt = OpOptions::parse(pairs)?;
            self.segments
                .abort(id, |segment| async move {
                    let key = self.abs(&segment.path);
                    opt.deadline
                        .run(self.bucket.abort_multipart_upload(&key, &segment.id))
                        .await
                })
                .await
        };
        abort.await.map_err(|e| e.context(self, "abort_segment", id))
    }

    async fn list_segments(&self, path: &str, pairs: &[Pair]) -> Result<SegmentStream> {
        let opt =
            ListSegmentsOptions::parse(pairs).map_err(|e| e.context(self, "list_segments", path))?;
        let source = UploadPages {
            bucket: self.bucket.clone(),
            work_dir: self.work_dir.clone(),
            prefix: self.abs(path),
            deadline: opt.deadline,
        };
        let service = self.to_string();
        let target = path.to_string();
        Ok(paginate(source, opt.marker)
            .map_err(move |e| e.context(&service, "list_segments", target.clone()))
            .boxed())
    }
}

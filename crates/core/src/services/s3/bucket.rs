//! The slice of the S3 API the storager needs, and its rust-s3 binding.

use async_trait::async_trait;
use bytes::Bytes;
use s3::bucket::Bucket;
use s3::serde_types::Part;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub storage_class: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ListObjectsInput {
    pub prefix: String,
    pub delimiter: Option<String>,
    pub marker: Option<String>,
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ListObjectsOutput {
    pub common_prefixes: Vec<String>,
    pub objects: Vec<ObjectInfo>,
    pub next_marker: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub content_md5: Option<String>,
    pub storage_class: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct UploadInfo {
    pub key: String,
    pub upload_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListUploadsOutput {
    pub uploads: Vec<UploadInfo>,
    pub next_marker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Raw bucket requests. Keys are full backend keys; a missing key surfaces as
/// [`Error::ObjectNotExist`], anything unexpected as [`Error::Unhandled`].
#[async_trait]
pub trait BucketApi: Send + Sync + 'static {
    fn name(&self) -> String;

    async fn list_objects(&self, input: ListObjectsInput) -> Result<ListObjectsOutput>;

    async fn head_object(&self, key: &str) -> Result<ObjectInfo>;

    /// `range` is `(start, inclusive end)`.
    async fn get_object(&self, key: &str, range: Option<(u64, Option<u64>)>) -> Result<Bytes>;

    async fn put_object(&self, key: &str, data: Bytes, opts: &PutOptions) -> Result<()>;

    async fn copy_object(&self, src: &str, dst: &str) -> Result<()>;

    async fn delete_object(&self, key: &str) -> Result<()>;

    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> Result<String>;

    /// Returns the part's etag.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String>;

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<()>;

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()>;

    async fn list_multipart_uploads(
        &self,
        prefix: &str,
        marker: Option<String>,
        limit: usize,
    ) -> Result<ListUploadsOutput>;
}

fn check_status(op: &str, key: &str, code: u16) -> Result<()> {
    match code {
        200..=299 => Ok(()),
        404 => Err(Error::ObjectNotExist(key.to_string())),
        code => Err(Error::unhandled_msg(format!(
            "S3 {op} failed: {key}: status {code}"
        ))),
    }
}

#[async_trait]
impl BucketApi for Bucket {
    fn name(&self) -> String {
        Bucket::name(self)
    }

    async fn list_objects(&self, input: ListObjectsInput) -> Result<ListObjectsOutput> {
        debug!(prefix = %input.prefix, marker = ?input.marker, "S3 LIST");
        let (page, code) = self
            .list_page(
                input.prefix.clone(),
                input.delimiter,
                input.marker,
                None,
                Some(input.limit),
            )
            .await
            .map_err(Error::unhandled)?;
        check_status("LIST", &input.prefix, code)?;

        let common_prefixes = page
            .common_prefixes
            .unwrap_or_default()
            .into_iter()
            .map(|p| p.prefix)
            .collect();
        let objects = page
            .contents
            .into_iter()
            .map(|o| ObjectInfo {
                key: o.key,
                size: o.size,
                last_modified: Some(o.last_modified),
                etag: o.e_tag,
                content_type: None,
                storage_class: o.storage_class,
            })
            .collect();
        let next_marker = if page.is_truncated {
            page.next_continuation_token
        } else {
            None
        };
        Ok(ListObjectsOutput {
            common_prefixes,
            objects,
            next_marker,
        })
    }

    async fn head_object(&self, key: &str) -> Result<ObjectInfo> {
        debug!(key, "S3 HEAD");
        let (head, code) = Bucket::head_object(self, key)
            .await
            .map_err(Error::unhandled)?;
        check_status("HEAD", key, code)?;
        Ok(ObjectInfo {
            key: key.to_string(),
            size: head
                .content_length
                .and_then(|len| u64::try_from(len).ok())
                .unwrap_or(0),
            last_modified: head.last_modified,
            etag: head.e_tag,
            content_type: head.content_type,
            storage_class: head.storage_class,
        })
    }

    async fn get_object(&self, key: &str, range: Option<(u64, Option<u64>)>) -> Result<Bytes> {
        debug!(key, ?range, "S3 GET");
        let response = match range {
            Some((start, end)) => self.get_object_range(key, start, end).await,
            None => Bucket::get_object(self, key).await,
        }
        .map_err(Error::unhandled)?;
        check_status("GET", key, response.status_code())?;
        Ok(Bytes::from(response.to_vec()))
    }

    async fn put_object(&self, key: &str, data: Bytes, opts: &PutOptions) -> Result<()> {
        debug!(key, size = data.len(), "S3 PUT");
        let mut bucket = self.clone();
        if let Some(class) = opts.storage_class {
            bucket.add_header("x-amz-storage-class", class);
        }
        if let Some(md5) = &opts.content_md5 {
            bucket.add_header("Content-MD5", md5);
        }
        let content_type = opts
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        let response = bucket
            .put_object_with_content_type(key, &data, content_type)
            .await
            .map_err(Error::unhandled)?;
        check_status("PUT", key, response.status_code())
    }

    async fn copy_object(&self, src: &str, dst: &str) -> Result<()> {
        debug!(src, dst, "S3 COPY");
        let code = self
            .copy_object_internal(src, dst)
            .await
            .map_err(Error::unhandled)?;
        check_status("COPY", src, code)
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        debug!(key, "S3 DELETE");
        let response = Bucket::delete_object(self, key)
            .await
            .map_err(Error::unhandled)?;
        check_status("DELETE", key, response.status_code())
    }

    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> Result<String> {
        debug!(key, "S3 CREATE MULTIPART");
        let response = self
            .initiate_multipart_upload(key, content_type)
            .await
            .map_err(Error::unhandled)?;
        Ok(response.upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String> {
        debug!(key, upload_id, part_number, size = data.len(), "S3 UPLOAD PART");
        let part = self
            .put_multipart_chunk(
                data.to_vec(),
                key,
                part_number,
                upload_id,
                "application/octet-stream",
            )
            .await
            .map_err(Error::unhandled)?;
        Ok(part.etag)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<()> {
        debug!(key, upload_id, parts = parts.len(), "S3 COMPLETE MULTIPART");
        let parts = parts
            .into_iter()
            .map(|p| Part {
                part_number: p.part_number,
                etag: p.etag,
            })
            .collect();
        let response = Bucket::complete_multipart_upload(self, key, upload_id, parts)
            .await
            .map_err(Error::unhandled)?;
        check_status("COMPLETE MULTIPART", key, response.status_code())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        debug!(key, upload_id, "S3 ABORT MULTIPART");
        self.abort_upload(key, upload_id)
            .await
            .map_err(Error::unhandled)
    }

    /// rust-s3 walks every result page itself, so this always answers with a
    /// single page. There is no way to resume it, so a marker is rejected.
    async fn list_multipart_uploads(
        &self,
        prefix: &str,
        marker: Option<String>,
        _limit: usize,
    ) -> Result<ListUploadsOutput> {
        if let Some(marker) = marker {
            return Err(Error::validation(
                "marker",
                format!("multipart listing cannot resume from {marker}"),
            ));
        }
        debug!(prefix, "S3 LIST MULTIPART");
        let results = self
            .list_multiparts_uploads(Some(prefix), None)
            .await
            .map_err(Error::unhandled)?;
        let uploads = results
            .into_iter()
            .flat_map(|r| r.uploads)
            .map(|u| UploadInfo {
                key: u.key,
                upload_id: u.id,
            })
            .collect();
        Ok(ListUploadsOutput {
            uploads,
            next_marker: None,
        })
    }
}

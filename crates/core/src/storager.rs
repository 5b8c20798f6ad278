use std::fmt::Display;
use std::io::Cursor;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::object::{Object, StorageMeta};
use crate::options::{ListOptions, ListSegmentsOptions, Pair};
use crate::pager::EntryStream;
use crate::segment::Segment;

pub type Reader = Box<dyn AsyncRead + Send + Unpin>;
pub type ObjectStream = EntryStream<Object>;
pub type SegmentStream = EntryStream<Segment>;

/// Wrap in-memory data as a [`Reader`].
pub fn reader(data: impl Into<Bytes>) -> Reader {
    Box::new(Cursor::new(data.into()))
}

/// The contract every storage service adapter implements.
///
/// Paths are canonical: relative to the work dir configured by `init`.
/// Operations a service has no native support for keep the default body and
/// fail with [`Error::CapabilityNotSupported`].
#[async_trait]
pub trait Storager: Send + Sync + Display {
    async fn init(&mut self, pairs: &[Pair]) -> Result<()>;

    async fn metadata(&self, pairs: &[Pair]) -> Result<StorageMeta>;

    /// Lazily list the entries under `path`, page by page.
    async fn list(&self, path: &str, pairs: &[Pair]) -> Result<ObjectStream>;

    async fn read(&self, path: &str, pairs: &[Pair]) -> Result<Reader>;

    /// Write exactly `Pair::Size` bytes from `reader`.
    async fn write(&self, path: &str, reader: Reader, pairs: &[Pair]) -> Result<()>;

    async fn stat(&self, path: &str, pairs: &[Pair]) -> Result<Object>;

    async fn delete(&self, path: &str, pairs: &[Pair]) -> Result<()>;

    async fn copy(&self, src: &str, _dst: &str, _pairs: &[Pair]) -> Result<()> {
        Err(Error::CapabilityNotSupported("copy").context(self, "copy", src))
    }

    /// Move `src` to `dst`.
    async fn rename(&self, src: &str, _dst: &str, _pairs: &[Pair]) -> Result<()> {
        Err(Error::CapabilityNotSupported("move").context(self, "move", src))
    }

    /// Begin a multipart upload to `path`; `Pair::PartSize` is required.
    async fn init_segment(&self, path: &str, _pairs: &[Pair]) -> Result<String> {
        Err(Error::CapabilityNotSupported("init_segment").context(self, "init_segment", path))
    }

    async fn write_segment(
        &self,
        id: &str,
        _offset: u64,
        _size: u64,
        _reader: Reader,
        _pairs: &[Pair],
    ) -> Result<()> {
        Err(Error::CapabilityNotSupported("write_segment").context(self, "write_segment", id))
    }

    async fn complete_segment(&self, id: &str, _pairs: &[Pair]) -> Result<()> {
        Err(Error::CapabilityNotSupported("complete_segment").context(
            self,
            "complete_segment",
            id,
        ))
    }

    async fn abort_segment(&self, id: &str, _pairs: &[Pair]) -> Result<()> {
        Err(Error::CapabilityNotSupported("abort_segment").context(self, "abort_segment", id))
    }

    /// In-progress uploads the backend knows about under `path`. Does not
    /// consult or change this instance's own segment table.
    async fn list_segments(&self, path: &str, _pairs: &[Pair]) -> Result<SegmentStream> {
        Err(Error::CapabilityNotSupported("list_segments").context(self, "list_segments", path))
    }

    /// Callback form of [`Storager::list`]: directories go to `Pair::DirFunc`,
    /// everything else to `Pair::FileFunc`, in listing order.
    async fn walk(&self, path: &str, pairs: &[Pair]) -> Result<()> {
        let opt = ListOptions::parse(pairs).map_err(|e| e.context(self, "list", path))?;
        let mut objects = self.list(path, pairs).await?;
        while let Some(object) = objects.try_next().await? {
            let func = if object.is_dir() {
                &opt.dir_func
            } else {
                &opt.file_func
            };
            if let Some(func) = func {
                func(object);
            }
        }
        Ok(())
    }

    /// Callback form of [`Storager::list_segments`] through `Pair::SegmentFunc`.
    async fn walk_segments(&self, path: &str, pairs: &[Pair]) -> Result<()> {
        let opt = ListSegmentsOptions::parse(pairs)
            .map_err(|e| e.context(self, "list_segments", path))?;
        let mut segments = self.list_segments(path, pairs).await?;
        while let Some(segment) = segments.try_next().await? {
            if let Some(func) = &opt.segment_func {
                func(segment);
            }
        }
        Ok(())
    }
}

/// Drain exactly `size` bytes from `reader`.
pub(crate) async fn read_sized(reader: Reader, size: u64) -> Result<Bytes> {
    let mut buf = Vec::new();
    reader.take(size).read_to_end(&mut buf).await?;
    if buf.len() as u64 != size {
        return Err(Error::validation(
            "size",
            format!("reader ended after {} of {size} bytes", buf.len()),
        ));
    }
    Ok(buf.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_sized_requires_enough_data() {
        let data = read_sized(reader("hello world"), 5).await.unwrap();
        assert_eq!(&data[..], b"hello");

        let err = read_sized(reader("abc"), 5).await.unwrap_err();
        assert!(err.is_validation());
    }
}

//! Multipart ("segmented") upload bookkeeping.
//!
//! A [`SegmentManager`] is owned by one storager instance and tracks the uploads
//! that instance started. The table itself sits behind an `RwLock`; each
//! segment has its own `Mutex` so writers of different parts of the same upload
//! only contend for the short bookkeeping sections, never across a backend call.
//!
//! Every backend interaction is passed in as a future by the adapter. The
//! manager validates state before the call and only touches bookkeeping after
//! it returns, so a failed or cancelled call leaves the table as it was.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// One uploaded byte range of a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub offset: u64,
    pub size: u64,
    /// Backend token for the uploaded part, replayed on completion.
    pub etag: Option<String>,
}

impl Part {
    pub fn new(offset: u64, size: u64) -> Self {
        Self {
            offset,
            size,
            etag: None,
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub id: String,
    pub path: String,
    /// 0 for descriptors listed from the backend, whose part size is unknown.
    pub part_size: u64,
    pub parts: BTreeMap<u64, Part>,
}

impl Segment {
    pub fn new(path: impl Into<String>, id: impl Into<String>, part_size: u64) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            part_size,
            parts: BTreeMap::new(),
        }
    }

    /// Parts in ascending offset order.
    pub fn sorted_parts(&self) -> Vec<Part> {
        self.parts.values().cloned().collect()
    }

    pub fn size(&self) -> u64 {
        self.parts.values().map(|p| p.size).sum()
    }

    fn check_part(&self, offset: u64, size: u64) -> Result<u64> {
        if self.part_size == 0 {
            return Err(Error::validation("part_size", "segment has no part size"));
        }
        if size == 0 || size > self.part_size {
            return Err(Error::validation(
                "size",
                format!("{size} is outside 1..={}", self.part_size),
            ));
        }
        if offset % self.part_size != 0 {
            return Err(Error::validation(
                "offset",
                format!("{offset} is not aligned to part size {}", self.part_size),
            ));
        }
        Ok(offset / self.part_size)
    }
}

/// Everything an adapter needs to upload one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartUpload {
    pub segment_id: String,
    pub path: String,
    /// Zero-based part index, `offset / part_size`.
    pub index: u64,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Default)]
pub struct SegmentManager {
    segments: RwLock<HashMap<String, Arc<Mutex<Segment>>>>,
}

impl SegmentManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.segments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.segments.read().await.is_empty()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.segments.read().await.contains_key(id)
    }

    /// A copy of the tracked segment, if any.
    pub async fn get(&self, id: &str) -> Option<Segment> {
        let entry = self.segments.read().await.get(id).cloned()?;
        let segment = entry.lock().await.clone();
        Some(segment)
    }

    async fn lookup(&self, id: &str) -> Result<Arc<Mutex<Segment>>> {
        self.segments
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::SegmentNotInitiated(id.to_string()))
    }

    /// Start tracking the upload created by `initiate`, which resolves to the
    /// backend-issued upload id. An entry already tracked under that id wins.
    pub async fn init<F>(&self, path: &str, part_size: u64, initiate: F) -> Result<String>
    where
        F: Future<Output = Result<String>>,
    {
        if part_size == 0 {
            return Err(Error::validation("part_size", "must be greater than zero"));
        }
        let id = initiate.await?;

        let mut segments = self.segments.write().await;
        match segments.entry(id.clone()) {
            Entry::Occupied(_) => {
                warn!(segment = %id, path, "segment already tracked, keeping existing entry");
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(Segment::new(path, id.clone(), part_size))));
                info!(segment = %id, path, part_size, "segment initiated");
            }
        }
        Ok(id)
    }

    /// Upload one part through `upload` and record it at `offset`. A part
    /// already recorded at the same offset is replaced.
    pub async fn write<F, Fut>(&self, id: &str, offset: u64, size: u64, upload: F) -> Result<()>
    where
        F: FnOnce(PartUpload) -> Fut,
        Fut: Future<Output = Result<Option<String>>>,
    {
        let entry = self.lookup(id).await?;
        let target = {
            let segment = entry.lock().await;
            let index = segment.check_part(offset, size)?;
            PartUpload {
                segment_id: segment.id.clone(),
                path: segment.path.clone(),
                index,
                offset,
                size,
            }
        };

        let etag = upload(target).await?;

        let mut segment = entry.lock().await;
        let replaced = segment.parts.insert(
            offset,
            Part {
                offset,
                size,
                etag,
            },
        );
        debug!(
            segment = %id,
            offset,
            size,
            replaced = replaced.is_some(),
            parts = segment.parts.len(),
            "part recorded"
        );
        Ok(())
    }

    /// Finalize through `finalize`, which receives the segment with its parts
    /// in offset order. The segment is dropped only when finalizing succeeds.
    pub async fn complete<F, Fut>(&self, id: &str, finalize: F) -> Result<()>
    where
        F: FnOnce(Segment) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let entry = self.lookup(id).await?;
        let segment = {
            let segment = entry.lock().await;
            if segment.parts.is_empty() {
                return Err(Error::SegmentPartsEmpty(id.to_string()));
            }
            segment.clone()
        };
        let (parts, size) = (segment.parts.len(), segment.size());

        finalize(segment).await?;

        self.segments.write().await.remove(id);
        info!(segment = %id, parts, size, "segment completed");
        Ok(())
    }

    /// Cancel through `abort`. The segment is dropped whatever the backend
    /// answered, unless the call ran out of time.
    pub async fn abort<F, Fut>(&self, id: &str, abort: F) -> Result<()>
    where
        F: FnOnce(Segment) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let entry = self.lookup(id).await?;
        let segment = entry.lock().await.clone();

        let result = abort(segment).await;
        if let Err(err) = &result {
            if err.is_deadline_exceeded() {
                return result;
            }
            warn!(segment = %id, error = %err, "backend abort failed, dropping segment anyway");
        }

        self.segments.write().await.remove(id);
        info!(segment = %id, "segment aborted");
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use futures::future::join_all;

    use super::*;

    async fn issued(id: &str) -> Result<String> {
        Ok(id.to_string())
    }

    async fn uploaded() -> Result<Option<String>> {
        Ok(None)
    }

    async fn unreachable_backend<T>() -> Result<T> {
        panic!("backend must not be called")
    }

    #[tokio::test]
    async fn full_lifecycle_orders_parts() {
        let manager = SegmentManager::new();
        let id = manager.init("a/b", 5, issued("u1")).await.unwrap();
        assert_eq!(id, "u1");

        manager.write("u1", 5, 5, |_| uploaded()).await.unwrap();
        manager.write("u1", 0, 5, |_| uploaded()).await.unwrap();

        let finalized = StdMutex::new(Vec::new());
        manager
            .complete("u1", |segment| {
                *finalized.lock().unwrap() = segment.sorted_parts();
                async { Ok(()) }
            })
            .await
            .unwrap();
        let offsets: Vec<u64> = finalized.lock().unwrap().iter().map(|p| p.offset).collect();
        assert_eq!(offsets, vec![0, 5]);
        assert!(manager.is_empty().await);

        let err = manager.complete("u1", |_| async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, Error::SegmentNotInitiated(ref id) if id == "u1"));
    }

    #[tokio::test]
    async fn rewriting_an_offset_keeps_one_part() {
        let manager = SegmentManager::new();
        manager.init("p", 10, issued("u1")).await.unwrap();
        manager.write("u1", 0, 10, |_| uploaded()).await.unwrap();
        manager
            .write("u1", 0, 4, |_| async { Ok(Some("etag-2".to_string())) })
            .await
            .unwrap();

        let segment = manager.get("u1").await.unwrap();
        assert_eq!(segment.parts.len(), 1);
        assert_eq!(segment.parts[&0], Part::new(0, 4).with_etag("etag-2"));
    }

    #[tokio::test]
    async fn complete_without_parts_keeps_segment() {
        let manager = SegmentManager::new();
        manager.init("p", 10, issued("u1")).await.unwrap();
        let err = manager
            .complete("u1", |_| unreachable_backend())
            .await
            .unwrap_err();
        assert!(err.is_segment_parts_empty());
        assert!(manager.contains("u1").await);
    }

    #[tokio::test]
    async fn unknown_id_never_touches_the_table() {
        let manager = SegmentManager::new();
        manager.init("p", 10, issued("u1")).await.unwrap();

        let err = manager
            .write("nope", 0, 1, |_| unreachable_backend())
            .await
            .unwrap_err();
        assert!(err.is_segment_not_initiated());
        assert!(manager.complete("nope", |_| async { Ok(()) }).await.unwrap_err().is_segment_not_initiated());
        assert!(manager.abort("nope", |_| async { Ok(()) }).await.unwrap_err().is_segment_not_initiated());

        assert_eq!(manager.len().await, 1);
        assert!(manager.get("u1").await.unwrap().parts.is_empty());
    }

    #[tokio::test]
    async fn failed_completion_can_be_retried() {
        let manager = SegmentManager::new();
        manager.init("p", 10, issued("u1")).await.unwrap();
        manager.write("u1", 0, 3, |_| uploaded()).await.unwrap();

        let err = manager
            .complete("u1", |_| async { Err(Error::unhandled_msg("500")) })
            .await
            .unwrap_err();
        assert!(err.is_unhandled());
        assert!(manager.contains("u1").await);

        manager.complete("u1", |_| async { Ok(()) }).await.unwrap();
        assert!(!manager.contains("u1").await);
    }

    #[tokio::test]
    async fn abort_drops_segment_even_on_backend_error() {
        let manager = SegmentManager::new();
        manager.init("p", 10, issued("u1")).await.unwrap();
        manager.init("q", 10, issued("u2")).await.unwrap();

        let err = manager
            .abort("u1", |_| async { Err(Error::unhandled_msg("503")) })
            .await
            .unwrap_err();
        assert!(err.is_unhandled());
        assert_eq!(manager.len().await, 1);

        manager.abort("u2", |_| async { Ok(()) }).await.unwrap();
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn timed_out_abort_keeps_segment() {
        let manager = SegmentManager::new();
        manager.init("p", 10, issued("u1")).await.unwrap();
        let err = manager
            .abort("u1", |_| async { Err(Error::DeadlineExceeded) })
            .await
            .unwrap_err();
        assert!(err.is_deadline_exceeded());
        assert!(manager.contains("u1").await);
    }

    #[tokio::test]
    async fn failed_upload_records_nothing() {
        let manager = SegmentManager::new();
        manager.init("p", 10, issued("u1")).await.unwrap();
        let err = manager
            .write("u1", 0, 10, |_| async { Err(Error::unhandled_msg("reset")) })
            .await
            .unwrap_err();
        assert!(err.is_unhandled());
        assert!(manager.get("u1").await.unwrap().parts.is_empty());
    }

    #[tokio::test]
    async fn duplicate_init_keeps_existing_entry() {
        let manager = SegmentManager::new();
        manager.init("p", 10, issued("u1")).await.unwrap();
        manager.write("u1", 0, 10, |_| uploaded()).await.unwrap();

        let id = manager.init("other", 99, issued("u1")).await.unwrap();
        assert_eq!(id, "u1");
        let segment = manager.get("u1").await.unwrap();
        assert_eq!(segment.path, "p");
        assert_eq!(segment.part_size, 10);
        assert_eq!(segment.parts.len(), 1);
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn misaligned_or_oversized_parts_are_rejected() {
        let manager = SegmentManager::new();
        manager.init("p", 10, issued("u1")).await.unwrap();
        for (offset, size) in [(3, 5), (0, 11), (10, 0)] {
            let err = manager
                .write("u1", offset, size, |_| unreachable_backend())
                .await
                .unwrap_err();
            assert!(err.is_validation(), "offset {offset} size {size}");
        }
    }

    #[tokio::test]
    async fn upload_target_carries_part_index() {
        let manager = SegmentManager::new();
        manager.init("dir/file", 4, issued("u1")).await.unwrap();
        let seen = StdMutex::new(None);
        manager
            .write("u1", 8, 2, |target| {
                *seen.lock().unwrap() = Some(target);
                uploaded()
            })
            .await
            .unwrap();
        let target = seen.into_inner().unwrap().unwrap();
        assert_eq!(target.index, 2);
        assert_eq!(target.path, "dir/file");
        assert_eq!(target.segment_id, "u1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_all_land() {
        let manager = Arc::new(SegmentManager::new());
        manager.init("big", 8, issued("u1")).await.unwrap();

        let writers = (0..64u64).map(|i| {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .write("u1", i * 8, 8, |target| async move {
                        tokio::task::yield_now().await;
                        Ok(Some(format!("etag-{}", target.index)))
                    })
                    .await
            })
        });
        for result in join_all(writers).await {
            result.unwrap().unwrap();
        }

        let segment = manager.get("u1").await.unwrap();
        assert_eq!(segment.parts.len(), 64);
        assert_eq!(segment.size(), 64 * 8);
        assert_eq!(segment.parts[&16].etag.as_deref(), Some("etag-2"));
    }
}

//! Continuation-marker pagination turned into a lazy stream of entries.
//!
//! A [`PageSource`] knows how to fetch one backend page for a marker and how
//! to normalize one raw entry. [`paginate`] drives it: entries come out in the
//! order the backend returned them, a new page is requested only once the
//! previous one is drained, and the stream ends when a page carries no marker.
//! The first error (page request or entry normalization) is yielded once and
//! terminates the stream.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tracing::debug;

use crate::error::Result;

pub type EntryStream<T> = BoxStream<'static, Result<T>>;

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub entries: Vec<T>,
    pub next_marker: Option<String>,
}

impl<T> Page<T> {
    pub fn new(entries: Vec<T>, next_marker: Option<String>) -> Self {
        Self {
            entries,
            next_marker,
        }
    }

    pub fn last(entries: Vec<T>) -> Self {
        Self::new(entries, None)
    }
}

#[async_trait]
pub trait PageSource: Send + 'static {
    type Raw: Send + 'static;
    type Item: Send + 'static;

    async fn fetch(&mut self, marker: Option<String>) -> Result<Page<Self::Raw>>;

    fn normalize(&self, raw: Self::Raw) -> Result<Self::Item>;
}

struct Cursor<S: PageSource> {
    source: S,
    marker: Option<String>,
    buffered: VecDeque<S::Raw>,
    pages: usize,
    exhausted: bool,
}

/// Stream every entry of `source`, starting at `marker` (or the beginning).
pub fn paginate<S: PageSource>(source: S, marker: Option<String>) -> EntryStream<S::Item> {
    let cursor = Cursor {
        source,
        marker,
        buffered: VecDeque::new(),
        pages: 0,
        exhausted: false,
    };

    stream::try_unfold(cursor, step).boxed()
}

async fn step<S: PageSource>(mut cursor: Cursor<S>) -> Result<Option<(S::Item, Cursor<S>)>> {
    loop {
        if let Some(raw) = cursor.buffered.pop_front() {
            let item = cursor.source.normalize(raw)?;
            return Ok(Some((item, cursor)));
        }
        if cursor.exhausted {
            return Ok(None);
        }

        let page = cursor.source.fetch(cursor.marker.take()).await?;
        cursor.pages += 1;
        let next_marker = page.next_marker.filter(|m| !m.is_empty());
        debug!(
            page = cursor.pages,
            entries = page.entries.len(),
            next_marker = next_marker.as_deref().unwrap_or(""),
            "fetched page"
        );
        cursor.exhausted = next_marker.is_none();
        cursor.marker = next_marker;
        cursor.buffered = page.entries.into();
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use super::*;
    use crate::error::Error;

    /// Replays canned pages and records the markers it was asked for.
    struct Scripted {
        pages: VecDeque<Result<Page<&'static str>>>,
        requested: std::sync::Arc<std::sync::Mutex<Vec<Option<String>>>>,
    }

    impl Scripted {
        fn new(pages: Vec<Result<Page<&'static str>>>) -> Self {
            Self {
                pages: pages.into(),
                requested: Default::default(),
            }
        }
    }

    #[async_trait]
    impl PageSource for Scripted {
        type Raw = &'static str;
        type Item = String;

        async fn fetch(&mut self, marker: Option<String>) -> Result<Page<&'static str>> {
            self.requested.lock().unwrap().push(marker);
            self.pages
                .pop_front()
                .unwrap_or_else(|| panic!("fetched past the last page"))
        }

        fn normalize(&self, raw: &'static str) -> Result<String> {
            if raw == "bad" {
                return Err(Error::StorageClassNotSupported(raw.to_string()));
            }
            Ok(raw.to_uppercase())
        }
    }

    #[tokio::test]
    async fn empty_last_page_ends_traversal() {
        let source = Scripted::new(vec![
            Ok(Page::new(vec!["a"], Some("m1".into()))),
            Ok(Page::last(vec![])),
        ]);
        let requested = source.requested.clone();
        let items: Vec<String> = paginate(source, None).try_collect().await.unwrap();
        assert_eq!(items, vec!["A"]);
        assert_eq!(*requested.lock().unwrap(), vec![None, Some("m1".to_string())]);
    }

    #[tokio::test]
    async fn visits_every_page_in_order() {
        let source = Scripted::new(vec![
            Ok(Page::new(vec!["a", "b"], Some("m1".into()))),
            Ok(Page::new(vec![], Some("m2".into()))),
            Ok(Page::last(vec!["c"])),
        ]);
        let items: Vec<String> = paginate(source, None).try_collect().await.unwrap();
        assert_eq!(items, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn page_error_aborts_after_delivered_entries() {
        let source = Scripted::new(vec![
            Ok(Page::new(vec!["a"], Some("m1".into()))),
            Err(Error::unhandled_msg("401")),
        ]);
        let mut stream = paginate(source, None);
        assert_eq!(stream.try_next().await.unwrap().as_deref(), Some("A"));
        assert!(stream.try_next().await.unwrap_err().is_unhandled());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn entry_error_fails_the_listing() {
        let source = Scripted::new(vec![Ok(Page::new(
            vec!["a", "bad", "c"],
            Some("m1".into()),
        ))]);
        let collected: Vec<Result<String>> = paginate(source, None).collect().await;
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].as_deref().unwrap(), "A");
        assert!(collected[1].as_ref().unwrap_err().is_storage_class_not_supported());
    }

    #[tokio::test]
    async fn starts_from_given_marker() {
        let source = Scripted::new(vec![Ok(Page::last(vec!["z"]))]);
        let requested = source.requested.clone();
        let items: Vec<String> = paginate(source, Some("m9".into()))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items, vec!["Z"]);
        assert_eq!(*requested.lock().unwrap(), vec![Some("m9".to_string())]);
    }

    #[tokio::test]
    async fn empty_marker_means_no_more_pages() {
        let source = Scripted::new(vec![Ok(Page::new(vec!["a"], Some(String::new())))]);
        let items: Vec<String> = paginate(source, None).try_collect().await.unwrap();
        assert_eq!(items, vec!["A"]);
    }
}

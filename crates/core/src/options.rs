//! Per-call options.
//!
//! A caller hands every operation a slice of [`Pair`]s. Each operation parses
//! the pairs into its own options struct, picking up the keys it recognizes and
//! ignoring the rest. Missing required keys and out-of-range values fail with
//! [`Error::Validation`] before any backend request is made.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::object::Object;
use crate::segment::Segment;
use crate::storage_class::StorageClass;

pub type ObjectFunc = Arc<dyn Fn(Object) + Send + Sync>;
pub type SegmentFunc = Arc<dyn Fn(Segment) + Send + Sync>;

#[derive(Clone)]
pub enum Pair {
    WorkDir(String),
    Timeout(Duration),
    Size(u64),
    Offset(u64),
    PartSize(u64),
    ContentType(String),
    ContentMd5(String),
    StorageClass(StorageClass),
    Recursive(bool),
    Marker(String),
    FileFunc(ObjectFunc),
    DirFunc(ObjectFunc),
    SegmentFunc(SegmentFunc),
}

impl Pair {
    pub fn key(&self) -> &'static str {
        match self {
            Pair::WorkDir(_) => "work_dir",
            Pair::Timeout(_) => "timeout",
            Pair::Size(_) => "size",
            Pair::Offset(_) => "offset",
            Pair::PartSize(_) => "part_size",
            Pair::ContentType(_) => "content_type",
            Pair::ContentMd5(_) => "content_md5",
            Pair::StorageClass(_) => "storage_class",
            Pair::Recursive(_) => "recursive",
            Pair::Marker(_) => "marker",
            Pair::FileFunc(_) => "file_func",
            Pair::DirFunc(_) => "dir_func",
            Pair::SegmentFunc(_) => "segment_func",
        }
    }

    pub fn file_func(f: impl Fn(Object) + Send + Sync + 'static) -> Self {
        Pair::FileFunc(Arc::new(f))
    }

    pub fn dir_func(f: impl Fn(Object) + Send + Sync + 'static) -> Self {
        Pair::DirFunc(Arc::new(f))
    }

    pub fn segment_func(f: impl Fn(Segment) + Send + Sync + 'static) -> Self {
        Pair::SegmentFunc(Arc::new(f))
    }
}

impl fmt::Debug for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pair::WorkDir(v) | Pair::ContentType(v) | Pair::ContentMd5(v) | Pair::Marker(v) => {
                write!(f, "{}={v:?}", self.key())
            }
            Pair::Timeout(v) => write!(f, "{}={v:?}", self.key()),
            Pair::Size(v) | Pair::Offset(v) | Pair::PartSize(v) => write!(f, "{}={v}", self.key()),
            Pair::StorageClass(v) => write!(f, "{}={v}", self.key()),
            Pair::Recursive(v) => write!(f, "{}={v}", self.key()),
            Pair::FileFunc(_) | Pair::DirFunc(_) | Pair::SegmentFunc(_) => f.write_str(self.key()),
        }
    }
}

/// Point in time after which a call's backend requests are abandoned.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    fn from_timeout(timeout: Option<Duration>) -> Result<Self> {
        match timeout {
            Some(d) if d.is_zero() => Err(Error::validation("timeout", "must be greater than zero")),
            Some(d) => Ok(Self::after(d)),
            None => Ok(Self::none()),
        }
    }

    pub async fn run<T, F>(self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.0 {
            Some(at) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| Error::DeadlineExceeded)?,
            None => fut.await,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub work_dir: Option<String>,
}

impl InitOptions {
    pub fn parse(pairs: &[Pair]) -> Result<Self> {
        let mut opt = Self::default();
        for pair in pairs {
            if let Pair::WorkDir(v) = pair {
                if v.split('/').any(|c| c == ".." || c == ".") {
                    return Err(Error::validation(
                        "work_dir",
                        format!("{v:?} must not contain relative components"),
                    ));
                }
                opt.work_dir = Some(v.clone());
            }
        }
        Ok(opt)
    }
}

/// Options of operations that only honor a deadline.
#[derive(Debug, Clone, Default)]
pub struct OpOptions {
    pub deadline: Deadline,
}

impl OpOptions {
    pub fn parse(pairs: &[Pair]) -> Result<Self> {
        Ok(Self {
            deadline: Deadline::from_timeout(timeout(pairs))?,
        })
    }
}

#[derive(Clone, Default)]
pub struct ListOptions {
    pub deadline: Deadline,
    pub recursive: bool,
    pub marker: Option<String>,
    pub file_func: Option<ObjectFunc>,
    pub dir_func: Option<ObjectFunc>,
}

impl ListOptions {
    pub fn parse(pairs: &[Pair]) -> Result<Self> {
        let mut opt = Self {
            deadline: Deadline::from_timeout(timeout(pairs))?,
            ..Self::default()
        };
        for pair in pairs {
            match pair {
                Pair::Recursive(v) => opt.recursive = *v,
                Pair::Marker(v) => opt.marker = Some(v.clone()),
                Pair::FileFunc(f) => opt.file_func = Some(f.clone()),
                Pair::DirFunc(f) => opt.dir_func = Some(f.clone()),
                _ => {}
            }
        }
        Ok(opt)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub deadline: Deadline,
    pub offset: Option<u64>,
    pub size: Option<u64>,
}

impl ReadOptions {
    pub fn parse(pairs: &[Pair]) -> Result<Self> {
        let mut opt = Self {
            deadline: Deadline::from_timeout(timeout(pairs))?,
            ..Self::default()
        };
        for pair in pairs {
            match pair {
                Pair::Offset(v) => opt.offset = Some(*v),
                Pair::Size(v) => opt.size = Some(*v),
                _ => {}
            }
        }
        if opt.size == Some(0) {
            return Err(Error::validation("size", "must be greater than zero"));
        }
        if let (Some(offset), Some(size)) = (opt.offset, opt.size) {
            if offset.checked_add(size).is_none() {
                return Err(Error::validation("size", "offset + size overflows"));
            }
        }
        Ok(opt)
    }

    /// Inclusive byte range to request, if any was asked for.
    pub fn range(&self) -> Option<(u64, Option<u64>)> {
        if self.offset.is_none() && self.size.is_none() {
            return None;
        }
        let start = self.offset.unwrap_or(0);
        Some((start, self.size.map(|size| start + size - 1)))
    }
}

#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub deadline: Deadline,
    pub size: u64,
    pub content_type: Option<String>,
    pub content_md5: Option<String>,
    pub storage_class: Option<StorageClass>,
}

impl WriteOptions {
    pub fn parse(pairs: &[Pair]) -> Result<Self> {
        let mut size = None;
        let mut opt = Self {
            deadline: Deadline::from_timeout(timeout(pairs))?,
            size: 0,
            content_type: None,
            content_md5: None,
            storage_class: None,
        };
        for pair in pairs {
            match pair {
                Pair::Size(v) => size = Some(*v),
                Pair::ContentType(v) => opt.content_type = Some(v.clone()),
                Pair::ContentMd5(v) => opt.content_md5 = Some(v.clone()),
                Pair::StorageClass(v) => opt.storage_class = Some(*v),
                _ => {}
            }
        }
        opt.size = size.ok_or_else(|| Error::validation("size", "is required"))?;
        Ok(opt)
    }
}

#[derive(Debug, Clone)]
pub struct InitSegmentOptions {
    pub deadline: Deadline,
    pub part_size: u64,
    pub content_type: Option<String>,
}

impl InitSegmentOptions {
    pub fn parse(pairs: &[Pair]) -> Result<Self> {
        let mut part_size = None;
        let mut content_type = None;
        for pair in pairs {
            match pair {
                Pair::PartSize(v) => part_size = Some(*v),
                Pair::ContentType(v) => content_type = Some(v.clone()),
                _ => {}
            }
        }
        let part_size = match part_size {
            None => return Err(Error::validation("part_size", "is required")),
            Some(0) => return Err(Error::validation("part_size", "must be greater than zero")),
            Some(v) => v,
        };
        Ok(Self {
            deadline: Deadline::from_timeout(timeout(pairs))?,
            part_size,
            content_type,
        })
    }
}

#[derive(Clone, Default)]
pub struct ListSegmentsOptions {
    pub deadline: Deadline,
    pub marker: Option<String>,
    pub segment_func: Option<SegmentFunc>,
}

impl ListSegmentsOptions {
    pub fn parse(pairs: &[Pair]) -> Result<Self> {
        let mut opt = Self {
            deadline: Deadline::from_timeout(timeout(pairs))?,
            ..Self::default()
        };
        for pair in pairs {
            match pair {
                Pair::Marker(v) => opt.marker = Some(v.clone()),
                Pair::SegmentFunc(f) => opt.segment_func = Some(f.clone()),
                _ => {}
            }
        }
        Ok(opt)
    }
}

fn timeout(pairs: &[Pair]) -> Option<Duration> {
    pairs.iter().rev().find_map(|p| match p {
        Pair::Timeout(d) => Some(*d),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_requires_size() {
        let err = WriteOptions::parse(&[Pair::ContentType("text/plain".into())]).unwrap_err();
        assert!(matches!(err, Error::Validation { key: "size", .. }));

        let opt = WriteOptions::parse(&[Pair::Size(10), Pair::StorageClass(StorageClass::Warm)])
            .unwrap();
        assert_eq!(opt.size, 10);
        assert_eq!(opt.storage_class, Some(StorageClass::Warm));
    }

    #[test]
    fn unrecognized_pairs_are_ignored() {
        let opt = WriteOptions::parse(&[Pair::Size(1), Pair::Recursive(true), Pair::PartSize(3)])
            .unwrap();
        assert_eq!(opt.size, 1);
        assert!(ListOptions::parse(&[Pair::Size(1)]).is_ok());
    }

    #[test]
    fn init_segment_rejects_zero_part_size() {
        let err = InitSegmentOptions::parse(&[Pair::PartSize(0)]).unwrap_err();
        assert!(err.is_validation());
        assert!(InitSegmentOptions::parse(&[]).unwrap_err().is_validation());
        assert_eq!(
            InitSegmentOptions::parse(&[Pair::PartSize(10)]).unwrap().part_size,
            10
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = OpOptions::parse(&[Pair::Timeout(Duration::ZERO)]).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn work_dir_must_be_plain() {
        assert!(InitOptions::parse(&[Pair::WorkDir("a/../b".into())]).is_err());
        let opt = InitOptions::parse(&[Pair::WorkDir("/a/b/".into())]).unwrap();
        assert_eq!(opt.work_dir.as_deref(), Some("/a/b/"));
    }

    #[test]
    fn read_range() {
        let opt = ReadOptions::parse(&[Pair::Offset(4), Pair::Size(4)]).unwrap();
        assert_eq!(opt.range(), Some((4, Some(7))));
        let opt = ReadOptions::parse(&[Pair::Offset(4)]).unwrap();
        assert_eq!(opt.range(), Some((4, None)));
        assert_eq!(ReadOptions::parse(&[]).unwrap().range(), None);
        assert!(ReadOptions::parse(&[Pair::Offset(u64::MAX), Pair::Size(2)]).is_err());
        assert!(ReadOptions::parse(&[Pair::Size(0)]).is_err());
    }

    #[tokio::test]
    async fn deadline_expires() {
        let deadline = Deadline::after(Duration::from_millis(10));
        let err = deadline
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.is_deadline_exceeded());
        assert_eq!(Deadline::none().run(async { Ok(7) }).await.unwrap(), 7);
    }
}

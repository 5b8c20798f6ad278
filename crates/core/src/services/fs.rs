use std::fmt;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::object::{Object, ObjectType, StorageMeta};
use crate::options::{Deadline, InitOptions, ListOptions, OpOptions, Pair, ReadOptions, WriteOptions};
use crate::pager::{Page, PageSource, paginate};
use crate::path::WorkDir;
use crate::storager::{ObjectStream, Reader, Storager};

/// Local directory tree exposed as a storager. Has no multipart uploads.
pub struct FsStorage {
    root: PathBuf,
    work_dir: WorkDir,
}

impl FsStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            work_dir: WorkDir::default(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(self.work_dir.abs(path))
    }
}

impl fmt::Display for FsStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fs {{root: {}, work_dir: {}}}", self.root.display(), self.work_dir)
    }
}

fn io_error(err: std::io::Error, full: &Path) -> Error {
    if err.kind() == ErrorKind::NotFound {
        Error::ObjectNotExist(full.display().to_string())
    } else {
        Error::unhandled(err)
    }
}

fn updated_at(modified: std::io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    modified.ok().map(DateTime::<Utc>::from)
}

struct FsEntry {
    full: PathBuf,
    name: String,
    is_dir: bool,
    size: u64,
    updated_at: Option<DateTime<Utc>>,
}

/// One directory per page. Recursive listings visit directories depth first in
/// name order, and the marker is the next directory to read. The position is
/// rebuilt from the tree on every page, so any marker handed out can be
/// listed again.
struct DirPages {
    base: PathBuf,
    start: String,
    recursive: bool,
    deadline: Deadline,
}

fn parent_dir(dir: &str) -> &str {
    dir.rsplit_once('/').map_or("", |(parent, _)| parent)
}

impl DirPages {
    /// Entries of `dir` sorted by name. A missing directory is empty.
    async fn scan(&self, dir: &str) -> Result<Vec<FsEntry>> {
        let full = self.base.join(dir);
        if !tokio::fs::metadata(&full).await.is_ok_and(|m| m.is_dir()) {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&full).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(
                    dir = %full.display(),
                    name = ?entry.file_name(),
                    "skipping entry with a non UTF-8 name"
                );
                continue;
            };
            let meta = entry.metadata().await?;
            let name = if dir.is_empty() {
                file_name
            } else {
                format!("{dir}/{file_name}")
            };
            entries.push(FsEntry {
                full: entry.path(),
                name,
                is_dir: meta.is_dir(),
                size: meta.len(),
                updated_at: updated_at(meta.modified()),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn contains(&self, dir: &str) -> bool {
        self.start.is_empty()
            || dir == self.start
            || dir
                .strip_prefix(self.start.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Directory read after `dir`: its first subdirectory, otherwise the next
    /// sibling of the closest ancestor that has one.
    async fn next_dir(&self, dir: &str, entries: &[FsEntry]) -> Result<Option<String>> {
        if let Some(child) = entries.iter().find(|e| e.is_dir) {
            return Ok(Some(child.name.clone()));
        }
        let mut current = dir.to_string();
        while current != self.start {
            let parent = parent_dir(&current).to_string();
            let siblings = self.scan(&parent).await?;
            if let Some(next) = siblings.iter().find(|e| e.is_dir && e.name > current) {
                return Ok(Some(next.name.clone()));
            }
            current = parent;
        }
        Ok(None)
    }

    async fn page(&self, marker: Option<String>) -> Result<Page<FsEntry>> {
        let dir = marker
            .map(|m| m.trim_matches('/').to_string())
            .unwrap_or_else(|| self.start.clone());
        if !self.contains(&dir) || (!self.recursive && dir != self.start) {
            return Err(Error::validation(
                "marker",
                format!("{dir} is not a directory of this listing"),
            ));
        }

        let mut entries = self.scan(&dir).await?;
        if !self.recursive {
            return Ok(Page::new(entries, None));
        }
        let next = self.next_dir(&dir, &entries).await?;
        entries.retain(|e| !e.is_dir);
        Ok(Page::new(entries, next))
    }
}

#[async_trait]
impl PageSource for DirPages {
    type Raw = FsEntry;
    type Item = Object;

    async fn fetch(&mut self, marker: Option<String>) -> Result<Page<FsEntry>> {
        self.deadline.run(self.page(marker)).await
    }

    fn normalize(&self, raw: FsEntry) -> Result<Object> {
        let kind = if raw.is_dir {
            ObjectType::Dir
        } else {
            ObjectType::File
        };
        let size = if raw.is_dir { 0 } else { raw.size };
        Ok(Object::new(raw.full.display().to_string(), raw.name, kind)
            .with_size(size)
            .with_updated_at(raw.updated_at))
    }
}

#[async_trait]
impl Storager for FsStorage {
    async fn init(&mut self, pairs: &[Pair]) -> Result<()> {
        let opt = InitOptions::parse(pairs).map_err(|e| e.context(&*self, "init", ""))?;
        if let Some(work_dir) = opt.work_dir {
            self.work_dir = WorkDir::new(&work_dir);
        }
        let full = self.full_path("");
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|e| Error::from(e).context(&*self, "init", full.display().to_string()))?;
        debug!(root = %self.root.display(), work_dir = %self.work_dir, "fs storager ready");
        Ok(())
    }

    async fn metadata(&self, _pairs: &[Pair]) -> Result<StorageMeta> {
        Ok(StorageMeta::new(
            self.root.display().to_string(),
            self.work_dir.to_string(),
        ))
    }

    async fn list(&self, path: &str, pairs: &[Pair]) -> Result<ObjectStream> {
        let opt = ListOptions::parse(pairs).map_err(|e| e.context(self, "list", path))?;
        let source = DirPages {
            base: self.full_path(""),
            start: path.trim_matches('/').to_string(),
            recursive: opt.recursive,
            deadline: opt.deadline,
        };
        let service = self.to_string();
        let target = path.to_string();
        Ok(paginate(source, opt.marker)
            .map_err(move |e| e.context(&service, "list", target.clone()))
            .boxed())
    }

    async fn read(&self, path: &str, pairs: &[Pair]) -> Result<Reader> {
        let full = self.full_path(path);
        let open = async {
            let opt = ReadOptions::parse(pairs)?;
            let mut file = opt
                .deadline
                .run(async {
                    tokio::fs::File::open(&full)
                        .await
                        .map_err(|e| io_error(e, &full))
                })
                .await?;
            if let Some(offset) = opt.offset {
                file.seek(SeekFrom::Start(offset)).await?;
            }
            let reader: Reader = match opt.size {
                Some(size) => Box::new(file.take(size)),
                None => Box::new(file),
            };
            Ok::<_, Error>(reader)
        };
        open.await.map_err(|e: Error| e.context(self, "read", path))
    }

    async fn write(&self, path: &str, reader: Reader, pairs: &[Pair]) -> Result<()> {
        let full = self.full_path(path);
        let write = async {
            let opt = WriteOptions::parse(pairs)?;
            let parent = full
                .parent()
                .ok_or_else(|| Error::validation("path", "no parent directory"))?;
            let file_name = full
                .file_name()
                .ok_or_else(|| Error::validation("path", "no file name"))?;
            let temp = parent.join(format!(
                ".{}.{}.tmp",
                file_name.to_string_lossy(),
                uuid::Uuid::new_v4()
            ));

            let written = opt
                .deadline
                .run(async {
                    tokio::fs::create_dir_all(parent).await?;
                    let mut file = tokio::fs::File::create(&temp).await?;
                    let written = tokio::io::copy(&mut reader.take(opt.size), &mut file).await?;
                    file.sync_all().await?;
                    if written != opt.size {
                        return Err(Error::validation(
                            "size",
                            format!("reader ended after {written} of {} bytes", opt.size),
                        ));
                    }
                    tokio::fs::rename(&temp, &full).await?;
                    Ok(written)
                })
                .await;
            let written = match written {
                Ok(written) => written,
                Err(err) => {
                    let _ = tokio::fs::remove_file(&temp).await;
                    return Err(err);
                }
            };
            debug!(path = %full.display(), size = written, "wrote file");
            Ok::<_, Error>(())
        };
        write.await.map_err(|e| e.context(self, "write", path))
    }

    async fn stat(&self, path: &str, pairs: &[Pair]) -> Result<Object> {
        let full = self.full_path(path);
        let stat = async {
            let opt = OpOptions::parse(pairs)?;
            let meta = opt
                .deadline
                .run(async { tokio::fs::metadata(&full).await.map_err(|e| io_error(e, &full)) })
                .await?;
            let kind = if meta.is_dir() {
                ObjectType::Dir
            } else {
                ObjectType::File
            };
            let size = if meta.is_dir() { 0 } else { meta.len() };
            Ok::<_, Error>(
                Object::new(full.display().to_string(), path, kind)
                    .with_size(size)
                    .with_updated_at(updated_at(meta.modified())),
            )
        };
        stat.await.map_err(|e: Error| e.context(self, "stat", path))
    }

    async fn delete(&self, path: &str, pairs: &[Pair]) -> Result<()> {
        let full = self.full_path(path);
        let delete = async {
            let opt = OpOptions::parse(pairs)?;
            opt.deadline
                .run(async {
                    let removed = match tokio::fs::metadata(&full).await {
                        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir(&full).await,
                        Ok(_) => tokio::fs::remove_file(&full).await,
                        Err(e) => Err(e),
                    };
                    match removed {
                        Err(e) if e.kind() != ErrorKind::NotFound => Err(Error::from(e)),
                        _ => Ok(()),
                    }
                })
                .await
        };
        delete.await.map_err(|e| e.context(self, "delete", path))
    }

    async fn copy(&self, src: &str, dst: &str, pairs: &[Pair]) -> Result<()> {
        let (from, to) = (self.full_path(src), self.full_path(dst));
        let copy = async {
            let opt = OpOptions::parse(pairs)?;
            opt.deadline
                .run(async {
                    if let Some(parent) = to.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::copy(&from, &to)
                        .await
                        .map_err(|e| io_error(e, &from))?;
                    Ok(())
                })
                .await
        };
        copy.await.map_err(|e| e.context(self, "copy", src))
    }

    async fn rename(&self, src: &str, dst: &str, pairs: &[Pair]) -> Result<()> {
        let (from, to) = (self.full_path(src), self.full_path(dst));
        let rename = async {
            let opt = OpOptions::parse(pairs)?;
            opt.deadline
                .run(async {
                    if let Some(parent) = to.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::rename(&from, &to)
                        .await
                        .map_err(|e| io_error(e, &from))
                })
                .await
        };
        rename.await.map_err(|e| e.context(self, "move", src))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::storager::reader;

    async fn storage(dir: &tempfile::TempDir) -> FsStorage {
        let mut fs = FsStorage::new(dir.path());
        fs.init(&[Pair::WorkDir("/work".into())]).await.unwrap();
        fs
    }

    async fn put(fs: &FsStorage, path: &str, data: &'static str) {
        fs.write(path, reader(data), &[Pair::Size(data.len() as u64)])
            .await
            .unwrap();
    }

    async fn read_all(fs: &FsStorage, path: &str, pairs: &[Pair]) -> String {
        let mut out = String::new();
        fs.read(path, pairs)
            .await
            .unwrap()
            .read_to_string(&mut out)
            .await
            .unwrap();
        out
    }

    #[tokio::test]
    async fn write_read_stat_delete() {
        let dir = tempfile::tempdir().unwrap();
        let fs = storage(&dir).await;
        let path = format!("test/{}", uuid::Uuid::new_v4());

        put(&fs, &path, "hello world").await;
        assert!(dir.path().join("work").join(&path).is_file());

        assert_eq!(read_all(&fs, &path, &[]).await, "hello world");
        assert_eq!(
            read_all(&fs, &path, &[Pair::Offset(6), Pair::Size(3)]).await,
            "wor"
        );

        let object = fs.stat(&path, &[]).await.unwrap();
        assert_eq!(object.name, path);
        assert_eq!(object.kind, ObjectType::File);
        assert_eq!(object.size, 11);
        assert!(object.updated_at.is_some());

        fs.delete(&path, &[]).await.unwrap();
        fs.delete(&path, &[]).await.unwrap();
        let err = fs.stat(&path, &[]).await.unwrap_err();
        assert!(err.is_not_exist());
    }

    #[tokio::test]
    async fn write_requires_size_and_enough_data() {
        let dir = tempfile::tempdir().unwrap();
        let fs = storage(&dir).await;

        let err = fs.write("a", reader("abc"), &[]).await.unwrap_err();
        assert!(err.is_validation());

        let err = fs
            .write("a", reader("abc"), &[Pair::Size(10)])
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("write [a]"));
    }

    #[tokio::test]
    async fn failed_write_keeps_the_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let fs = storage(&dir).await;
        put(&fs, "f", "hello").await;

        let err = fs
            .write("f", reader("abc"), &[Pair::Size(10)])
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(read_all(&fs, "f", &[]).await, "hello");
        assert_eq!(names(&fs, "", &[]).await, vec!["f"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_utf8_names_are_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let fs = storage(&dir).await;
        put(&fs, "ok", "1").await;
        std::fs::write(
            dir.path().join("work").join(OsStr::from_bytes(b"bad\xff")),
            "2",
        )
        .unwrap();

        assert_eq!(names(&fs, "", &[]).await, vec!["ok"]);
    }

    #[tokio::test]
    async fn list_one_level_dirs_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let fs = storage(&dir).await;
        put(&fs, "b.txt", "b").await;
        put(&fs, "a.txt", "aa").await;
        put(&fs, "sub/c.txt", "c").await;

        let objects: Vec<Object> = fs.list("", &[]).await.unwrap().try_collect().await.unwrap();
        let names: Vec<(&str, ObjectType)> =
            objects.iter().map(|o| (o.name.as_str(), o.kind)).collect();
        assert_eq!(
            names,
            vec![
                ("a.txt", ObjectType::File),
                ("b.txt", ObjectType::File),
                ("sub", ObjectType::Dir),
            ]
        );
        assert_eq!(objects[0].size, 2);
    }

    async fn names(fs: &FsStorage, path: &str, pairs: &[Pair]) -> Vec<String> {
        fs.list(path, pairs)
            .await
            .unwrap()
            .map_ok(|o| o.name)
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn recursive_list_descends_and_resumes_from_marker() {
        let dir = tempfile::tempdir().unwrap();
        let fs = storage(&dir).await;
        put(&fs, "x/1", "1").await;
        put(&fs, "x/y/2", "2").await;
        put(&fs, "z/3", "3").await;
        put(&fs, "top", "t").await;

        let recursive = Pair::Recursive(true);
        assert_eq!(
            names(&fs, "", &[recursive.clone()]).await,
            vec!["top", "x/1", "x/y/2", "z/3"]
        );
        assert_eq!(
            names(&fs, "", &[recursive.clone(), Pair::Marker("x/y".into())]).await,
            vec!["x/y/2", "z/3"]
        );
        assert_eq!(
            names(&fs, "", &[recursive.clone(), Pair::Marker("z".into())]).await,
            vec!["z/3"]
        );
        assert_eq!(
            names(&fs, "x", &[recursive.clone()]).await,
            vec!["x/1", "x/y/2"]
        );
    }

    #[tokio::test]
    async fn every_marker_restarts_the_rest_of_the_listing() {
        let dir = tempfile::tempdir().unwrap();
        let fs = storage(&dir).await;
        for path in ["a/1", "a/b/2", "a/b/c/3", "a/d/4", "e/5", "f", "g/h/6"] {
            put(&fs, path, "x").await;
        }

        let mut source = DirPages {
            base: fs.full_path(""),
            start: String::new(),
            recursive: true,
            deadline: Deadline::default(),
        };
        let mut pages = Vec::new();
        let mut marker = None;
        loop {
            let page = source.fetch(marker.clone()).await.unwrap();
            let files: Vec<String> = page.entries.into_iter().map(|e| e.name).collect();
            pages.push((marker, files));
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        let all: Vec<String> = pages.iter().flat_map(|(_, f)| f.clone()).collect();
        assert_eq!(
            all,
            vec!["f", "a/1", "a/b/2", "a/b/c/3", "a/d/4", "e/5", "g/h/6"]
        );

        for (i, (marker, _)) in pages.iter().enumerate() {
            let Some(marker) = marker else { continue };
            let expected: Vec<String> = pages[i..].iter().flat_map(|(_, f)| f.clone()).collect();
            let restarted = names(
                &fs,
                "",
                &[Pair::Recursive(true), Pair::Marker(marker.clone())],
            )
            .await;
            assert_eq!(restarted, expected, "restart from {marker}");
        }
    }

    #[tokio::test]
    async fn marker_outside_listing_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fs = storage(&dir).await;
        put(&fs, "x/1", "1").await;
        put(&fs, "xy/2", "2").await;

        let results: Vec<Result<Object>> = fs
            .list("x", &[Pair::Recursive(true), Pair::Marker("xy".into())])
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(results.len(), 1);
        assert!(results[0].as_ref().unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn missing_dir_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let fs = storage(&dir).await;
        let objects: Vec<Object> = fs
            .list("nowhere", &[])
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(objects.is_empty());
    }

    #[tokio::test]
    async fn walk_dispatches_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        let fs = storage(&dir).await;
        put(&fs, "f", "1").await;
        put(&fs, "d/g", "2").await;

        let files = Arc::new(Mutex::new(Vec::new()));
        let dirs = Arc::new(Mutex::new(Vec::new()));
        let (f, d) = (files.clone(), dirs.clone());
        fs.walk(
            "",
            &[
                Pair::file_func(move |o| f.lock().unwrap().push(o.name)),
                Pair::dir_func(move |o| d.lock().unwrap().push(o.name)),
            ],
        )
        .await
        .unwrap();
        assert_eq!(*files.lock().unwrap(), vec!["f"]);
        assert_eq!(*dirs.lock().unwrap(), vec!["d"]);
    }

    #[tokio::test]
    async fn copy_and_move() {
        let dir = tempfile::tempdir().unwrap();
        let fs = storage(&dir).await;
        put(&fs, "src", "data").await;

        fs.copy("src", "copies/one", &[]).await.unwrap();
        assert_eq!(read_all(&fs, "copies/one", &[]).await, "data");

        fs.rename("src", "moved/two", &[]).await.unwrap();
        assert_eq!(read_all(&fs, "moved/two", &[]).await, "data");
        assert!(fs.stat("src", &[]).await.unwrap_err().is_not_exist());

        let err = fs.rename("src", "again", &[]).await.unwrap_err();
        assert!(err.is_not_exist());
    }

    #[tokio::test]
    async fn segments_are_not_supported() {
        let dir = tempfile::tempdir().unwrap();
        let fs = storage(&dir).await;
        let err = fs
            .init_segment("big", &[Pair::PartSize(1024)])
            .await
            .unwrap_err();
        assert!(err.is_capability_not_supported());
        assert!(fs.list_segments("", &[]).await.is_err());
    }

    #[tokio::test]
    async fn metadata_reports_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = storage(&dir).await;
        let meta = fs.metadata(&[]).await.unwrap();
        assert_eq!(meta.work_dir, "/work/");
        assert_eq!(meta.location(), None);
        assert!(fs.init(&[Pair::WorkDir("../escape".into())]).await.is_err());
    }
}

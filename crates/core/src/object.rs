use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_class::StorageClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    File,
    Stream,
    Dir,
    Invalid,
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectType::File => write!(f, "file"),
            ObjectType::Stream => write!(f, "stream"),
            ObjectType::Dir => write!(f, "dir"),
            ObjectType::Invalid => write!(f, "invalid"),
        }
    }
}

/// A stored entity as seen through the canonical contract.
///
/// Struct fields are always filled in by the adapter. Everything in `meta`
/// is optional and only present when the backend reported it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Object {
    /// Backend-native key.
    pub id: String,
    /// Path relative to the work dir.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ObjectType,
    /// Size in bytes, 0 when unknown.
    pub size: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub meta: ObjectMeta,
}

impl Object {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ObjectType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            size: 0,
            updated_at: None,
            meta: ObjectMeta::new(),
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_updated_at(mut self, updated_at: Option<DateTime<Utc>>) -> Self {
        self.updated_at = updated_at;
        self
    }

    pub fn with_meta(mut self, meta: ObjectMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn is_dir(&self) -> bool {
        self.kind == ObjectType::Dir
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetaKey {
    ContentType,
    ContentMd5,
    Etag,
    StorageClass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Text(String),
    Class(StorageClass),
}

/// Optional object attributes keyed by [`MetaKey`]; absence is explicit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ObjectMeta {
    m: BTreeMap<MetaKey, MetaValue>,
}

impl ObjectMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.text(MetaKey::ContentType)
    }

    pub fn must_content_type(&self) -> &str {
        self.must_text(MetaKey::ContentType)
    }

    pub fn set_content_type(self, v: impl Into<String>) -> Self {
        self.set(MetaKey::ContentType, MetaValue::Text(v.into()))
    }

    pub fn content_md5(&self) -> Option<&str> {
        self.text(MetaKey::ContentMd5)
    }

    pub fn must_content_md5(&self) -> &str {
        self.must_text(MetaKey::ContentMd5)
    }

    pub fn set_content_md5(self, v: impl Into<String>) -> Self {
        self.set(MetaKey::ContentMd5, MetaValue::Text(v.into()))
    }

    pub fn etag(&self) -> Option<&str> {
        self.text(MetaKey::Etag)
    }

    pub fn must_etag(&self) -> &str {
        self.must_text(MetaKey::Etag)
    }

    pub fn set_etag(self, v: impl Into<String>) -> Self {
        self.set(MetaKey::Etag, MetaValue::Text(v.into()))
    }

    pub fn storage_class(&self) -> Option<StorageClass> {
        match self.m.get(&MetaKey::StorageClass) {
            Some(MetaValue::Class(class)) => Some(*class),
            _ => None,
        }
    }

    pub fn must_storage_class(&self) -> StorageClass {
        self.storage_class()
            .unwrap_or_else(|| panic!("object meta has no storage-class"))
    }

    pub fn set_storage_class(self, v: StorageClass) -> Self {
        self.set(MetaKey::StorageClass, MetaValue::Class(v))
    }

    pub fn contains(&self, key: MetaKey) -> bool {
        self.m.contains_key(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetaKey, &MetaValue)> {
        self.m.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.m.is_empty()
    }

    fn set(mut self, key: MetaKey, value: MetaValue) -> Self {
        self.m.insert(key, value);
        self
    }

    fn text(&self, key: MetaKey) -> Option<&str> {
        match self.m.get(&key) {
            Some(MetaValue::Text(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    fn must_text(&self, key: MetaKey) -> &str {
        self.text(key)
            .unwrap_or_else(|| panic!("object meta has no {key:?}"))
    }
}

/// Describes the storage container itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StorageMeta {
    pub name: String,
    pub work_dir: String,
    location: Option<String>,
}

impl StorageMeta {
    pub fn new(name: impl Into<String>, work_dir: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            work_dir: work_dir.into(),
            location: None,
        }
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn must_location(&self) -> &str {
        self.location
            .as_deref()
            .unwrap_or_else(|| panic!("storage meta has no location"))
    }

    pub fn set_location(mut self, v: impl Into<String>) -> Self {
        self.location = Some(v.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_attributes_report_absence() {
        let meta = ObjectMeta::new().set_etag("abc");
        assert_eq!(meta.etag(), Some("abc"));
        assert_eq!(meta.content_type(), None);
        assert_eq!(meta.storage_class(), None);
        assert!(!meta.contains(MetaKey::ContentMd5));
        assert_eq!(meta.len(), 1);
    }

    #[test]
    fn fluent_setters_overwrite() {
        let meta = ObjectMeta::new()
            .set_content_type("text/plain")
            .set_storage_class(StorageClass::Cold)
            .set_content_type("application/json");
        assert_eq!(meta.must_content_type(), "application/json");
        assert_eq!(meta.must_storage_class(), StorageClass::Cold);
    }

    #[test]
    #[should_panic(expected = "no storage-class")]
    fn must_accessor_panics_when_absent() {
        ObjectMeta::new().must_storage_class();
    }

    #[test]
    fn storage_meta_location() {
        let meta = StorageMeta::new("bucket", "data/");
        assert!(meta.location().is_none());
        let meta = meta.set_location("eu-west-1");
        assert_eq!(meta.must_location(), "eu-west-1");
    }
}

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Canonical storage tiers every backend-specific class collapses onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    Hot,
    Warm,
    Cold,
    Archive,
}

impl std::fmt::Display for StorageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageClass::Hot => write!(f, "hot"),
            StorageClass::Warm => write!(f, "warm"),
            StorageClass::Cold => write!(f, "cold"),
            StorageClass::Archive => write!(f, "archive"),
        }
    }
}

impl std::str::FromStr for StorageClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hot" => Ok(StorageClass::Hot),
            "warm" => Ok(StorageClass::Warm),
            "cold" => Ok(StorageClass::Cold),
            "archive" => Ok(StorageClass::Archive),
            _ => Err(Error::StorageClassNotSupported(s.to_string())),
        }
    }
}

/// Bidirectional mapping between one backend's class identifiers and
/// [`StorageClass`]. Each identifier and each class appears at most once.
#[derive(Debug, Clone, Copy)]
pub struct StorageClassTable {
    entries: &'static [(&'static str, StorageClass)],
}

impl StorageClassTable {
    pub const fn new(entries: &'static [(&'static str, StorageClass)]) -> Self {
        Self { entries }
    }

    pub fn normalize(&self, identifier: &str) -> Result<StorageClass> {
        self.entries
            .iter()
            .find(|(id, _)| *id == identifier)
            .map(|(_, class)| *class)
            .ok_or_else(|| Error::StorageClassNotSupported(identifier.to_string()))
    }

    pub fn denormalize(&self, class: StorageClass) -> Result<&'static str> {
        self.entries
            .iter()
            .find(|(_, c)| *c == class)
            .map(|(id, _)| *id)
            .ok_or_else(|| Error::StorageClassNotSupported(class.to_string()))
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }
}

// Licensed under the Apache-2.0 license

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobError {
    #[error("Can't find built in blob {0:?}")]
    NotFound(String),
}

/// Built-in firmware blobs the image generator may fall back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlobId {
    RecoveryLoader,
    ManufacturingBootloader,
    Cd,
}

impl BlobId {
    pub const ALL: [BlobId; 3] = [
        BlobId::RecoveryLoader,
        BlobId::ManufacturingBootloader,
        BlobId::Cd,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BlobId::RecoveryLoader => "XELL",
            BlobId::ManufacturingBootloader => "CBMFG",
            BlobId::Cd => "CD",
        }
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for BlobId {
    type Err = BlobError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        BlobId::ALL
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| BlobError::NotFound(name.to_string()))
    }
}

/// Blob contents keyed by identifier, supplied by whoever packages the tool.
#[derive(Debug, Default, Clone)]
pub struct BlobStore {
    blobs: BTreeMap<BlobId, Vec<u8>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: BlobId, data: Vec<u8>) {
        self.blobs.insert(id, data);
    }

    pub fn with_blob(mut self, id: BlobId, data: Vec<u8>) -> Self {
        self.insert(id, data);
        self
    }

    pub fn get(&self, id: BlobId) -> Result<&[u8], BlobError> {
        self.blobs
            .get(&id)
            .map(Vec::as_slice)
            .ok_or_else(|| BlobError::NotFound(id.name().to_string()))
    }

    /// Looks a blob up by its name. Empty or unknown names are `NotFound`.
    pub fn get_named(&self, name: &str) -> Result<&[u8], BlobError> {
        if name.is_empty() {
            return Err(BlobError::NotFound(String::new()));
        }
        self.get(name.parse()?)
    }

    pub fn contains(&self, id: BlobId) -> bool {
        self.blobs.contains_key(&id)
    }
}

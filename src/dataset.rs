//! Versioned datasets: the unit of state a node owns and replicates.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Maximum length of a single record, in characters.
pub const MAX_RECORD_LEN: usize = 255;

/// Version of a dataset that has never been filled.
pub const INITIAL_VERSION: i64 = -1;

/// Check that a record can be carried in a single LIST part.
pub fn validate_record(record: &str) -> Result<()> {
    let len = record.chars().count();
    if len > MAX_RECORD_LEN {
        return Err(Error::DataTooLong {
            len,
            max: MAX_RECORD_LEN,
        });
    }
    if record.contains(';') {
        return Err(Error::InvalidData(record.to_string()));
    }
    Ok(())
}

/// An immutable, sequence-numbered snapshot of string records.
///
/// A new version never mutates an existing snapshot: [`update`] builds a
/// fresh one, so anyone holding an `Arc<VersionedDataset>` always sees records
/// and version that belong together.
///
/// [`update`]: VersionedDataset::update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedDataset {
    records: Vec<String>,
    version: i64,
}

impl Default for VersionedDataset {
    fn default() -> Self {
        Self::empty()
    }
}

impl VersionedDataset {
    /// An empty dataset at [`INITIAL_VERSION`].
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            version: INITIAL_VERSION,
        }
    }

    /// Create a dataset, validating every record.
    pub fn new(records: Vec<String>, version: i64) -> Result<Self> {
        for record in &records {
            validate_record(record)?;
        }
        Ok(Self { records, version })
    }

    /// Build the snapshot that replaces this one.
    pub fn update(&self, records: Vec<String>, version: i64) -> Result<Self> {
        Self::new(records, version)
    }

    /// The records, in order.
    pub fn records(&self) -> &[String] {
        &self.records
    }

    /// Sequence number of this snapshot.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The local node's dataset, shared between the protocol actors and
/// whatever produces new local data.
///
/// Readers take an `Arc` snapshot and never hold the lock across an await.
#[derive(Debug, Clone, Default)]
pub struct LocalDataset {
    current: Arc<RwLock<Arc<VersionedDataset>>>,
}

impl LocalDataset {
    /// Create a provider holding an empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider holding the given dataset.
    pub fn with_dataset(dataset: VersionedDataset) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(dataset))),
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<VersionedDataset> {
        self.current.read().clone()
    }

    /// Version of the current snapshot.
    pub fn version(&self) -> i64 {
        self.current.read().version()
    }

    /// Replace the dataset wholesale.
    pub fn replace(&self, records: Vec<String>, version: i64) -> Result<()> {
        let next = Arc::new(VersionedDataset::new(records, version)?);
        *self.current.write() = next;
        tracing::debug!(version, "local dataset replaced");
        Ok(())
    }

    /// Append one record and bump the version by one.
    ///
    /// Returns the new version.
    pub fn append(&self, record: impl Into<String>) -> Result<i64> {
        let record = record.into();
        validate_record(&record)?;

        let mut current = self.current.write();
        let mut records = current.records().to_vec();
        records.push(record);
        let version = current.version() + 1;
        *current = Arc::new(VersionedDataset { records, version });
        tracing::debug!(version, "local dataset appended");
        Ok(version)
    }
}

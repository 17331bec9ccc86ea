//! Interface to the external harvester.
//!
//! Locating values in a source document (browser automation, HTML parsing,
//! API calls) happens outside this crate. A harvester hands back, per field
//! name, either one string or an ordered sequence of strings.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::plan::Plan;

/// A value located by the harvester for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Single(String),
    Many(Vec<String>),
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Single(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Single(s)
    }
}

impl<S: Into<String>> From<Vec<S>> for RawValue {
    fn from(items: Vec<S>) -> Self {
        RawValue::Many(items.into_iter().map(Into::into).collect())
    }
}

/// Everything harvested from one document: field name -> raw value.
pub type Harvested = IndexMap<String, RawValue>;

/// Error type for harvester implementations
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("failed to read harvested data from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid harvested data: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("harvest failed: {0}")]
    Source(String),
}

/// Source of harvested values for a plan.
///
/// Implementations interpret each field's selector against the plan's
/// source; this crate never does.
pub trait Harvester: Send + Sync {
    /// Harvester kind, matched against [`Plan::harvester`].
    fn kind(&self) -> &str;

    fn harvest(&self, plan: &Plan) -> Result<Vec<Harvested>, HarvestError>;
}

/// Harvester backed by values that were already located elsewhere and
/// exported as JSON, either one object or an array of objects:
///
/// ```json
/// {"title": "Hello", "tags": ["a", "b"]}
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticHarvester {
    documents: Vec<Harvested>,
    batch: bool,
}

impl StaticHarvester {
    pub fn new(documents: Vec<Harvested>) -> Self {
        Self {
            documents,
            batch: true,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, HarvestError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Documents {
            One(Harvested),
            Many(Vec<Harvested>),
        }

        let (documents, batch) = match serde_json::from_str(json)? {
            Documents::One(doc) => (vec![doc], false),
            Documents::Many(docs) => (docs, true),
        };

        Ok(Self { documents, batch })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, HarvestError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| HarvestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, HarvestError> {
        let mut contents = String::new();
        reader
            .read_to_string(&mut contents)
            .map_err(|source| HarvestError::Read {
                path: PathBuf::from("-"),
                source,
            })?;
        Self::from_json_str(&contents)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Whether the data was given as an array of documents.
    pub fn is_batch(&self) -> bool {
        self.batch
    }

    pub fn documents(&self) -> &[Harvested] {
        &self.documents
    }
}

impl Harvester for StaticHarvester {
    fn kind(&self) -> &str {
        "static"
    }

    fn harvest(&self, _plan: &Plan) -> Result<Vec<Harvested>, HarvestError> {
        Ok(self.documents.clone())
    }
}

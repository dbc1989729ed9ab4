//! The structured document produced by a completed task.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel for metadata the extraction stage could not provide
pub const UNKNOWN: &str = "unknown";

/// Participant fields the metadata stage extracts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    Code,
    Name,
    Age,
    Education,
}

impl MetadataField {
    pub const ALL: [MetadataField; 4] = [Self::Code, Self::Name, Self::Age, Self::Education];

    /// Key used in model output
    pub fn key(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Name => "name",
            Self::Age => "age",
            Self::Education => "education",
        }
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Raw extraction output; absent keys were not found
pub type MetadataMap = BTreeMap<MetadataField, String>;

/// Participant metadata stored on a transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantMetadata {
    pub code: String,
    pub name: String,
    pub age: String,
    pub education: String,
}

impl Default for ParticipantMetadata {
    fn default() -> Self {
        Self {
            code: UNKNOWN.to_string(),
            name: UNKNOWN.to_string(),
            age: UNKNOWN.to_string(),
            education: UNKNOWN.to_string(),
        }
    }
}

impl From<&MetadataMap> for ParticipantMetadata {
    fn from(map: &MetadataMap) -> Self {
        let field = |f: MetadataField| map.get(&f).cloned().unwrap_or_else(|| UNKNOWN.to_string());
        Self {
            code: field(MetadataField::Code),
            name: field(MetadataField::Name),
            age: field(MetadataField::Age),
            education: field(MetadataField::Education),
        }
    }
}

/// A completed, structured interview document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub id: Uuid,

    pub owner: String,

    /// Original filename of the recording
    pub source_file: String,

    /// Task that produced this document
    pub task_id: Uuid,

    pub metadata: ParticipantMetadata,

    /// Speaker-formatted dialogue
    pub content: String,

    pub created_at: DateTime<Utc>,
}

impl Transcript {
    pub fn new(
        owner: String,
        source_file: String,
        task_id: Uuid,
        metadata: ParticipantMetadata,
        content: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            source_file,
            task_id,
            metadata,
            content,
            created_at: Utc::now(),
        }
    }
}

/// Display name for an audio reference
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;

use crate::models::rendition::{upload_time_of, ImageSet};
use crate::PipelineError;

const MAX_OWNER_ID_LEN: usize = 128;

/// Aggregate that owns a profile image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OwnerEntityType {
    User,
    Dog,
}

impl OwnerEntityType {
    pub const ALL: [OwnerEntityType; 2] = [OwnerEntityType::User, OwnerEntityType::Dog];

    /// Multipart field name and first key segment (`users` / `dogs`).
    pub fn field_name(&self) -> &'static str {
        match self {
            OwnerEntityType::User => "users",
            OwnerEntityType::Dog => "dogs",
        }
    }

    pub fn from_field_name(field: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.field_name() == field)
    }
}

impl Display for OwnerEntityType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            OwnerEntityType::User => write!(f, "user"),
            OwnerEntityType::Dog => write!(f, "dog"),
        }
    }
}

impl FromStr for OwnerEntityType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(OwnerEntityType::User),
            "dog" => Ok(OwnerEntityType::Dog),
            _ => Err(anyhow::anyhow!("Invalid owner entity type: {}", s)),
        }
    }
}

/// A validated reference to a user or dog record.
///
/// Ids become storage key segments, so only ASCII alphanumerics, `-` and `_` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerRef {
    entity_type: OwnerEntityType,
    entity_id: String,
}

impl OwnerRef {
    pub fn new(
        entity_type: OwnerEntityType,
        entity_id: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let entity_id = entity_id.into();
        if entity_id.is_empty() || entity_id.len() > MAX_OWNER_ID_LEN {
            return Err(PipelineError::Validation(format!(
                "{} id must be between 1 and {} characters",
                entity_type, MAX_OWNER_ID_LEN
            )));
        }
        if !entity_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(PipelineError::Validation(format!(
                "{} id contains unsupported characters: {}",
                entity_type, entity_id
            )));
        }
        Ok(Self {
            entity_type,
            entity_id,
        })
    }

    pub fn entity_type(&self) -> OwnerEntityType {
        self.entity_type
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }
}

impl Display for OwnerRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} {}", self.entity_type, self.entity_id)
    }
}

/// Image keys currently recorded on a user or dog, with the optimistic-lock version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerImages {
    pub source_key: Option<String>,
    pub rendition_keys: Vec<String>,
    pub version: i64,
}

impl OwnerImages {
    /// True when the record already references exactly this image set.
    pub fn holds(&self, set: &ImageSet) -> bool {
        self.source_key.as_deref() == Some(set.source_key.as_str())
            && self.rendition_keys == set.renditions.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.source_key.is_none() && self.rendition_keys.is_empty()
    }

    /// True when the record points at an original uploaded after `set`'s.
    ///
    /// Sets with no readable upload time never supersede and are never superseded.
    pub fn supersedes(&self, set: &ImageSet) -> bool {
        let current = self.source_key.as_deref().and_then(upload_time_of);
        match (current, set.uploaded_at()) {
            (Some(current), Some(incoming)) => current > incoming,
            _ => false,
        }
    }

    /// Every key referenced by the record (original first).
    pub fn keys(&self) -> Vec<String> {
        self.source_key
            .iter()
            .chain(self.rendition_keys.iter())
            .cloned()
            .collect()
    }

    /// Keys that become unreferenced once `replacement` is written.
    pub fn stale_keys(&self, replacement: Option<&ImageSet>) -> Vec<String> {
        let keep = replacement.map(ImageSet::all_keys).unwrap_or_default();
        self.keys()
            .into_iter()
            .filter(|k| !keep.contains(k))
            .collect()
    }
}

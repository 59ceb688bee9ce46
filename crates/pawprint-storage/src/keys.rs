//! Shared key generation for storage backends.
//!
//! Originals live at `{field}/{owner_id}/{suffix}{ext}`. Renditions of that original
//! live under the same suffix: `{field}/{owner_id}/{suffix}/{size_dir}/{suffix}{size_suffix}`.
//! Rendition keys are a pure function of the original's key, so a redelivered job
//! writes to exactly the same objects.

use chrono::{DateTime, SecondsFormat, Utc};
use pawprint_core::models::{OwnerEntityType, OwnerRef, RenditionSet, SizeClass};
use pawprint_core::PipelineError;
use rand::Rng;

use crate::traits::{StorageError, StorageResult};

const SUFFIX_RANDOM_RANGE: u32 = 1_000_000_000;
const MAX_EXTENSION_LEN: usize = 5;

/// Reject keys that could escape a bucket prefix or a local storage root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.trim().is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.contains("..") || key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// Upload suffix: UTC timestamp with `/`, `\` and `:` replaced by `_`, then `-{0..1e9}`.
pub fn unique_suffix() -> String {
    let n = rand::rng().random_range(0..SUFFIX_RANDOM_RANGE);
    unique_suffix_at(Utc::now(), n)
}

pub fn unique_suffix_at(now: DateTime<Utc>, random: u32) -> String {
    let timestamp: String = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect();
    format!("{}-{}", timestamp, random)
}

/// Lowercased extension of `filename` including the dot, or an empty string.
pub fn extension_of(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && is_extension(ext) => {
            format!(".{}", ext.to_lowercase())
        }
        _ => String::new(),
    }
}

fn is_extension(ext: &str) -> bool {
    !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Key of an uploaded original.
pub fn original_key(owner: &OwnerRef, suffix: &str, extension: &str) -> String {
    format!(
        "{}/{}/{}{}",
        owner.entity_type().field_name(),
        owner.entity_id(),
        suffix,
        extension
    )
}

/// A parsed original key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceKey {
    pub entity_type: OwnerEntityType,
    pub entity_id: String,
    pub suffix: String,
    pub extension: String,
}

impl SourceKey {
    pub fn parse(key: &str) -> Result<Self, PipelineError> {
        validate_key(key).map_err(|e| PipelineError::Validation(e.to_string()))?;

        let mut parts = key.split('/');
        let (field, entity_id, file) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(field), Some(id), Some(file), None) => (field, id, file),
            _ => {
                return Err(PipelineError::Validation(format!(
                    "Source key must have the form field/id/file: {}",
                    key
                )))
            }
        };

        let entity_type = OwnerEntityType::from_field_name(field).ok_or_else(|| {
            PipelineError::Validation(format!("Unknown field in source key: {}", field))
        })?;
        let owner = OwnerRef::new(entity_type, entity_id)?;

        let (suffix, extension) = match file.rsplit_once('.') {
            Some((suffix, ext)) if is_extension(ext) => (suffix, format!(".{}", ext)),
            _ => (file, String::new()),
        };
        if suffix.is_empty() {
            return Err(PipelineError::Validation(format!(
                "Source key has no upload suffix: {}",
                key
            )));
        }

        Ok(Self {
            entity_type: owner.entity_type(),
            entity_id: owner.entity_id().to_string(),
            suffix: suffix.to_string(),
            extension,
        })
    }

    pub fn owner(&self) -> Result<OwnerRef, PipelineError> {
        OwnerRef::new(self.entity_type, self.entity_id.clone())
    }

    pub fn rendition_key(&self, size: SizeClass) -> String {
        format!(
            "{}/{}/{}/{}/{}{}",
            self.entity_type.field_name(),
            self.entity_id,
            self.suffix,
            size.directory(),
            self.suffix,
            size.filename_suffix()
        )
    }

    pub fn renditions(&self) -> RenditionSet {
        RenditionSet {
            thumbnail: self.rendition_key(SizeClass::Thumbnail),
            medium: self.rendition_key(SizeClass::Medium),
            large: self.rendition_key(SizeClass::Large),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn suffix_replaces_separators() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            unique_suffix_at(now, 42),
            "2024-03-09T14_05_07.000Z-42"
        );
        assert!(!unique_suffix().contains(':'));
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension_of("Rex.JPG"), ".jpg");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("noext"), "");
        assert_eq!(extension_of(".hidden"), "");
    }

    #[test]
    fn rendition_keys_follow_layout() {
        let owner = OwnerRef::new(OwnerEntityType::Dog, "d1").unwrap();
        let suffix = "2024-03-09T14_05_07.000Z-42";
        let key = original_key(&owner, suffix, ".jpg");
        assert_eq!(key, "dogs/d1/2024-03-09T14_05_07.000Z-42.jpg");

        let parsed = SourceKey::parse(&key).unwrap();
        assert_eq!(parsed.suffix, suffix);
        assert_eq!(parsed.extension, ".jpg");
        assert_eq!(parsed.owner().unwrap(), owner);

        let set = parsed.renditions();
        assert_eq!(
            set.thumbnail,
            "dogs/d1/2024-03-09T14_05_07.000Z-42/thumbnails/2024-03-09T14_05_07.000Z-42_thumb.jpg"
        );
        assert_eq!(
            set.medium,
            "dogs/d1/2024-03-09T14_05_07.000Z-42/720p/2024-03-09T14_05_07.000Z-42_720.jpg"
        );
        assert_eq!(
            set.large,
            "dogs/d1/2024-03-09T14_05_07.000Z-42/1080p/2024-03-09T14_05_07.000Z-42_1080.jpg"
        );
        // Same source key, same renditions.
        assert_eq!(SourceKey::parse(&key).unwrap().renditions(), set);
    }

    #[test]
    fn parse_keeps_millis_in_suffix_without_extension() {
        let parsed = SourceKey::parse("users/u1/2024-03-09T14_05_07.000Z-42").unwrap();
        assert_eq!(parsed.suffix, "2024-03-09T14_05_07.000Z-42");
        assert_eq!(parsed.extension, "");
    }

    #[test]
    fn parse_rejects_malformed_keys() {
        assert!(SourceKey::parse("cats/c1/a.jpg").is_err());
        assert!(SourceKey::parse("dogs/d1").is_err());
        assert!(SourceKey::parse("dogs/d1/x/y.jpg").is_err());
        assert!(SourceKey::parse("dogs/../a.jpg").is_err());
        assert!(SourceKey::parse("/dogs/d1/a.jpg").is_err());
    }

    #[test]
    fn validate_key_rejects_traversal() {
        assert!(validate_key("dogs/d1/a.jpg").is_ok());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("  ").is_err());
    }
}

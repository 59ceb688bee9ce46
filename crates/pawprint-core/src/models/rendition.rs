use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use utoipa::ToSchema;

/// Fixed rendition sizes produced for every upload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Thumbnail,
    Medium,
    Large,
}

impl SizeClass {
    pub const ALL: [SizeClass; 3] = [SizeClass::Thumbnail, SizeClass::Medium, SizeClass::Large];

    /// Side of the square bounding box the rendition is fitted into.
    pub fn max_dimension(&self) -> u32 {
        match self {
            SizeClass::Thumbnail => 150,
            SizeClass::Medium => 720,
            SizeClass::Large => 1080,
        }
    }

    /// Key segment between the upload suffix and the filename.
    pub fn directory(&self) -> &'static str {
        match self {
            SizeClass::Thumbnail => "thumbnails",
            SizeClass::Medium => "720p",
            SizeClass::Large => "1080p",
        }
    }

    pub fn filename_suffix(&self) -> &'static str {
        match self {
            SizeClass::Thumbnail => "_thumb.jpg",
            SizeClass::Medium => "_720.jpg",
            SizeClass::Large => "_1080.jpg",
        }
    }
}

impl Display for SizeClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SizeClass::Thumbnail => write!(f, "thumbnail"),
            SizeClass::Medium => write!(f, "medium"),
            SizeClass::Large => write!(f, "large"),
        }
    }
}

/// Storage keys of the three renditions of one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RenditionSet {
    pub thumbnail: String,
    pub medium: String,
    pub large: String,
}

impl RenditionSet {
    pub fn key(&self, size: SizeClass) -> &str {
        match size {
            SizeClass::Thumbnail => &self.thumbnail,
            SizeClass::Medium => &self.medium,
            SizeClass::Large => &self.large,
        }
    }

    /// Keys in `SizeClass::ALL` order, the layout stored on owner records and jobs.
    pub fn keys(&self) -> Vec<String> {
        SizeClass::ALL
            .iter()
            .map(|size| self.key(*size).to_string())
            .collect()
    }

    pub fn from_keys(keys: &[String]) -> Option<Self> {
        match keys {
            [thumbnail, medium, large] => Some(Self {
                thumbnail: thumbnail.clone(),
                medium: medium.clone(),
                large: large.clone(),
            }),
            _ => None,
        }
    }
}

/// An original plus its renditions, the unit written to an owner record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSet {
    pub source_key: String,
    pub renditions: RenditionSet,
}

impl ImageSet {
    pub fn all_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(4);
        keys.push(self.source_key.clone());
        keys.extend(self.renditions.keys());
        keys
    }

    pub fn uploaded_at(&self) -> Option<DateTime<Utc>> {
        upload_time_of(&self.source_key)
    }
}

/// Upload time carried by an original's key (`{field}/{id}/{timestamp}-{n}{ext}`).
///
/// `None` for keys that were not minted by intake.
pub fn upload_time_of(source_key: &str) -> Option<DateTime<Utc>> {
    let file = source_key.rsplit('/').next()?;
    let (stamp, _) = file.rsplit_once('-')?;
    DateTime::parse_from_rfc3339(&stamp.replace('_', ":"))
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_classes_are_fixed() {
        let dims: Vec<u32> = SizeClass::ALL.iter().map(|s| s.max_dimension()).collect();
        assert_eq!(dims, vec![150, 720, 1080]);
        assert_eq!(SizeClass::Thumbnail.filename_suffix(), "_thumb.jpg");
        assert_eq!(SizeClass::Large.directory(), "1080p");
    }

    #[test]
    fn from_keys_requires_three() {
        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let set = RenditionSet::from_keys(&keys).unwrap();
        assert_eq!(set.key(SizeClass::Medium), "b");
        assert_eq!(set.keys(), keys);
        assert!(RenditionSet::from_keys(&keys[..2]).is_none());
    }

    #[test]
    fn upload_time_comes_from_the_suffix() {
        let set = ImageSet {
            source_key: "dogs/d1/2024-05-01T10_15_30.250Z-42.jpg".to_string(),
            renditions: RenditionSet {
                thumbnail: "t".to_string(),
                medium: "m".to_string(),
                large: "l".to_string(),
            },
        };
        let at = set.uploaded_at().unwrap();
        assert_eq!(at.to_rfc3339(), "2024-05-01T10:15:30.250+00:00");

        assert!(upload_time_of("dogs/d1/s.jpg").is_none());
        assert!(upload_time_of("dogs/d1/not-a-date-7.png").is_none());
    }
}

pub mod image_delete;
pub mod image_get;
pub mod image_upload;
pub mod jobs;

use pawprint_core::models::{OwnerEntityType, OwnerRef};
use pawprint_core::AppError;

/// Resolve `/{entity}/{id}` path segments. Unknown entities are a missing resource.
pub(crate) fn parse_owner(entity: &str, id: &str) -> Result<OwnerRef, AppError> {
    let entity_type = OwnerEntityType::from_field_name(entity)
        .ok_or_else(|| AppError::NotFound(format!("Unknown entity: {}", entity)))?;
    Ok(OwnerRef::new(entity_type, id)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_entities() {
        let owner = parse_owner("dogs", "d1").unwrap();
        assert_eq!(owner.entity_type(), OwnerEntityType::Dog);
        assert_eq!(owner.entity_id(), "d1");
        assert_eq!(
            parse_owner("users", "u1").unwrap().entity_type(),
            OwnerEntityType::User
        );
    }

    #[test]
    fn unknown_entity_is_not_found() {
        assert!(matches!(
            parse_owner("cats", "c1"),
            Err(AppError::NotFound(_))
        ));
    }
}

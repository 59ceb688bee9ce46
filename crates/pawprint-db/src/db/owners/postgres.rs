use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row};

use pawprint_core::models::{ImageSet, OwnerEntityType, OwnerImages};
use pawprint_core::PipelineError;

use super::OwnerImageRecords;

async fn exists_in(pool: &PgPool, table: &str, entity_id: &str) -> Result<bool, PipelineError> {
    let query = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)", table);
    let exists = sqlx::query_scalar::<Postgres, bool>(&query)
        .bind(entity_id)
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

async fn load_from(
    pool: &PgPool,
    table: &str,
    entity_id: &str,
) -> Result<Option<OwnerImages>, PipelineError> {
    let query = format!(
        "SELECT image_source_key, image_keys, image_version FROM {} WHERE id = $1",
        table
    );
    let row = sqlx::query(&query)
        .bind(entity_id)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(OwnerImages {
        source_key: row.try_get("image_source_key")?,
        rendition_keys: row
            .try_get::<Option<Vec<String>>, _>("image_keys")?
            .unwrap_or_default(),
        version: row.try_get("image_version")?,
    }))
}

async fn swap_in(
    pool: &PgPool,
    table: &str,
    entity_id: &str,
    expected_version: i64,
    images: Option<&ImageSet>,
) -> Result<bool, PipelineError> {
    let query = format!(
        r#"
        UPDATE {}
        SET image_source_key = $3,
            image_keys = $4,
            image_version = image_version + 1,
            updated_at = NOW()
        WHERE id = $1 AND image_version = $2
        "#,
        table
    );
    let result = sqlx::query(&query)
        .bind(entity_id)
        .bind(expected_version)
        .bind(images.map(|set| set.source_key.clone()))
        .bind(images.map(|set| set.renditions.keys()).unwrap_or_default())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Image fields of the `users` table.
#[derive(Clone)]
pub struct UserImageRepository {
    pool: PgPool,
}

impl UserImageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OwnerImageRecords for UserImageRepository {
    fn entity_type(&self) -> OwnerEntityType {
        OwnerEntityType::User
    }

    #[tracing::instrument(skip(self), fields(db.table = "users", db.operation = "select"))]
    async fn exists(&self, entity_id: &str) -> Result<bool, PipelineError> {
        exists_in(&self.pool, "users", entity_id).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "users", db.operation = "select"))]
    async fn load_images(&self, entity_id: &str) -> Result<Option<OwnerImages>, PipelineError> {
        load_from(&self.pool, "users", entity_id).await
    }

    #[tracing::instrument(skip(self, images), fields(db.table = "users", db.operation = "update"))]
    async fn swap_images(
        &self,
        entity_id: &str,
        expected_version: i64,
        images: Option<&ImageSet>,
    ) -> Result<bool, PipelineError> {
        swap_in(&self.pool, "users", entity_id, expected_version, images).await
    }
}

/// Image fields of the `dogs` table.
#[derive(Clone)]
pub struct DogImageRepository {
    pool: PgPool,
}

impl DogImageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OwnerImageRecords for DogImageRepository {
    fn entity_type(&self) -> OwnerEntityType {
        OwnerEntityType::Dog
    }

    #[tracing::instrument(skip(self), fields(db.table = "dogs", db.operation = "select"))]
    async fn exists(&self, entity_id: &str) -> Result<bool, PipelineError> {
        exists_in(&self.pool, "dogs", entity_id).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "dogs", db.operation = "select"))]
    async fn load_images(&self, entity_id: &str) -> Result<Option<OwnerImages>, PipelineError> {
        load_from(&self.pool, "dogs", entity_id).await
    }

    #[tracing::instrument(skip(self, images), fields(db.table = "dogs", db.operation = "update"))]
    async fn swap_images(
        &self,
        entity_id: &str,
        expected_version: i64,
        images: Option<&ImageSet>,
    ) -> Result<bool, PipelineError> {
        swap_in(&self.pool, "dogs", entity_id, expected_version, images).await
    }
}

//! Configuration module
//!
//! Settings for the intake API and the resize worker, loaded from the environment
//! (and `.env` when present).

use std::env;

use crate::models::job::DEFAULT_QUEUE_NAME;
use crate::storage_types::StorageBackend;

const SERVER_PORT: u16 = 3000;
const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const HTTP_CONCURRENCY_LIMIT: usize = 10_000;
const MAX_FILE_SIZE_MB: usize = 3;
const MAX_FILES_PER_REQUEST: usize = 10;
const DEFAULT_ALLOWED_EXTENSIONS: &str = "jpeg,jpg,png,gif";
const DEFAULT_ALLOWED_CONTENT_TYPES: &str = "image/jpeg,image/png,image/gif";
const PRESIGN_TTL_SECS: u64 = 3600;
const WORKER_MAX_CONCURRENCY: usize = 4;
const WORKER_POLL_INTERVAL_MS: u64 = 1000;
const JOB_VISIBILITY_TIMEOUT_SECS: u64 = 300;
const JOB_MAX_ATTEMPTS: i32 = 5;
const JOB_REAP_INTERVAL_SECS: u64 = 60;
const RENDITION_JPEG_QUALITY: u8 = 85;

/// Settings shared by the API and the standalone worker
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
    /// Requests served at once before the API starts queueing.
    pub http_concurrency_limit: usize,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            server_port: SERVER_PORT,
            cors_origins: vec!["*".to_string()],
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            environment: "development".to_string(),
            http_concurrency_limit: HTTP_CONCURRENCY_LIMIT,
        }
    }
}

/// Image pipeline configuration
#[derive(Clone, Debug)]
pub struct ImagePipelineConfig {
    pub base: BaseConfig,
    pub database_url: String,
    // Storage
    pub storage_backend: Option<StorageBackend>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // S3-compatible providers (MinIO, R2, ...)
    pub aws_region: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    // Intake
    pub max_file_size_bytes: usize,
    pub max_files_per_request: usize,
    pub allowed_extensions: Vec<String>,
    pub allowed_content_types: Vec<String>,
    pub presign_ttl_secs: u64,
    // Queue and worker
    pub queue_name: String,
    pub worker_enabled: bool,
    pub worker_max_concurrency: usize,
    pub worker_poll_interval_ms: u64,
    pub job_visibility_timeout_secs: u64,
    pub job_max_attempts: i32,
    /// Seconds between expired-lease sweeps. 0 = disabled.
    pub job_reap_interval_secs: u64,
    pub rendition_jpeg_quality: u8,
}

impl Default for ImagePipelineConfig {
    fn default() -> Self {
        Self {
            base: BaseConfig::default(),
            database_url: String::new(),
            storage_backend: None,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            aws_region: None,
            local_storage_path: None,
            local_storage_base_url: None,
            max_file_size_bytes: MAX_FILE_SIZE_MB * 1024 * 1024,
            max_files_per_request: MAX_FILES_PER_REQUEST,
            allowed_extensions: split_list(DEFAULT_ALLOWED_EXTENSIONS),
            allowed_content_types: split_list(DEFAULT_ALLOWED_CONTENT_TYPES),
            presign_ttl_secs: PRESIGN_TTL_SECS,
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            worker_enabled: true,
            worker_max_concurrency: WORKER_MAX_CONCURRENCY,
            worker_poll_interval_ms: WORKER_POLL_INTERVAL_MS,
            job_visibility_timeout_secs: JOB_VISIBILITY_TIMEOUT_SECS,
            job_max_attempts: JOB_MAX_ATTEMPTS,
            job_reap_interval_secs: JOB_REAP_INTERVAL_SECS,
            rendition_jpeg_quality: RENDITION_JPEG_QUALITY,
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<ImagePipelineConfig>);

impl Config {
    pub fn new(config: ImagePipelineConfig) -> Self {
        Config(Box::new(config))
    }

    fn as_pipeline(&self) -> &ImagePipelineConfig {
        &self.0
    }

    pub fn is_production(&self) -> bool {
        is_production_name(&self.as_pipeline().base.environment)
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = ImagePipelineConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_pipeline().validate()
    }

    pub fn server_port(&self) -> u16 {
        self.as_pipeline().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.as_pipeline().base.cors_origins
    }

    pub fn environment(&self) -> &str {
        &self.as_pipeline().base.environment
    }

    pub fn http_concurrency_limit(&self) -> usize {
        self.as_pipeline().base.http_concurrency_limit.max(1)
    }

    pub fn db_max_connections(&self) -> u32 {
        self.as_pipeline().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.as_pipeline().base.db_timeout_seconds
    }

    pub fn database_url(&self) -> &str {
        &self.as_pipeline().database_url
    }

    pub fn storage_backend(&self) -> Option<StorageBackend> {
        self.as_pipeline().storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.as_pipeline().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.as_pipeline().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.as_pipeline().s3_endpoint.as_deref()
    }

    pub fn aws_region(&self) -> Option<&str> {
        self.as_pipeline().aws_region.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.as_pipeline().local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.as_pipeline().local_storage_base_url.as_deref()
    }

    pub fn max_file_size_bytes(&self) -> usize {
        self.as_pipeline().max_file_size_bytes
    }

    pub fn max_files_per_request(&self) -> usize {
        self.as_pipeline().max_files_per_request
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.as_pipeline().allowed_extensions
    }

    pub fn allowed_content_types(&self) -> &[String] {
        &self.as_pipeline().allowed_content_types
    }

    pub fn presign_ttl_secs(&self) -> u64 {
        self.as_pipeline().presign_ttl_secs
    }

    pub fn queue_name(&self) -> &str {
        &self.as_pipeline().queue_name
    }

    pub fn worker_enabled(&self) -> bool {
        self.as_pipeline().worker_enabled
    }

    pub fn worker_max_concurrency(&self) -> usize {
        self.as_pipeline().worker_max_concurrency
    }

    pub fn worker_poll_interval_ms(&self) -> u64 {
        self.as_pipeline().worker_poll_interval_ms
    }

    pub fn job_visibility_timeout_secs(&self) -> u64 {
        self.as_pipeline().job_visibility_timeout_secs
    }

    pub fn job_max_attempts(&self) -> i32 {
        self.as_pipeline().job_max_attempts
    }

    pub fn job_reap_interval_secs(&self) -> u64 {
        self.as_pipeline().job_reap_interval_secs
    }

    pub fn rendition_jpeg_quality(&self) -> u8 {
        self.as_pipeline().rendition_jpeg_quality
    }
}

fn is_production_name(environment: &str) -> bool {
    let env = environment.to_lowercase();
    env == "production" || env == "prod"
}

impl ImagePipelineConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        if is_production_name(&environment) && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let base = BaseConfig {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: parse_or("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            environment,
            http_concurrency_limit: parse_or("HTTP_CONCURRENCY_LIMIT", HTTP_CONCURRENCY_LIMIT),
        };

        let storage_backend = match non_empty("STORAGE_BACKEND") {
            Some(value) => Some(value.parse::<StorageBackend>()?),
            None => None,
        };

        let max_file_size_mb = parse_or("MAX_FILE_SIZE_MB", MAX_FILE_SIZE_MB);

        let config = ImagePipelineConfig {
            base,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            storage_backend,
            s3_bucket: non_empty("S3_BUCKET"),
            s3_region: non_empty("S3_REGION"),
            s3_endpoint: non_empty("S3_ENDPOINT"),
            aws_region: non_empty("AWS_REGION"),
            local_storage_path: non_empty("LOCAL_STORAGE_PATH"),
            local_storage_base_url: non_empty("LOCAL_STORAGE_BASE_URL"),
            max_file_size_bytes: max_file_size_mb * 1024 * 1024,
            max_files_per_request: parse_or("MAX_FILES_PER_REQUEST", MAX_FILES_PER_REQUEST),
            allowed_extensions: split_list(
                &env::var("ALLOWED_EXTENSIONS")
                    .unwrap_or_else(|_| DEFAULT_ALLOWED_EXTENSIONS.to_string()),
            ),
            allowed_content_types: split_list(
                &env::var("ALLOWED_CONTENT_TYPES")
                    .unwrap_or_else(|_| DEFAULT_ALLOWED_CONTENT_TYPES.to_string()),
            ),
            presign_ttl_secs: parse_or("PRESIGN_TTL_SECS", PRESIGN_TTL_SECS),
            queue_name: non_empty("QUEUE_NAME").unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string()),
            worker_enabled: env::var("WORKER_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(true),
            worker_max_concurrency: parse_or("WORKER_MAX_CONCURRENCY", WORKER_MAX_CONCURRENCY),
            worker_poll_interval_ms: parse_or("WORKER_POLL_INTERVAL_MS", WORKER_POLL_INTERVAL_MS),
            job_visibility_timeout_secs: parse_or(
                "JOB_VISIBILITY_TIMEOUT_SECS",
                JOB_VISIBILITY_TIMEOUT_SECS,
            ),
            job_max_attempts: parse_or("JOB_MAX_ATTEMPTS", JOB_MAX_ATTEMPTS),
            job_reap_interval_secs: parse_or("JOB_REAP_INTERVAL_SECS", JOB_REAP_INTERVAL_SECS),
            rendition_jpeg_quality: parse_or("RENDITION_JPEG_QUALITY", RENDITION_JPEG_QUALITY),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgres://")
            && !self.database_url.starts_with("postgresql://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_MB must be greater than 0"));
        }

        if self.max_files_per_request == 0 {
            return Err(anyhow::anyhow!("MAX_FILES_PER_REQUEST must be greater than 0"));
        }

        if self.allowed_extensions.is_empty() || self.allowed_content_types.is_empty() {
            return Err(anyhow::anyhow!(
                "ALLOWED_EXTENSIONS and ALLOWED_CONTENT_TYPES must not be empty"
            ));
        }

        if self.queue_name.trim().is_empty() {
            return Err(anyhow::anyhow!("QUEUE_NAME must not be empty"));
        }

        if self.worker_max_concurrency == 0 {
            return Err(anyhow::anyhow!(
                "WORKER_MAX_CONCURRENCY must be greater than 0"
            ));
        }

        if self.job_visibility_timeout_secs < 3 {
            return Err(anyhow::anyhow!(
                "JOB_VISIBILITY_TIMEOUT_SECS must be at least 3 seconds"
            ));
        }

        if self.job_max_attempts < 1 {
            return Err(anyhow::anyhow!("JOB_MAX_ATTEMPTS must be at least 1"));
        }

        if !(1..=100).contains(&self.rendition_jpeg_quality) {
            return Err(anyhow::anyhow!(
                "RENDITION_JPEG_QUALITY must be between 1 and 100"
            ));
        }

        let backend = self.storage_backend.unwrap_or(StorageBackend::S3);
        match backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
            StorageBackend::Memory => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> ImagePipelineConfig {
        ImagePipelineConfig {
            database_url: "postgres://localhost/pawprint".to_string(),
            storage_backend: Some(StorageBackend::Memory),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::new(memory_config());
        assert_eq!(config.server_port(), 3000);
        assert_eq!(config.http_concurrency_limit(), 10_000);
        assert_eq!(config.max_file_size_bytes(), 3 * 1024 * 1024);
        assert_eq!(config.max_files_per_request(), 10);
        assert_eq!(config.allowed_extensions(), ["jpeg", "jpg", "png", "gif"]);
        assert_eq!(config.queue_name(), "imageQueue");
        assert_eq!(config.job_max_attempts(), 5);
        assert_eq!(config.rendition_jpeg_quality(), 85);
        assert!(config.worker_enabled());
        assert!(!config.is_production());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn s3_requires_bucket_and_region() {
        let mut config = memory_config();
        config.storage_backend = Some(StorageBackend::S3);
        assert!(config.validate().is_err());

        config.s3_bucket = Some("pets".to_string());
        assert!(config.validate().is_err());

        config.aws_region = Some("eu-west-1".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_non_postgres_url() {
        let config = ImagePipelineConfig {
            database_url: "mysql://localhost/db".to_string(),
            ..memory_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_limits() {
        let config = ImagePipelineConfig {
            worker_max_concurrency: 0,
            ..memory_config()
        };
        assert!(config.validate().is_err());

        let config = ImagePipelineConfig {
            rendition_jpeg_quality: 0,
            ..memory_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn list_parsing_trims_and_lowercases() {
        assert_eq!(split_list(" JPG, png ,,gif"), vec!["jpg", "png", "gif"]);
    }

    #[test]
    fn production_name_and_concurrency_floor() {
        let mut config = memory_config();
        config.base.environment = "Prod".to_string();
        config.base.http_concurrency_limit = 0;
        let config = Config::new(config);

        assert!(config.is_production());
        assert_eq!(config.http_concurrency_limit(), 1);
    }
}

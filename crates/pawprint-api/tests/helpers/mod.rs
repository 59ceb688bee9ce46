//! Test app over in-memory storage, queue and record stores.

#![allow(dead_code)]

use axum_test::multipart::Part;
use axum_test::TestServer;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;

use pawprint_api::{setup_routes, AppState};
use pawprint_core::{Config, ImagePipelineConfig};
use pawprint_db::{MemoryJobQueue, MemoryOwnerRecords, OwnerRegistry};
use pawprint_storage::MemoryStorage;

pub const MAX_FILES: usize = 2;

pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub storage: MemoryStorage,
    pub queue: Arc<MemoryJobQueue>,
    pub users: MemoryOwnerRecords,
    pub dogs: MemoryOwnerRecords,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

/// App with user `u1` and dog `d1`.
pub async fn setup_test_app() -> TestApp {
    let config = Config::new(ImagePipelineConfig {
        max_files_per_request: MAX_FILES,
        ..Default::default()
    });

    let storage = MemoryStorage::new();
    let queue = Arc::new(MemoryJobQueue::new(
        config.queue_name(),
        config.job_max_attempts(),
    ));
    let (owners, users, dogs) = OwnerRegistry::memory();
    users.insert("u1").await;
    dogs.insert("d1").await;

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::new(storage.clone()),
        queue.clone(),
        owners,
        None,
    ));

    let app = setup_routes(&config, state.clone()).expect("Failed to setup routes");
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        state,
        storage,
        queue,
        users,
        dogs,
    }
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Jpeg)
        .expect("Failed to encode test jpeg");
    out.into_inner()
}

pub fn file_part(data: Vec<u8>, filename: &str, mime: &str) -> Part {
    Part::bytes(bytes::Bytes::from(data))
        .file_name(filename.to_string())
        .mime_type(mime.to_string())
}

pub fn jpeg_part(filename: &str) -> Part {
    file_part(jpeg_bytes(64, 48), filename, "image/jpeg")
}

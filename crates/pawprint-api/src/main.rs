use pawprint_api::setup::{initialize_app, start_server, start_worker};
use pawprint_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    let (state, router) = initialize_app(config.clone()).await?;

    let worker = config.worker_enabled().then(|| start_worker(&state));
    if worker.is_none() {
        tracing::info!("Embedded worker disabled, run image-worker to process uploads");
    }

    let served = start_server(&config, router).await;

    if let Some(worker) = worker {
        worker.shutdown().await;
    }

    served
}

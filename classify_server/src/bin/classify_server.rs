//! Classify server binary.
//!
use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use classify_server::{
    config::Config,
    endpoints::router,
    loader::{load_model, LoaderConfig},
    meter::{spawn_meter_logger, Meter},
    sensors::camera_provider,
    session::{AppSession, CaptureSettings},
};
use env_logger::TimestampPrecision;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let meter = Arc::new(Meter::new());
    let session = Arc::new(AppSession::new(
        camera_provider(&config.camera),
        CaptureSettings::from(&config),
        Arc::clone(&meter),
    ));

    // Load the model once in the background, the page shows a loading state meanwhile
    {
        let session = Arc::clone(&session);
        let loader_config = LoaderConfig::from(&config);
        tokio::spawn(async move {
            let result = load_model(&loader_config).await;
            session.install_model(result);
        });
    }

    spawn_meter_logger(meter, Duration::from_secs(config.meter_interval_secs));

    // Build HTTP server with endpoints
    let app = router(Arc::clone(&session), config.max_upload_bytes);

    // On shutdown, stop the webcam first so that open frame streams end
    let shutdown_signal = {
        let session = Arc::clone(&session);
        async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {err}");
                std::future::pending::<()>().await;
            }
            log::info!("Shutting down");
            session.shutdown().await;
        }
    };

    // Serve HTTP server
    let addr: SocketAddr = config.server_address.parse()?;
    log::info!("Serving on http://{addr}");
    let served = axum::Server::try_bind(&addr)?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await;

    // Release the camera in any case
    session.shutdown().await;
    served?;

    Ok(())
}

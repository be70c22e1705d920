//! Request guard service
//!
//! Loads configuration, installs logging and the Prometheus recorder, starts
//! the background purge of expired client state and serves the guarded API.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use log::{debug, info, warn};
use metrics_exporter_prometheus::PrometheusBuilder;

use request_guard::api::{self, ApiState};
use request_guard::config;
use request_guard::core::RequestGuard;
use request_guard::utils::now_millis;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    info!("Starting request guard...");

    let config = config::load_config().context("Failed to load configuration")?;
    let config = Arc::new(config);

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Prometheus recorder not installed, /metrics disabled: {}", e);
            None
        }
    };

    let guard = Arc::new(RequestGuard::new(config.guard.clone()));
    spawn_cleanup(guard.clone(), config.guard.cleanup_interval_seconds);

    let state = web::Data::new(ApiState {
        guard,
        config: config.clone(),
        metrics,
    });

    info!(
        "Listening on {}:{}",
        config.server.host, config.server.port
    );
    HttpServer::new(move || App::new().app_data(state.clone()).configure(api::config))
        .bind((config.server.host.as_str(), config.server.port))
        .context("Failed to bind server address")?
        .run()
        .await?;

    Ok(())
}

/// Periodically drop expired rate windows and violation entries
fn spawn_cleanup(guard: Arc<RequestGuard>, interval_seconds: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            let stats = guard.purge_expired(now_millis());
            if stats.rate_windows + stats.violations > 0 {
                info!(
                    "Purged {} rate windows and {} violation entries",
                    stats.rate_windows, stats.violations
                );
            } else {
                debug!("Cleanup found nothing to purge");
            }
        }
    });
}

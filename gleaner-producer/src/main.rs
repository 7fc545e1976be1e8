//! Gleaner Producer binary
//!
//! Wires the HTTP repositories, the default HTTP worker, the engine and the
//! two scheduler loops, then runs until Ctrl-C or SIGTERM.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gleaner_client::{CoordinatorClient, DestinationClient};
use gleaner_producer::config::Config;
use gleaner_producer::engine::{COLLECT_JOB_TIMEOUT, Engine};
use gleaner_producer::repository::{
    CoordinatorRepository, HttpCoordinatorRepository, HttpDestinationRepository,
};
use gleaner_producer::scheduler::{ConfigurationWatcher, JobPoller};
use gleaner_producer::service::DestinationRouter;
use gleaner_producer::shutdown::install_shutdown_handler;
use gleaner_producer::worker::HttpWorker;

/// How long the in-flight job may take to report after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gleaner_producer=info,gleaner_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Gleaner Producer");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;
    info!(
        "Loaded configuration: global_id={}, serial_id={}, type={}, base_url={}",
        config.global_id, config.serial_id, config.producer_type, config.base_url
    );

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let mut client =
        CoordinatorClient::with_client(config.base_url.clone(), config.global_id.clone(), http.clone())
            .with_serial_id(config.serial_id.clone());
    if let Some(key) = &config.security_key {
        client = client.with_security_key(key.clone());
    }

    let coordinator: Arc<dyn CoordinatorRepository> = Arc::new(HttpCoordinatorRepository::new(
        client,
        config.producer_type.clone(),
    ));
    let destinations = Arc::new(HttpDestinationRepository::new(DestinationClient::with_client(
        http.clone(),
    )));
    let router = DestinationRouter::new(destinations, Arc::clone(&coordinator));
    let worker = Arc::new(HttpWorker::new(http));

    let engine = Engine::new(Arc::clone(&coordinator), worker, router);
    let poller = Arc::new(JobPoller::new(engine.clone()));
    let watcher = Arc::new(ConfigurationWatcher::new(
        coordinator,
        engine.clone(),
        Arc::clone(&poller),
        config.producer_type.clone(),
    ));

    info!("Producer initialized, job deadline {:?}", COLLECT_JOB_TIMEOUT);

    let shutdown = install_shutdown_handler();
    watcher.start().await;
    if let Some(issue) = watcher.last_issue().await {
        warn!("Coordinator not ready: {}", issue);
    }

    shutdown.cancelled().await;

    info!("Stopping producer");
    watcher.stop().await;
    engine.stop().await;

    if engine.wait_idle(SHUTDOWN_GRACE).await {
        info!("Producer stopped after {} job(s)", engine.ran_jobs());
    } else {
        let current = engine.current_job_id().await;
        warn!(
            job_id = ?current,
            "In-flight job did not finish reporting within {:?}",
            SHUTDOWN_GRACE
        );
    }

    Ok(())
}

use std::error::Error;
use std::sync::Arc;

use campus::pricing::CampusPricing;
use campus::rule_based_recommender::CampusAdvisor;
use campus::seed::seed_catalog;
use delivery::clock::{Clock, SystemClock};
use delivery::executable_utils::{
    AppState, build_storage, initialize_executable, initialize_tracing, install_metrics_recorder,
    run_backend,
};
use delivery::mailer::mailer_from_config;
use delivery::service::{DeliveryService, ServiceSettings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("Starting backend...");
    let config = initialize_executable()?;
    initialize_tracing(&config.backend.log_level);
    let metrics = install_metrics_recorder()?;

    let storage = build_storage(&config).await?;
    let mailer = mailer_from_config(&config.mailer)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    if config.backend.seed_catalog {
        seed_catalog(storage.as_ref(), clock.now()).await?;
    }

    let service = Arc::new(DeliveryService::new(
        storage,
        mailer,
        clock,
        ServiceSettings::from_config(&config),
    ));
    let state = AppState::new(
        service,
        Arc::new(CampusPricing),
        Arc::new(CampusAdvisor::new()),
    )
    .with_metrics(metrics);

    run_backend(config.backend, state).await
}

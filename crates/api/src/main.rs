use std::sync::Arc;

use vendia_api::app::{build_app, services};
use vendia_api::config::Config;
use vendia_infra::billing::{spawn_sweep_timer, InvoiceWorker, WebhookNotifier};

#[tokio::main]
async fn main() {
    vendia_observability::init();

    let config = Config::from_env();

    let app_services = services::build_services(&config)
        .await
        .expect("failed to build services");
    let authority = services::build_authority(&config).expect("failed to build authority client");

    let worker = Arc::new(
        InvoiceWorker::new(
            app_services.store.clone(),
            app_services.jobs.clone(),
            authority,
            config.establishment.clone(),
        )
        .with_retry(config.retry)
        .with_webhook(WebhookNotifier::new(config.webhook_url.clone()))
        .with_sweep_threshold(config.sweep_threshold),
    );
    worker.spawn(config.worker_poll);
    spawn_sweep_timer(app_services.jobs.clone(), config.sweep_interval);

    let app = build_app(Arc::new(app_services));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", config.listen_addr));

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}

//! Service wiring: pick the storage backends and the authority client from
//! configuration.

use std::sync::Arc;

use anyhow::Context;

use vendia_billing::TaxAuthority;
use vendia_infra::billing::{HttpTaxAuthority, MockAuthority};
use vendia_infra::jobs::{InMemoryJobStore, JobStore, PostgresJobStore};
use vendia_infra::store::{InMemoryPosStore, PosStore, PostgresPosStore};

use crate::config::Config;

/// Shared handles the route handlers need.
#[derive(Clone)]
pub struct AppServices {
    pub store: Arc<dyn PosStore>,
    pub jobs: Arc<dyn JobStore>,
}

impl AppServices {
    /// In-memory everything; used by tests and the dev default.
    pub fn in_memory() -> Self {
        Self {
            store: InMemoryPosStore::arc(),
            jobs: InMemoryJobStore::arc(),
        }
    }
}

/// Build the stores per `USE_PERSISTENT_STORES`, running migrations when
/// Postgres is selected.
pub async fn build_services(config: &Config) -> anyhow::Result<AppServices> {
    if !config.use_persistent_stores {
        tracing::info!("using in-memory stores");
        return Ok(AppServices::in_memory());
    }

    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("persistent stores requested but DATABASE_URL missing; using in-memory");
        return Ok(AppServices::in_memory());
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("connecting to postgres")?;

    let store = PostgresPosStore::new(pool.clone());
    store.migrate().await.context("running migrations")?;
    tracing::info!("using postgres stores");

    Ok(AppServices {
        store: Arc::new(store),
        jobs: Arc::new(PostgresJobStore::new(pool)),
    })
}

/// The authority client: HTTP when an endpoint is configured, otherwise the
/// in-process mock (dev only; it authorizes everything).
pub fn build_authority(config: &Config) -> anyhow::Result<Arc<dyn TaxAuthority>> {
    match config.sri_endpoint.as_deref() {
        Some(endpoint) => {
            let client = HttpTaxAuthority::new(endpoint, config.sri_timeout)
                .context("building authority client")?;
            Ok(Arc::new(client))
        }
        None => Ok(Arc::new(MockAuthority::new())),
    }
}

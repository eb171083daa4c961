pub(crate) mod backfill;
pub(crate) mod meta;
pub(crate) mod migrate;
pub(crate) mod resolve;
pub(crate) mod sync;
pub(crate) mod watch;

use std::sync::Arc;
use std::time::Duration;

use packmule::db::DatabaseConnection;
use packmule::http::HttpTransport;
use packmule::http::reqwest_transport::ReqwestTransport;
use packmule::index::{MemoryIndex, SearchIndex, TypesenseIndex};
use packmule::limit::ApiRateLimiter;
use packmule::notify::{DeliveryWorker, Dispatcher, LogEmailSender};
use packmule::registry::RegistryClient;
use packmule::sync::{JobQueue, MemoryQueue, SyncHandler};

use crate::config::Config;

/// Per-request HTTP timeout for registry and index calls.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared wiring for commands that run the pipeline.
pub(crate) struct AppContext {
    pub db: DatabaseConnection,
    pub transport: Arc<dyn HttpTransport>,
    pub client: Arc<RegistryClient>,
    pub index: Arc<dyn SearchIndex>,
    pub queue: Arc<MemoryQueue>,
}

impl AppContext {
    pub(crate) async fn build(
        config: &Config,
        database_url: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let db = packmule::db::connect(database_url).await?;

        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::with_timeout(HTTP_TIMEOUT)?);

        let client = Arc::new(
            RegistryClient::new(Arc::clone(&transport), &config.registry.url)
                .with_feed_url(&config.registry.feed_url),
        );

        let index: Arc<dyn SearchIndex> = match &config.index.url {
            Some(url) => Arc::new(TypesenseIndex::new(
                Arc::clone(&transport),
                url,
                config.index.api_key.clone().unwrap_or_default(),
                &config.index.collection,
            )),
            None => {
                tracing::warn!(
                    "No search index configured; using an in-memory index \
                     (nothing is persisted — configure [index] for real runs)"
                );
                Arc::new(MemoryIndex::new())
            }
        };

        Ok(Self {
            db,
            transport,
            client,
            index,
            queue: Arc::new(MemoryQueue::new()),
        })
    }

    /// The package sync handler wired with dispatch and pacing.
    pub(crate) fn sync_handler(&self, config: &Config) -> SyncHandler {
        SyncHandler::new(Arc::clone(&self.client), Arc::clone(&self.index))
            .with_rate_limiter(ApiRateLimiter::new(config.registry.rps))
            .with_dispatcher(Arc::new(Dispatcher::new(
                self.db.clone(),
                Arc::clone(&self.queue) as Arc<dyn JobQueue>,
            )))
    }

    /// The delivery worker for chat/email jobs.
    pub(crate) fn delivery_worker(&self) -> Arc<DeliveryWorker> {
        Arc::new(DeliveryWorker::new(
            self.db.clone(),
            Arc::clone(&self.transport),
            Arc::new(LogEmailSender),
        ))
    }
}

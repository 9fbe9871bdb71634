use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::{
    api,
    clients::arxiv::{ArxivClient, ArxivConfig, UpstreamClient},
    config::Config,
    observability::Telemetry,
    pipeline::{CategoryPlan, PipelineBuilder},
    scheduler::{Scheduler, cadence::IntervalCadence},
    store::{InMemoryPaperStore, PaperStore, PgPaperStore},
    util::retry::RetryConfig,
};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    scheduler: Scheduler,
    default_plan: CategoryPlan,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.registry.scheduler
    }

    pub(crate) fn config(&self) -> &Config {
        &self.registry.config
    }

    pub(crate) fn default_plan(&self) -> &CategoryPlan {
        &self.registry.default_plan
    }
}

impl ComponentRegistry {
    /// 設定から本番用のコンポーネントを組み立てる。
    ///
    /// `INGEST_DB_DSN` があれば PostgreSQL（スキーマを初期化）、なければプロセス内ストアを使う。
    ///
    /// # Errors
    /// テレメトリ初期化、HTTPクライアント構築、DB接続またはカテゴリ計画の構築に失敗した場合はエラーを返す。
    pub async fn build(config: Config) -> Result<Self> {
        let telemetry = Telemetry::new()?;
        let client = Arc::new(
            ArxivClient::new(ArxivConfig {
                base_url: config.arxiv_base_url().to_string(),
                user_agent: config.arxiv_user_agent().to_string(),
                connect_timeout: config.arxiv_connect_timeout(),
                total_timeout: config.arxiv_total_timeout(),
            })
            .context("failed to build arXiv client")?,
        );

        let store: Arc<dyn PaperStore> = match config.db_dsn() {
            Some(dsn) => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.db_max_connections())
                    .min_connections(config.db_min_connections())
                    .acquire_timeout(config.db_acquire_timeout())
                    .test_before_acquire(true)
                    .connect_lazy(dsn)
                    .context("failed to configure papers connection pool")?;
                let store = PgPaperStore::new(pool);
                store
                    .ensure_schema()
                    .await
                    .context("failed to bootstrap papers schema")?;
                info!("using PostgreSQL paper store");
                Arc::new(store)
            }
            None => {
                info!("INGEST_DB_DSN not set; using in-process paper store");
                Arc::new(InMemoryPaperStore::new())
            }
        };

        Self::from_parts(config, telemetry, client, store)
    }

    /// Wires the registry around an already-built upstream and store.
    ///
    /// # Errors
    /// 設定されたカテゴリが不正な場合はエラーを返す。
    pub fn from_parts(
        config: Config,
        telemetry: Telemetry,
        client: Arc<dyn UpstreamClient>,
        store: Arc<dyn PaperStore>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let metrics = telemetry.metrics_handle();

        let default_plan =
            CategoryPlan::from_categories(config.categories(), config.page_size(), config.max_pages())
                .context("invalid INGEST_CATEGORIES")?
                .with_sort(config.sort_key(), config.sort_order());

        let pipeline = PipelineBuilder::new(Arc::clone(&metrics))
            .politeness_interval(config.politeness_interval())
            .commit_chunk_size(config.commit_chunk_size())
            .build(client, Arc::clone(&store));

        let cadence = IntervalCadence::new(
            config.startup_delay(),
            config.interval(),
            RetryConfig::new(config.failure_backoff_base(), config.failure_backoff_cap()),
        );
        let scheduler = Scheduler::new(
            Arc::new(pipeline),
            store,
            cadence,
            config.run_history(),
            metrics,
        );

        Ok(Self {
            config,
            telemetry,
            scheduler,
            default_plan,
        })
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// 定期実行で使うカテゴリ計画。
    #[must_use]
    pub fn default_plan(&self) -> &CategoryPlan {
        &self.default_plan
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}

use std::sync::Arc;

use anyhow::Context;
use axum::{Router, routing::get};
use camino::Utf8PathBuf;
use diesel_async::{
    AsyncPgConnection,
    async_connection_wrapper::AsyncConnectionWrapper,
    pooled_connection::{AsyncDieselConnectionManager, deadpool::Pool},
};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tokio::{net::TcpListener, signal, sync::Mutex};
use tower_http::trace::TraceLayer;
use util::DevContainer;
use uuid::Uuid;

use crate::{config::Config, db};

mod api;
pub mod auth;
pub mod util;

/// # Errors
pub async fn serve(mut config: Config, log_dir: Option<Utf8PathBuf>) -> anyhow::Result<()> {
    initialize_logging(log_dir);

    config
        .read_secrets()
        .context("failed to read secrets directory")?;
    let app_addr = config.app_address();

    let app_state = AppState::new(config)
        .await
        .context("failed to initialize app state")?;
    tracing::info!("initialized app state");

    let db_conn = app_state
        .db_conn()
        .await
        .context("failed to connect to database")?;

    run_migrations(db_conn)
        .await
        .context("failed to run database migrations")?;
    tracing::info!("ran database migrations");

    app_state
        .write_seed_data()
        .await
        .context("failed to insert seed data")?;
    tracing::info!("inserted seed data");

    let app = app(app_state.clone());

    let listener = TcpListener::bind(&app_addr)
        .await
        .context(format!("failed to listen on {app_addr}"))?;
    tracing::info!("cryobank listening on {app_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(app_state))
        .await
        .context("failed to serve app")?;

    Ok(())
}

fn initialize_logging(log_dir: Option<Utf8PathBuf>) {
    use tracing::Level;
    use tracing_subscriber::{filter::Targets, prelude::*};

    let log_layer = tracing_subscriber::fmt::layer();

    match log_dir {
        None => {
            let dev_test_log_filter = Targets::new()
                .with_target("cryobank_backend", Level::DEBUG)
                .with_target("tower_http", Level::TRACE);
            let log_layer = log_layer.pretty().with_filter(dev_test_log_filter);

            tracing_subscriber::registry().with(log_layer).init();
        }
        Some(path) => {
            let log_writer = tracing_appender::rolling::daily(path, "cryobank.log");
            let prod_log_filter = Targets::new().with_target("cryobank_backend", Level::INFO);
            let log_layer = log_layer
                .json()
                .with_writer(log_writer)
                .with_filter(prod_log_filter);

            tracing_subscriber::registry().with(log_layer).init();
        }
    }
}

#[derive(Clone)]
pub(crate) enum AppState {
    Dev {
        db_pool: Pool<AsyncPgConnection>,
        _pg_container: Arc<DevContainer>,
        user_id: Uuid,
        config: Arc<Mutex<Config>>,
    },
    Prod {
        db_pool: Pool<AsyncPgConnection>,
        config: Arc<Mutex<Config>>,
    },
}

impl AppState {
    async fn new(config: Config) -> anyhow::Result<Self> {
        let state = if config.is_dev() {
            let pg_container = DevContainer::new("cryobank-dev", false)
                .await
                .context("failed to start postgres container instance")?;
            let db_url = pg_container.db_url().await?;

            let db_config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(db_url);
            let db_pool = Pool::builder(db_config).build()?;

            Self::Dev {
                db_pool,
                _pg_container: Arc::new(pg_container),
                user_id: Uuid::now_v7(),
                config: Arc::new(Mutex::new(config)),
            }
        } else {
            let db_config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(config.db_url());
            let db_pool = Pool::builder(db_config).build()?;

            Self::Prod {
                db_pool,
                config: Arc::new(Mutex::new(config)),
            }
        };

        Ok(state)
    }

    pub(crate) async fn db_conn(
        &self,
    ) -> db::error::Result<diesel_async::pooled_connection::deadpool::Object<AsyncPgConnection>>
    {
        use AppState::{Dev, Prod};

        match self {
            Dev { db_pool, .. } | Prod { db_pool, .. } => Ok(db_pool.get().await?),
        }
    }

    pub(crate) async fn assets_dir(&self) -> Utf8PathBuf {
        use AppState::{Dev, Prod};

        match self {
            Dev { config, .. } | Prod { config, .. } => config.lock().await.assets_dir().clone(),
        }
    }

    async fn write_seed_data(&self) -> anyhow::Result<()> {
        use AppState::{Dev, Prod};

        let mut db_conn = self.db_conn().await?;

        let (config, dev_user_id) = match self {
            Dev {
                config, user_id, ..
            } => (config, Some(*user_id)),
            Prod { config, .. } => (config, None),
        };

        let config = config.lock().await;
        let seed_data = config.seed_data()?;

        seed_data.write(dev_user_id, &mut db_conn).await
    }
}

async fn run_migrations(
    db_conn: diesel_async::pooled_connection::deadpool::Object<AsyncPgConnection>,
) -> anyhow::Result<()> {
    const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

    let mut wrapper: AsyncConnectionWrapper<
        diesel_async::pooled_connection::deadpool::Object<AsyncPgConnection>,
    > = AsyncConnectionWrapper::from(db_conn);

    tokio::task::spawn_blocking(move || {
        wrapper.run_pending_migrations(MIGRATIONS).unwrap();
    })
    .await?;

    Ok(())
}

fn app(app_state: AppState) -> Router {
    Router::new()
        .nest("/api", api::router())
        .layer(TraceLayer::new_for_http())
        .route("/health", get(async || ()))
        .with_state(app_state)
}

async fn shutdown_signal(app_state: AppState) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        () = ctrl_c => {drop(app_state);},
        () = terminate => {drop(app_state)},
    }
}

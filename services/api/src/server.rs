use crate::cli::ServeArgs;
use crate::infra::{load_catalog, AppState};
use crate::routes::with_progression_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use badge_engine::config::{AppConfig, StoreBackend};
use badge_engine::error::AppError;
use badge_engine::progression::{
    BadgeCatalog, BadgeStore, LocalFileStore, MemoryBadgeStore, ReconcilerOptions,
    SessionRegistry,
};
use badge_engine::telemetry;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let catalog = Arc::new(load_catalog(config.engine.catalog_path.as_deref())?);
    let options = ReconcilerOptions {
        max_ghost_passes: config.engine.max_ghost_passes,
    };
    let addr = config.server.socket_addr()?;
    info!(
        ?config.environment,
        badges = catalog.len(),
        store = ?config.engine.store,
        "badge progression engine configured"
    );

    let idle = config.engine.session_idle;
    match config.engine.store {
        StoreBackend::Memory => {
            let store = Arc::new(MemoryBadgeStore::new());
            serve_with(addr, catalog, store, options, idle).await
        }
        StoreBackend::LocalFile(path) => {
            let store = Arc::new(LocalFileStore::new(path));
            serve_with(addr, catalog, store, options, idle).await
        }
    }
}

async fn serve_with<S>(
    addr: SocketAddr,
    catalog: Arc<BadgeCatalog>,
    store: Arc<S>,
    options: ReconcilerOptions,
    session_idle: Duration,
) -> Result<(), AppError>
where
    S: BadgeStore + 'static,
{
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let registry = Arc::new(SessionRegistry::new(catalog, store, options));
    spawn_session_sweep(Arc::clone(&registry), session_idle);
    let app = with_progression_routes(registry)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(%addr, "badge progression service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Evicts idle sessions for as long as the server runs. The sweep period is half
/// the idle window, so a session lingers at most 1.5 windows.
fn spawn_session_sweep<S>(registry: Arc<SessionRegistry<S>>, idle: Duration)
where
    S: BadgeStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval((idle / 2).max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            registry.evict_idle(idle).await;
        }
    });
}

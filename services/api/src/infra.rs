use badge_engine::error::AppError;
use badge_engine::progression::BadgeCatalog;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Catalog from `path` when given, otherwise the built-in sample.
pub(crate) fn load_catalog(path: Option<&Path>) -> Result<BadgeCatalog, AppError> {
    let catalog = match path {
        Some(path) => BadgeCatalog::from_path(path)?,
        None => {
            info!("no catalog path configured; using the built-in sample catalog");
            BadgeCatalog::sample()?
        }
    };
    Ok(catalog)
}

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use dataseries::catalog::Catalog;
use dataseries::server::{serve, AppState};
use dataseries::settings::Settings;
use dataseries::store::{PersistenceMode, Store};

const DEFAULT_SETTINGS: &str = "settings.yml";

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("DATASERIES_SETTINGS").ok())
        .unwrap_or_else(|| DEFAULT_SETTINGS.to_string());
    info!(settings = %path, "dataseries starting");

    if let Err(e) = run(&path).await {
        error!(error = %e, "dataseries stopped");
        std::process::exit(1);
    }
}

async fn run(path: &str) -> dataseries::Result<()> {
    let settings = Settings::load(path)?;
    let store = Store::new(PersistenceMode::from(settings.database.path.clone()))?;
    let catalog = Catalog::load(&settings, &store)?;
    info!(series = catalog.series_names().len(), "catalog loaded");
    let state = Arc::new(AppState::new(catalog, store));
    serve(state, &settings.server.bind).await
}

use chunk_ingest::api::{start_api_server, AppState};
use chunk_ingest::collaborators;
use chunk_ingest::config::ApiConfig;
use chunk_ingest::monitoring::{self, MonitoringConfig};
use std::time::Instant;
use tracing::{error, info};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let started = Instant::now();
    dotenvy::dotenv().ok();

    let monitoring_config = MonitoringConfig::from_env();
    // Dropping the guard loses buffered file logs
    let _log_guard = monitoring::init_tracing(&monitoring_config).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("failed to initialize logging: {e}"),
        )
    })?;

    let config = ApiConfig::from_env().map_err(|e| {
        error!(error = %e, "invalid configuration");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    monitoring::metrics::init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = env!("GIT_SHA"),
        chunk_size = config.chunk_params.size(),
        chunk_overlap = config.chunk_params.overlap(),
        chunk_unit = %config.chunk_params.unit(),
        echo_text = config.echo_text,
        max_upload_bytes = config.max_upload_bytes,
        "starting chunk-ingest"
    );

    let (extractor, risk) = collaborators::from_config(&config);
    let state = AppState::new(&config, extractor, risk);

    let server = start_api_server(&config, state)?;
    info!(
        startup_ms = started.elapsed().as_millis() as u64,
        "server ready"
    );
    server.await
}

pub mod ingest_routes;
pub mod risk_routes;
pub mod sys_routes;

use crate::chunker::ChunkParams;
use crate::collaborators::{Extractor, RiskAnalyzer};
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::monitoring::TraceMiddleware;
use crate::security::{ApiKeyGuard, RateLimitMiddleware, RateLimitOptions, RateLimiter};
use actix_cors::Cors;
use actix_web::{http::header, web, App, HttpMessage, HttpRequest, HttpResponse, HttpServer};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Shared, read-only state handed to every handler.
pub struct AppState {
    pub chunk_params: ChunkParams,
    pub echo_text: bool,
    pub max_upload_bytes: usize,
    pub extractor: Arc<dyn Extractor>,
    pub risk: Arc<dyn RiskAnalyzer>,
}

impl AppState {
    pub fn new(
        config: &ApiConfig,
        extractor: Arc<dyn Extractor>,
        risk: Arc<dyn RiskAnalyzer>,
    ) -> Self {
        Self {
            chunk_params: config.chunk_params,
            echo_text: config.echo_text,
            max_upload_bytes: config.max_upload_bytes,
            extractor,
            risk,
        }
    }
}

/// `{ "text": ... }` carried by JSON and urlencoded bodies
#[derive(Debug, Deserialize)]
pub(crate) struct TextInput {
    #[serde(default)]
    pub text: String,
}

/// How a request body is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyKind {
    Multipart,
    Json,
    Form,
    Text,
    Other,
}

impl BodyKind {
    pub(crate) fn of(req: &HttpRequest) -> Self {
        let ct = req.content_type();
        if ct.eq_ignore_ascii_case("multipart/form-data") {
            BodyKind::Multipart
        } else if ct.eq_ignore_ascii_case("application/json") {
            BodyKind::Json
        } else if ct.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
            BodyKind::Form
        } else if ct.len() >= 5 && ct[..5].eq_ignore_ascii_case("text/") {
            BodyKind::Text
        } else {
            BodyKind::Other
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            BodyKind::Multipart => "multipart",
            BodyKind::Json => "json",
            BodyKind::Form => "form",
            BodyKind::Text => "text",
            BodyKind::Other => "other",
        }
    }
}

/// Buffer the body, failing with `payload_too_large` past `limit` bytes.
pub(crate) async fn read_body(payload: web::Payload, limit: usize) -> Result<web::Bytes, ApiError> {
    match payload.to_bytes_limited(limit).await {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(ApiError::InvalidRequest(format!("failed to read body: {e}"))),
        Err(_) => Err(ApiError::PayloadTooLarge { limit }),
    }
}

/// Pull the `text` field out of a JSON or urlencoded body.
pub(crate) fn parse_text_input(kind: BodyKind, body: &[u8]) -> Result<String, ApiError> {
    match kind {
        BodyKind::Json => serde_json::from_slice::<TextInput>(body)
            .map(|input| input.text)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid JSON body: {e}"))),
        BodyKind::Form => {
            let body = std::str::from_utf8(body)
                .map_err(|e| ApiError::InvalidRequest(format!("invalid form body: {e}")))?;
            web::Query::<TextInput>::from_query(body)
                .map(|input| input.into_inner().text)
                .map_err(|e| ApiError::InvalidRequest(format!("invalid form body: {e}")))
        }
        BodyKind::Text => Ok(String::from_utf8_lossy(body).into_owned()),
        BodyKind::Multipart | BodyKind::Other if body.is_empty() => Ok(String::new()),
        BodyKind::Multipart | BodyKind::Other => Err(ApiError::InvalidRequest(
            "unsupported content type".to_string(),
        )),
    }
}

async fn method_not_allowed() -> Result<HttpResponse, ApiError> {
    Err(ApiError::MethodNotAllowed)
}

/// Register every route. Used by the server and by tests building an `App`
/// around fake collaborators.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/ingest")
            .route(web::post().to(ingest_routes::ingest))
            .default_service(web::to(method_not_allowed)),
    )
    .service(
        web::resource("/risk")
            .route(web::post().to(risk_routes::risk))
            .default_service(web::to(method_not_allowed)),
    )
    .route("/health", web::get().to(sys_routes::health))
    .route("/ping", web::get().to(sys_routes::ping))
    .route("/metrics", web::get().to(sys_routes::metrics))
    .service(
        web::scope("/monitoring")
            .route("/chunking/latest", web::get().to(sys_routes::chunking_latest))
            .route("/chunking/logging", web::get().to(sys_routes::chunking_logging))
            .route("/rate_limits", web::get().to(sys_routes::rate_limits)),
    );
}

pub fn start_api_server(
    config: &ApiConfig,
    state: AppState,
) -> std::io::Result<actix_web::dev::Server> {
    let bind_addr = config.bind_addr();
    let api_key = config.api_key.clone();
    let state = web::Data::new(state);

    // One limiter shared by all workers
    let limiter = web::Data::new(RateLimiter::new(config.into()));
    let opts = RateLimitOptions::from_config(config).with_env_overrides();

    info!(
        enabled = config.rate_limit_enabled,
        trust_proxy = opts.trust_proxy,
        qps = opts.qps,
        burst = opts.burst,
        rules = %serde_json::to_string(&opts.rules).unwrap_or_default(),
        exempt_prefixes = %serde_json::to_string(&opts.exempt_prefixes).unwrap_or_default(),
        "Rate limit options initialized"
    );
    if api_key.is_some() {
        info!("API key required for /ingest and /risk");
    }

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::HeaderName::from_static(crate::security::api_key::API_KEY_HEADER),
            ])
            .max_age(3600);

        // Registration order is inside-out: CORS answers preflight before the
        // key check, tracing sees every response.
        App::new()
            .app_data(state.clone())
            .app_data(limiter.clone())
            .wrap(ApiKeyGuard::new(api_key.clone()))
            .wrap(RateLimitMiddleware::new(
                limiter.clone().into_inner(),
                opts.clone(),
            ))
            .wrap(cors)
            .wrap(TraceMiddleware::new())
            .configure(configure)
    })
    .bind(&bind_addr)?
    .run();

    info!(addr = %bind_addr, "chunk-ingest listening");
    Ok(server)
}

use crate::monitoring::metrics::export_prometheus;
use crate::monitoring::{
    chunking_logging_enabled, chunking_snapshot_history, set_chunking_history_capacity,
    set_chunking_logging_enabled,
};
use crate::security::RateLimiter;
use actix_web::{web, Error, HttpResponse};
use serde::Deserialize;
use serde_json::json;

const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct ChunkingQuery {
    pub limit: Option<usize>,
    pub capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingQuery {
    pub enabled: Option<bool>,
}

pub async fn health() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().json(json!({ "status": "ok" })))
}

pub async fn ping() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("pong"))
}

/// Prometheus text exposition
pub async fn metrics() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4; charset=utf-8")
        .body(export_prometheus()))
}

/// GET /monitoring/chunking/latest?limit=N&capacity=M
///
/// `capacity` resizes the history instead of reading it.
pub async fn chunking_latest(query: web::Query<ChunkingQuery>) -> Result<HttpResponse, Error> {
    if let Some(new_cap) = query.capacity {
        let applied = set_chunking_history_capacity(new_cap);
        return Ok(HttpResponse::Ok().json(json!({
            "status": "ok",
            "capacity_applied": applied,
        })));
    }

    let history = chunking_snapshot_history(query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT));
    if history.is_empty() {
        return Ok(HttpResponse::Ok().json(json!({
            "status": "empty",
            "count": 0,
            "snapshots": [],
        })));
    }
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "count": history.len(),
        "snapshots": history,
    })))
}

/// GET /monitoring/chunking/logging?enabled=bool
pub async fn chunking_logging(query: web::Query<LoggingQuery>) -> Result<HttpResponse, Error> {
    if let Some(enabled) = query.enabled {
        set_chunking_logging_enabled(enabled);
    }
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "logging_enabled": chunking_logging_enabled(),
    })))
}

/// GET /monitoring/rate_limits
pub async fn rate_limits(limiter: Option<web::Data<RateLimiter>>) -> Result<HttpResponse, Error> {
    match limiter {
        Some(limiter) => {
            let cfg = limiter.config();
            Ok(HttpResponse::Ok().json(json!({
                "status": "ok",
                "state": limiter.snapshot(),
                "qps": cfg.qps,
                "burst": cfg.burst,
            })))
        }
        None => Ok(HttpResponse::Ok().json(json!({
            "status": "disabled",
        }))),
    }
}

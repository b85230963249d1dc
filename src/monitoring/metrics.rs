use once_cell::sync::Lazy;
use prometheus::core::Collector;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

// Global Prometheus registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn service_and_env() -> (String, String) {
    let service = std::env::var("APP_SERVICE")
        .ok()
        .unwrap_or_else(|| env!("APP_SERVICE_DEFAULT").to_string());
    let env_name = std::env::var("APP_ENV")
        .ok()
        .unwrap_or_else(|| env!("APP_ENV_DEFAULT").to_string());
    (service, env_name)
}

fn labelled(name: &str, help: &str) -> Opts {
    let (service, env_name) = service_and_env();
    Opts::new(name, help)
        .const_label("service", service)
        .const_label("env", env_name)
}

fn histogram_opts(name: &str, help: &str, buckets: Vec<f64>) -> HistogramOpts {
    let (service, env_name) = service_and_env();
    let mut opts = HistogramOpts::new(name, help).buckets(buckets);
    opts.common_opts = opts
        .common_opts
        .const_label("service", service)
        .const_label("env", env_name);
    opts
}

fn register<C: Collector + Clone + 'static>(collector: C) -> C {
    REGISTRY.register(Box::new(collector.clone())).ok();
    collector
}

#[doc(hidden)]
pub fn __test_parse_buckets_env(var: &str) -> Option<Vec<f64>> {
    parse_buckets_env(var)
}

/// Comma separated, strictly positive bucket bounds from `var`. Any bad
/// token discards the whole override.
fn parse_buckets_env(var: &str) -> Option<Vec<f64>> {
    match std::env::var(var) {
        Ok(val) if !val.trim().is_empty() => {
            let mut parsed: Vec<f64> = Vec::new();
            for tok in val.split(',') {
                let t = tok.trim();
                if t.is_empty() {
                    continue;
                }
                match t.parse::<f64>() {
                    Ok(v) if v > 0.0 && v.is_finite() => parsed.push(v),
                    _ => {
                        tracing::warn!(env_var = %var, token = %t, "Invalid histogram bucket value; ignoring");
                        return None;
                    }
                }
            }
            if parsed.is_empty() {
                None
            } else {
                parsed.sort_by(|a, b| a.total_cmp(b));
                parsed.dedup();
                Some(parsed)
            }
        }
        _ => None,
    }
}

// App info gauge (const)
pub static APP_INFO: Lazy<IntGauge> = Lazy::new(|| {
    let (service, env_name) = service_and_env();
    let g = IntGauge::with_opts(
        Opts::new("app_info", "Application info gauge")
            .const_label("app", &service)
            .const_label("service", &service)
            .const_label("env", &env_name)
            .const_label("version", env!("CARGO_PKG_VERSION"))
            .const_label("git_sha", env!("GIT_SHA"))
            .const_label("build_time", env!("BUILD_TIME")),
    )
    .expect("app_info gauge");
    register(g)
});

pub static REQUEST_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    let default = vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0];
    let buckets = parse_buckets_env("REQUEST_HISTO_BUCKETS").unwrap_or(default);
    let opts = histogram_opts(
        "request_latency_ms",
        "HTTP request latency in milliseconds",
        buckets,
    );
    let hv = HistogramVec::new(opts, &["method", "route", "status_class"])
        .expect("request_latency_ms histogram");
    register(hv)
});

// Ingest metrics
pub static INGEST_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let cv = IntCounterVec::new(
        labelled("ingest_requests_total", "Successful ingest requests by input source"),
        &["source"],
    )
    .expect("ingest_requests_total counter");
    register(cv)
});

// Every error response, from handlers and from the key and rate limit guards
pub static API_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let cv = IntCounterVec::new(
        labelled("api_errors_total", "Error responses by error code"),
        &["code"],
    )
    .expect("api_errors_total counter");
    register(cv)
});

pub static CHUNKS_EMITTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(labelled("chunks_emitted_total", "Total chunks returned"))
        .expect("chunks_emitted_total counter");
    register(c)
});

pub static CHUNKING_DURATION_MS: Lazy<Histogram> = Lazy::new(|| {
    let default = vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0];
    let buckets = parse_buckets_env("CHUNKING_HISTO_BUCKETS").unwrap_or(default);
    let h = Histogram::with_opts(histogram_opts(
        "chunking_duration_ms",
        "Time spent splitting text into chunks in milliseconds",
        buckets,
    ))
    .expect("chunking_duration_ms histogram");
    register(h)
});

pub static COLLABORATOR_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    let default = vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 60000.0];
    let buckets = parse_buckets_env("COLLABORATOR_HISTO_BUCKETS").unwrap_or(default);
    let opts = histogram_opts(
        "collaborator_duration_ms",
        "External extractor and risk analyzer run time in milliseconds",
        buckets,
    );
    let hv = HistogramVec::new(opts, &["collaborator", "outcome"])
        .expect("collaborator_duration_ms histogram");
    register(hv)
});

pub static RISK_REQUESTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(labelled("risk_requests_total", "Successful risk requests"))
        .expect("risk_requests_total counter");
    register(c)
});

pub static RATE_LIMIT_DROPS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(labelled(
        "rate_limit_drops_total",
        "Total requests dropped due to rate limit",
    ))
    .expect("rate_limit_drops_total counter");
    register(c)
});

pub static RATE_LIMIT_DROPS_BY_ROUTE: Lazy<IntCounterVec> = Lazy::new(|| {
    let cv = IntCounterVec::new(
        labelled(
            "rate_limit_drops_by_route_total",
            "Rate limit drops partitioned by route",
        ),
        &["route"],
    )
    .expect("rate_limit_drops_by_route_total counter");
    register(cv)
});

/// Touch the static collectors so they show up in the first scrape.
pub fn init() {
    APP_INFO.set(1);
    Lazy::force(&REQUEST_LATENCY_MS);
    Lazy::force(&INGEST_REQUESTS_TOTAL);
    Lazy::force(&API_ERRORS_TOTAL);
    Lazy::force(&CHUNKS_EMITTED_TOTAL);
    Lazy::force(&CHUNKING_DURATION_MS);
    Lazy::force(&COLLABORATOR_DURATION_MS);
    Lazy::force(&RISK_REQUESTS_TOTAL);
    Lazy::force(&RATE_LIMIT_DROPS_TOTAL);
    Lazy::force(&RATE_LIMIT_DROPS_BY_ROUTE);
}

pub fn record_ingest(source: &str, chunks: usize) {
    INGEST_REQUESTS_TOTAL.with_label_values(&[source]).inc();
    CHUNKS_EMITTED_TOTAL.inc_by(chunks as u64);
}

pub fn record_api_error(code: &str) {
    API_ERRORS_TOTAL.with_label_values(&[code]).inc();
}

pub fn observe_chunking_ms(duration_ms: f64) {
    CHUNKING_DURATION_MS.observe(duration_ms);
}

pub fn observe_collaborator(collaborator: &str, outcome: &str, duration_ms: f64) {
    COLLABORATOR_DURATION_MS
        .with_label_values(&[collaborator, outcome])
        .observe(duration_ms);
}

// Exporter for Prometheus text format
pub fn export_prometheus() -> String {
    let metric_families = REGISTRY.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_ok() {
        String::from_utf8(buffer).unwrap_or_default()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_contains_app_info() {
        init();
        let body = export_prometheus();
        assert!(body.contains("app_info"));
        assert!(body.contains("chunk") || body.contains("request_latency_ms"));
    }

    #[test]
    fn test_record_ingest_counts_chunks() {
        let before = CHUNKS_EMITTED_TOTAL.get();
        record_ingest("json", 3);
        assert!(CHUNKS_EMITTED_TOTAL.get() >= before + 3);
        assert!(INGEST_REQUESTS_TOTAL.with_label_values(&["json"]).get() >= 1);
    }

    #[test]
    fn test_api_errors_counted_by_code() {
        record_api_error("rate_limited");
        record_api_error("risk_failed");
        assert!(API_ERRORS_TOTAL.with_label_values(&["rate_limited"]).get() >= 1);
        let body = export_prometheus();
        assert!(body.contains("api_errors_total"));
        assert!(!body.contains("ingest_failures_total"));
    }
}

//! Per-client rate limiting for the HTTP surface.
//!
//! - TRUST_PROXY support (X-Forwarded-For, Forwarded headers)
//! - Per-route QPS/BURST rules from RATE_LIMIT_ROUTES
//! - Retry-After headers on rejection
//! - Drop counters and structured logging

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, ResponseError,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::sync::Arc;
use tracing::warn;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::monitoring::metrics::{RATE_LIMIT_DROPS_BY_ROUTE, RATE_LIMIT_DROPS_TOTAL};
use crate::monitoring::trace_middleware::UNMATCHED_ROUTE;
use crate::security::rate_limiter::{Decision, RateLimiter};

/// Routes never rate limited by default
pub const DEFAULT_EXEMPT_PREFIXES: &[&str] = &["/health", "/ping", "/metrics", "/monitoring"];

/// Client IP, honouring proxy headers only when `trust_proxy` is set.
///
/// Priority:
/// 1. X-Forwarded-For header (first IP)
/// 2. Forwarded header (for= field)
/// 3. peer address
pub fn extract_client_ip(req: &ServiceRequest, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(ip) = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
        {
            return ip.to_string();
        }

        // RFC 7239: "for=192.0.2.1" or "for=\"[2001:db8:cafe::17]\""
        if let Some(s) = req.headers().get("Forwarded").and_then(|h| h.to_str().ok()) {
            if let Some(for_clause) = s
                .split([';', ','])
                .map(str::trim)
                .find(|c| c.to_ascii_lowercase().starts_with("for="))
            {
                let ip = for_clause[4..]
                    .trim()
                    .trim_matches('"')
                    .trim_start_matches('[')
                    .trim_end_matches(']');
                return ip.to_string();
            }
        }
    }

    req.connection_info()
        .peer_addr()
        .unwrap_or("127.0.0.1")
        .to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Prefix,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteRule {
    pub pattern: String,
    pub match_kind: MatchKind,
    pub qps: f64,
    pub burst: f64,
    pub label: Option<String>,
}

impl RouteRule {
    fn matches(&self, path: &str) -> bool {
        match self.match_kind {
            MatchKind::Exact => path == self.pattern,
            MatchKind::Prefix => path.starts_with(&self.pattern),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitOptions {
    pub trust_proxy: bool,
    pub qps: f64,
    pub burst: f64,
    pub rules: Vec<RouteRule>,
    pub exempt_prefixes: Vec<String>,
}

/// Budget applied to one request
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePolicy {
    pub qps: f64,
    pub burst: f64,
    pub label: String,
}

impl RateLimitOptions {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            trust_proxy: config.trust_proxy,
            qps: config.rate_limit_qps,
            burst: config.rate_limit_burst,
            rules: Vec::new(),
            exempt_prefixes: DEFAULT_EXEMPT_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    /// Merge RATE_LIMIT_ROUTES from the environment.
    pub fn with_env_overrides(self) -> Self {
        match std::env::var("RATE_LIMIT_ROUTES") {
            Ok(val) if !val.trim().is_empty() => self.with_routes_json(&val),
            _ => self,
        }
    }

    /// Accepts a JSON array of [`RouteRule`] or an object
    /// `{ "routes": [...], "exempt_prefixes": [...] }`. Unparseable input is
    /// logged and ignored.
    pub fn with_routes_json(mut self, input: &str) -> Self {
        #[derive(Deserialize)]
        struct RoutesFile {
            routes: Option<Vec<RouteRule>>,
            exempt_prefixes: Option<Vec<String>>,
        }

        if let Ok(rules) = serde_json::from_str::<Vec<RouteRule>>(input) {
            self.rules = rules;
        } else if let Ok(cfg) = serde_json::from_str::<RoutesFile>(input) {
            if let Some(rules) = cfg.routes {
                self.rules = rules;
            }
            if let Some(ex) = cfg.exempt_prefixes {
                self.exempt_prefixes = ex;
            }
        } else {
            warn!("RATE_LIMIT_ROUTES is not a valid route list; ignoring");
        }
        self
    }

    /// `None` when the path is exempt.
    pub fn policy_for(&self, path: &str, match_pattern: Option<String>) -> Option<RoutePolicy> {
        if self.exempt_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return None;
        }

        if let Some(rule) = self.rules.iter().find(|r| r.matches(path)) {
            return Some(RoutePolicy {
                qps: rule.qps.max(0.0),
                burst: rule.burst.max(0.0),
                label: rule.label.clone().unwrap_or_else(|| rule.pattern.clone()),
            });
        }

        Some(RoutePolicy {
            qps: self.qps.max(0.0),
            burst: self.burst.max(0.0),
            label: match_pattern.unwrap_or_else(|| UNMATCHED_ROUTE.to_string()),
        })
    }
}

/// Rate limiting middleware
pub struct RateLimitMiddleware {
    rate_limiter: Arc<RateLimiter>,
    opts: Rc<RateLimitOptions>,
}

impl RateLimitMiddleware {
    pub fn new(rate_limiter: Arc<RateLimiter>, opts: RateLimitOptions) -> Self {
        Self {
            rate_limiter,
            opts: Rc::new(opts),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            rate_limiter: Arc::clone(&self.rate_limiter),
            opts: Rc::clone(&self.opts),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    rate_limiter: Arc<RateLimiter>,
    opts: Rc<RateLimitOptions>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(policy) = self.opts.policy_for(req.path(), req.match_pattern()) {
            let client_ip = extract_client_ip(&req, self.opts.trust_proxy);
            // Budgets are isolated per client and route
            let key = format!("{}::{}", client_ip, policy.label);
            if let Decision::Reject(retry_after) =
                self.rate_limiter
                    .check_key(&key, policy.qps, policy.burst)
            {
                warn!(
                    route = %policy.label,
                    client_ip = %client_ip,
                    qps = policy.qps,
                    burst = policy.burst,
                    retry_after_secs = retry_after,
                    "Rate limit exceeded"
                );

                RATE_LIMIT_DROPS_TOTAL.inc();
                RATE_LIMIT_DROPS_BY_ROUTE
                    .with_label_values(&[&policy.label])
                    .inc();

                let resp = ApiError::RateLimited { retry_after }.error_response();
                return Box::pin(ready(Ok(req.into_response(resp.map_into_right_body()))));
            }
        }

        let service = Rc::clone(&self.service);
        Box::pin(async move {
            let res = service.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}

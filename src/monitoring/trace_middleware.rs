use crate::monitoring::metrics::REQUEST_LATENCY_MS;
use actix_service::{forward_ready, Service, Transform};
use actix_web::{
    dev::{ServiceRequest, ServiceResponse},
    http::header::{self, HeaderName, HeaderValue},
    Error, HttpMessage,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::time::Instant;
use tracing::{info_span, Instrument};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Route label for requests no resource matched
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Request id attached to the request extensions by [`TraceMiddleware`].
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Wraps every request in an `http_request` span, tags the response with
/// `x-request-id` and records latency.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceMiddleware;

impl TraceMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl<S, B> Transform<S, ServiceRequest> for TraceMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = TraceMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TraceMiddlewareService { service }))
    }
}

pub struct TraceMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for TraceMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let method = req.method().to_string();
        let route_label = req
            .match_pattern()
            .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());
        let path = req.path().to_string();
        let user_agent = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        // Reuse a caller-supplied id when it is a sane header value
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty() && v.len() <= 128)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let client_ip = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();

        req.extensions_mut().insert(RequestId(request_id.clone()));

        let span = info_span!(
            "http_request",
            method = %method,
            route = %route_label,
            path = %path,
            client_ip = %client_ip,
            request_id = %request_id,
            user_agent = %user_agent
        );

        let start = Instant::now();
        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.instrument(span).await;

            match res {
                Ok(mut response) => {
                    let status = response.status().as_u16();
                    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
                    let status_class = format!("{}xx", status / 100);

                    REQUEST_LATENCY_MS
                        .with_label_values(&[&method, &route_label, &status_class])
                        .observe(duration_ms);

                    if let Ok(value) = HeaderValue::from_str(&request_id) {
                        response
                            .headers_mut()
                            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                    }

                    tracing::info!(
                        method = %method,
                        route = %route_label,
                        path = %path,
                        status = status,
                        duration_ms = duration_ms as u64,
                        request_id = %request_id,
                        "request completed"
                    );
                    Ok(response)
                }
                Err(e) => {
                    tracing::warn!(
                        method = %method,
                        path = %path,
                        request_id = %request_id,
                        error = %e,
                        "request failed"
                    );
                    Err(e)
                }
            }
        })
    }
}

use crate::error::ApiError;
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
    Error, ResponseError,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Paths that require a key when one is configured
pub const PROTECTED_PREFIXES: &[&str] = &["/ingest", "/risk"];

/// Requires a matching `X-API-Key` header on protected routes. A guard built
/// without a key lets everything through.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyGuard {
    key: Option<Rc<str>>,
}

impl ApiKeyGuard {
    pub fn new(key: Option<String>) -> Self {
        Self {
            key: key.filter(|k| !k.is_empty()).map(Rc::from),
        }
    }

    fn is_protected(req: &ServiceRequest) -> bool {
        req.method() != Method::OPTIONS
            && PROTECTED_PREFIXES
                .iter()
                .any(|p| req.path() == *p || req.path().starts_with(&format!("{p}/")))
    }
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = ApiKeyGuardService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyGuardService {
            service: Rc::new(service),
            key: self.key.clone(),
        }))
    }
}

pub struct ApiKeyGuardService<S> {
    service: Rc<S>,
    key: Option<Rc<str>>,
}

impl<S, B> Service<ServiceRequest> for ApiKeyGuardService<S>
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
        if let Some(expected) = self.key.as_deref() {
            if ApiKeyGuard::is_protected(&req) {
                let rejection = match req.headers().get(API_KEY_HEADER) {
                    None => Some(ApiError::MissingApiKey),
                    Some(v) if !constant_time_eq(v.as_bytes(), expected.as_bytes()) => {
                        Some(ApiError::InvalidApiKey)
                    }
                    Some(_) => None,
                };
                if let Some(err) = rejection {
                    tracing::warn!(path = %req.path(), code = err.code(), "API key rejected");
                    let resp = err.error_response();
                    return Box::pin(ready(Ok(req.into_response(resp.map_into_right_body()))));
                }
            }
        }

        let service = Rc::clone(&self.service);
        Box::pin(async move {
            let res = service.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
    }

    #[test]
    fn test_empty_key_disables_guard() {
        assert!(ApiKeyGuard::new(Some(String::new())).key.is_none());
        assert!(ApiKeyGuard::new(None).key.is_none());
        assert!(ApiKeyGuard::new(Some("k".into())).key.is_some());
    }
}

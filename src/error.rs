use crate::chunker::ChunkError;
use crate::collaborators::{ExtractError, RiskError};
use crate::monitoring::metrics::record_api_error;
use actix_web::http::header::{HeaderValue, RETRY_AFTER};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Failure of an API request. Every variant renders as
/// `{"error": <code>, "detail"?: <string>}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no input text")]
    NoInput,

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    UploadFailed(String),

    #[error("{0}")]
    ExtractFailed(String),

    #[error("payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("missing X-API-Key header")]
    MissingApiKey,

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("too many requests")]
    RateLimited { retry_after: u64 },

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    RiskFailed(String),

    #[error("{0}")]
    InvalidRiskOutput(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NoInput => "no_input",
            ApiError::InvalidArgument(_) => "invalid_argument",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::UploadFailed(_) => "upload_failed",
            ApiError::ExtractFailed(_) => "extract_failed",
            ApiError::PayloadTooLarge { .. } => "payload_too_large",
            ApiError::MissingApiKey => "missing_api_key",
            ApiError::InvalidApiKey => "invalid_api_key",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::MethodNotAllowed => "method_not_allowed",
            ApiError::RiskFailed(_) => "risk_failed",
            ApiError::InvalidRiskOutput(_) => "invalid_risk_output",
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            ApiError::NoInput | ApiError::MethodNotAllowed => None,
            other => Some(other.to_string()),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NoInput
            | ApiError::InvalidArgument(_)
            | ApiError::InvalidRequest(_)
            | ApiError::UploadFailed(_)
            | ApiError::ExtractFailed(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::MissingApiKey | ApiError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::RiskFailed(_) | ApiError::InvalidRiskOutput(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let code = self.code();
        record_api_error(code);

        let detail = self.detail();
        let retry_after = match self {
            ApiError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        };
        let mut builder = HttpResponse::build(self.status_code());
        if let Some(secs) = retry_after {
            builder.insert_header((
                RETRY_AFTER,
                HeaderValue::from_str(&secs.to_string())
                    .unwrap_or_else(|_| HeaderValue::from_static("1")),
            ));
        }
        builder.json(ErrorBody {
            error: code,
            detail: detail.as_deref(),
            retry_after,
        })
    }
}

impl From<ChunkError> for ApiError {
    fn from(e: ChunkError) -> Self {
        match e {
            ChunkError::InvalidArgument(msg) => ApiError::InvalidArgument(msg),
        }
    }
}

impl From<ExtractError> for ApiError {
    fn from(e: ExtractError) -> Self {
        ApiError::ExtractFailed(e.to_string())
    }
}

impl From<RiskError> for ApiError {
    fn from(e: RiskError) -> Self {
        match e {
            RiskError::InvalidOutput { .. } => ApiError::InvalidRiskOutput(e.to_string()),
            RiskError::TooLarge { limit, .. } => ApiError::PayloadTooLarge { limit },
            RiskError::Script(_) | RiskError::Failed { .. } => ApiError::RiskFailed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::ScriptError;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::NoInput.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::PayloadTooLarge { limit: 1 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(ApiError::MissingApiKey.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::RateLimited { retry_after: 2 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::MethodNotAllowed.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ApiError::InvalidRiskOutput(String::new()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let resp = ApiError::RateLimited { retry_after: 3 }.error_response();
        assert_eq!(resp.headers().get(RETRY_AFTER).unwrap(), "3");
    }

    #[test]
    fn test_collaborator_errors_map_to_codes() {
        let e: ApiError = ExtractError::Reported("unsupported_file_type".into()).into();
        assert_eq!(e.code(), "extract_failed");
        assert!(e.to_string().contains("unsupported_file_type"));

        let e: ApiError = RiskError::Script(ScriptError::NotFound("risk analyzer")).into();
        assert_eq!(e.code(), "risk_failed");

        let e: ApiError = RiskError::InvalidOutput {
            reason: "expected value".into(),
            output: "nope".into(),
        }
        .into();
        assert_eq!(e.code(), "invalid_risk_output");

        let e: ApiError = RiskError::TooLarge { len: 200_000, limit: 1024 }.into();
        assert_eq!(e.code(), "payload_too_large");
        assert_eq!(e.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let e: ApiError = ChunkError::InvalidArgument("size must be > 0".into()).into();
        assert_eq!(e.code(), "invalid_argument");
    }

    #[test]
    fn test_detail_omitted_for_no_input() {
        assert!(ApiError::NoInput.detail().is_none());
        assert_eq!(
            ApiError::InvalidRequest("bad json".into()).detail().as_deref(),
            Some("bad json")
        );
    }
}

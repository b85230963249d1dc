use super::{parse_text_input, read_body, AppState, BodyKind};
use crate::collaborators::MAX_RISK_TEXT_BYTES;
use crate::error::ApiError;
use crate::monitoring::metrics::RISK_REQUESTS_TOTAL;
use actix_web::{web, HttpRequest, HttpResponse};

/// POST /risk
///
/// Scores `text` with the risk analyzer and relays its JSON verbatim.
pub async fn risk(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let kind = match BodyKind::of(&req) {
        BodyKind::Multipart => {
            return Err(ApiError::InvalidRequest(
                "expected a JSON or form body".to_string(),
            ))
        }
        kind => kind,
    };
    let body = read_body(payload, state.max_upload_bytes).await?;
    let input = parse_text_input(kind, &body)?;

    let text = input.trim();
    if text.is_empty() {
        return Err(ApiError::NoInput);
    }
    if text.len() > MAX_RISK_TEXT_BYTES {
        return Err(ApiError::PayloadTooLarge {
            limit: MAX_RISK_TEXT_BYTES,
        });
    }

    let report = state.risk.analyze(text).await?;
    RISK_REQUESTS_TOTAL.inc();
    Ok(HttpResponse::Ok().json(report))
}

#[macro_use]
mod common;

use actix_web::{http::StatusCode, test};
use chunk_ingest::monitoring::metrics::export_prometheus;
use common::*;
use serde_json::json;

/// `request_latency_ms_count` lines carrying all of `labels`
fn latency_counts<'a>(exposition: &'a str, labels: &[&str]) -> Vec<&'a str> {
    exposition
        .lines()
        .filter(|l| l.starts_with("request_latency_ms_count{"))
        .filter(|l| labels.iter().all(|label| l.contains(label)))
        .collect()
}

#[actix_web::test]
async fn test_latency_labels_use_route_pattern() {
    let app = traced_app!(default_state());

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));

    let req = test::TestRequest::post()
        .uri("/ingest")
        .set_json(json!({"text": "   "}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let text = export_prometheus();
    assert_eq!(
        latency_counts(&text, &[r#"route="/health""#, r#"method="GET""#, r#"status_class="2xx""#])
            .len(),
        1
    );
    assert_eq!(
        latency_counts(&text, &[r#"route="/ingest""#, r#"method="POST""#, r#"status_class="4xx""#])
            .len(),
        1
    );
}

#[actix_web::test]
async fn test_unknown_paths_share_one_series() {
    let app = traced_app!(default_state());

    for i in 0..50 {
        let req = test::TestRequest::get()
            .uri(&format!("/no-such-page-{i}"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    let text = export_prometheus();
    assert!(!text.contains("/no-such-page-"));
    let unmatched = latency_counts(&text, &[r#"route="unmatched""#, r#"status_class="4xx""#]);
    assert_eq!(unmatched.len(), 1);
    let count: u64 = unmatched[0]
        .rsplit(' ')
        .next()
        .and_then(|v| v.parse().ok())
        .unwrap();
    assert!(count >= 50);
}

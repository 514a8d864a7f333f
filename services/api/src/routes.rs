use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json, Router};
use hcc_raf::claims::{ClaimExtractor, ClaimFilter};
use hcc_raf::router::raf_router;
use hcc_raf::RafCalculator;
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_scoring_routes<E, F>(calculator: Arc<RafCalculator<E, F>>) -> Router
where
    E: ClaimExtractor + 'static,
    F: ClaimFilter + 'static,
{
    raf_router(calculator)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    fn app(ready: bool) -> (Router, AppState) {
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        let calculator = Arc::new(RafCalculator::bundled().expect("bundled tables load"));
        let router = with_scoring_routes(calculator).layer(Extension(state.clone()));
        (router, state)
    }

    async fn get(router: Router, uri: &str) -> StatusCode {
        router
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("router responds")
            .status()
    }

    #[tokio::test]
    async fn readiness_tracks_the_flag() {
        let (router, state) = app(false);
        assert_eq!(get(router.clone(), "/ready").await, StatusCode::SERVICE_UNAVAILABLE);

        state.readiness.store(true, Ordering::Release);
        assert_eq!(get(router, "/ready").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn operational_and_scoring_routes_share_the_router() {
        let (router, _) = app(true);
        assert_eq!(get(router.clone(), "/health").await, StatusCode::OK);
        assert_eq!(get(router.clone(), "/metrics").await, StatusCode::OK);
        assert_eq!(get(router, "/api/v1/models").await, StatusCode::OK);
    }
}

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::calculator::{PopulationRequest, RafCalculator};
use crate::claims::{ClaimExtractor, ClaimFilter};
use crate::model::{ModelDomain, ModelName};
use crate::scoring::{DemographicsInput, RafError};

#[derive(Debug, Deserialize)]
pub struct DiagnosesRequest {
    #[serde(default)]
    pub diagnosis_codes: Vec<String>,
    pub model_name: Option<String>,
    #[serde(default)]
    pub demographics: DemographicsInput,
}

#[derive(Debug, Deserialize)]
pub struct ServiceDataRequest {
    pub service_data: Value,
    pub model_name: Option<String>,
    #[serde(default)]
    pub demographics: DemographicsInput,
    /// Records on this route are treated as pre-filtered unless the caller opts in.
    #[serde(default)]
    pub filter_claims: bool,
}

#[derive(Debug, Deserialize)]
pub struct EobRequest {
    pub eob: Value,
    pub model_name: Option<String>,
    #[serde(default)]
    pub demographics: DemographicsInput,
    pub filter_claims: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct X12Request {
    /// Raw 837 interchange text.
    pub interchange: String,
    pub model_name: Option<String>,
    #[serde(default)]
    pub demographics: DemographicsInput,
    pub filter_claims: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PopulationBody {
    pub requests: Vec<PopulationRequest>,
}

#[derive(Debug, Serialize)]
struct ModelView {
    name: ModelName,
    domain: ModelDomain,
    categories: usize,
    diagnosis_codes: usize,
    coefficients: usize,
    interaction_rules: usize,
}

/// Router exposing the scoring operations over HTTP.
pub fn raf_router<E, F>(calculator: Arc<RafCalculator<E, F>>) -> Router
where
    E: ClaimExtractor + 'static,
    F: ClaimFilter + 'static,
{
    Router::new()
        .route("/api/v1/raf/diagnoses", post(diagnoses_handler::<E, F>))
        .route("/api/v1/raf/service-data", post(service_data_handler::<E, F>))
        .route("/api/v1/raf/eob", post(eob_handler::<E, F>))
        .route("/api/v1/raf/837", post(x12_handler::<E, F>))
        .route("/api/v1/raf/population", post(population_handler::<E, F>))
        .route("/api/v1/models", get(models_handler::<E, F>))
        .with_state(calculator)
}

pub(crate) async fn diagnoses_handler<E, F>(
    State(calculator): State<Arc<RafCalculator<E, F>>>,
    Json(request): Json<DiagnosesRequest>,
) -> Response
where
    E: ClaimExtractor + 'static,
    F: ClaimFilter + 'static,
{
    let model_name = model_or_default(request.model_name.as_deref(), &calculator);
    match calculator.calculate_raf(&request.diagnosis_codes, model_name, &request.demographics) {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn service_data_handler<E, F>(
    State(calculator): State<Arc<RafCalculator<E, F>>>,
    Json(request): Json<ServiceDataRequest>,
) -> Response
where
    E: ClaimExtractor + 'static,
    F: ClaimFilter + 'static,
{
    let model_name = model_or_default(request.model_name.as_deref(), &calculator);
    match calculator.run_from_service_values(
        &request.service_data,
        model_name,
        &request.demographics,
        request.filter_claims,
    ) {
        Ok(scored) => (StatusCode::OK, Json(scored)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn eob_handler<E, F>(
    State(calculator): State<Arc<RafCalculator<E, F>>>,
    Json(request): Json<EobRequest>,
) -> Response
where
    E: ClaimExtractor + 'static,
    F: ClaimFilter + 'static,
{
    let model_name = model_or_default(request.model_name.as_deref(), &calculator);
    let filter_claims = request
        .filter_claims
        .unwrap_or_else(|| calculator.filters_claims_by_default());
    match calculator.run_detailed(&request.eob, model_name, &request.demographics, filter_claims) {
        Ok(scored) => (StatusCode::OK, Json(scored)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn x12_handler<E, F>(
    State(calculator): State<Arc<RafCalculator<E, F>>>,
    Json(request): Json<X12Request>,
) -> Response
where
    E: ClaimExtractor + 'static,
    F: ClaimFilter + 'static,
{
    let model_name = model_or_default(request.model_name.as_deref(), &calculator);
    let filter_claims = request
        .filter_claims
        .unwrap_or_else(|| calculator.filters_claims_by_default());
    match calculator.run_from_x12(
        &request.interchange,
        model_name,
        &request.demographics,
        filter_claims,
    ) {
        Ok(scored) => (StatusCode::OK, Json(scored)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn population_handler<E, F>(
    State(calculator): State<Arc<RafCalculator<E, F>>>,
    Json(body): Json<PopulationBody>,
) -> Response
where
    E: ClaimExtractor + 'static,
    F: ClaimFilter + 'static,
{
    let results: Vec<Value> = calculator
        .score_population(&body.requests)
        .into_iter()
        .map(|outcome| match outcome {
            Ok(result) => json!({ "result": result }),
            Err(err) => json!({ "error": err.to_string() }),
        })
        .collect();
    (StatusCode::OK, Json(json!({ "results": results }))).into_response()
}

pub(crate) async fn models_handler<E, F>(
    State(calculator): State<Arc<RafCalculator<E, F>>>,
) -> Response
where
    E: ClaimExtractor + 'static,
    F: ClaimFilter + 'static,
{
    let registry = calculator.registry();
    let models: Vec<ModelView> = registry
        .models()
        .into_iter()
        .filter_map(|name| registry.get(name).ok())
        .map(|model| ModelView {
            name: model.name(),
            domain: model.name().domain(),
            categories: model.catalog().len(),
            diagnosis_codes: model.mapped_code_count(),
            coefficients: model.coefficients().len(),
            interaction_rules: model.rules().len(),
        })
        .collect();

    let payload = json!({
        "default_model": calculator.default_model(),
        "models": models,
    });
    (StatusCode::OK, Json(payload)).into_response()
}

fn model_or_default<'a, E, F>(requested: Option<&'a str>, calculator: &RafCalculator<E, F>) -> &'a str
where
    E: ClaimExtractor + 'static,
    F: ClaimFilter + 'static,
{
    requested.unwrap_or(calculator.default_model().label())
}

fn error_response(err: RafError) -> Response {
    let status = match err {
        RafError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RafError::UnknownModel(_) => StatusCode::BAD_REQUEST,
        RafError::Configuration { .. } | RafError::Integrity { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({
        "error": err.to_string(),
    });
    (status, Json(payload)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn router() -> Router {
        let calculator = RafCalculator::bundled().expect("bundled tables load");
        raf_router(Arc::new(calculator))
    }

    async fn post_json(router: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn diagnoses_route_scores() {
        let (status, body) = post_json(
            router(),
            "/api/v1/raf/diagnoses",
            json!({
                "diagnosis_codes": ["E119", "I509"],
                "model_name": "CMS-HCC Model V24",
                "demographics": { "age": 67, "sex": "F" }
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model_name"], "CMS-HCC Model V24");
        assert_eq!(body["hcc_list"], json!(["19", "85"]));
    }

    #[tokio::test]
    async fn error_kinds_map_to_status_codes() {
        let (status, _) = post_json(
            router(),
            "/api/v1/raf/diagnoses",
            json!({ "model_name": "V99", "demographics": { "age": 67, "sex": "F" } }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = post_json(
            router(),
            "/api/v1/raf/diagnoses",
            json!({ "demographics": { "age": -3, "sex": "F" } }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().expect("message").contains("age"));

        let (status, _) = post_json(
            router(),
            "/api/v1/raf/service-data",
            json!({
                "service_data": [{ "claim_type": "71" }],
                "demographics": { "age": 67, "sex": "F" }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn x12_route_scores_an_interchange() {
        let interchange = "ST*837*0001*005010X222A1~NM1*IL*1*DOE*JANE****MI*12345~\
            CLM*A1*50***11:B:1~HI*ABK:E119*ABF:I509~LX*1~SV1*HC:99213*50*UN*1*11**1:2~\
            DTP*472*D8*20240214~SE*8*0001~";
        let (status, body) = post_json(
            router(),
            "/api/v1/raf/837",
            json!({
                "interchange": interchange,
                "model_name": "CMS-HCC Model V24",
                "demographics": { "age": 67, "sex": "F" }
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["hcc_list"], json!(["19", "85"]));
        assert_eq!(body["service_records"][0]["patient_id"], "12345");
        assert_eq!(body["service_records"][0]["service_date"], "2024-02-14");

        let (status, _) = post_json(
            router(),
            "/api/v1/raf/837",
            json!({
                "interchange": "ST*835*0001~SE*1*0001~",
                "demographics": { "age": 67, "sex": "F" }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn models_route_lists_loaded_models() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/models")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(body["default_model"], "CMS-HCC Model V28");
        assert_eq!(body["models"].as_array().expect("models").len(), 6);
    }
}

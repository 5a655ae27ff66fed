use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use geo_ai::{DiagramEngine, EngineError, LanguageModel};
use geo_scene::{GeoObject, ViewConfig};

/// One engine per process, one generation cycle at a time: the mutex is what
/// serializes turns so cycles can never overlap.
type SharedEngine<M> = Arc<Mutex<DiagramEngine<M>>>;

pub fn app<M>(engine: DiagramEngine<M>) -> Router
where
    M: LanguageModel + Send + 'static,
{
    let state: SharedEngine<M> = Arc::new(Mutex::new(engine));
    Router::new()
        .route("/health", get(health))
        .route("/api/generate", post(generate::<M>))
        .route("/api/scene", get(scene::<M>))
        .route("/api/reset", post(reset::<M>))
        .fallback_service(ServeDir::new("public"))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    input: String,
    #[serde(default, rename = "continue")]
    continue_mode: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct GenerateResponse {
    result: Option<String>,
    promoted: bool,
    kept_previous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    scene: Option<SceneView>,
}

/// What the plotting collaborator needs: the rendering surface plus every
/// object of the visible scene.
#[derive(Debug, Serialize, Deserialize)]
struct SceneView {
    surface: ViewConfig,
    objects: Vec<GeoObject>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SceneResponse {
    scene: Option<SceneView>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn generate<M>(
    State(engine): State<SharedEngine<M>>,
    body: Bytes,
) -> Result<Json<GenerateResponse>, ApiError>
where
    M: LanguageModel + Send + 'static,
{
    let request: GenerateRequest = parse_json(&body)?;
    if request.input.trim().is_empty() {
        return Err(ApiError::bad_request("input text is required"));
    }

    let mut engine = engine.lock().await;
    match engine.run_turn(&request.input, request.continue_mode).await {
        Ok(report) => Ok(Json(GenerateResponse {
            result: report.source,
            promoted: report.promoted,
            kept_previous: !report.promoted,
            error: report.validation_error.map(|err| {
                format!("could not render the new diagram, keeping the previous one: {err}")
            }),
            scene: scene_view(&engine),
        })),
        Err(EngineError::EmptyResult) => Ok(Json(GenerateResponse {
            result: None,
            promoted: false,
            kept_previous: true,
            error: Some("model returned no usable result".to_string()),
            scene: scene_view(&engine),
        })),
        Err(EngineError::Model(err)) => Err(ApiError::bad_gateway(format!(
            "could not reach the generation backend: {err}"
        ))),
    }
}

async fn scene<M>(State(engine): State<SharedEngine<M>>) -> Json<SceneResponse>
where
    M: LanguageModel + Send + 'static,
{
    let engine = engine.lock().await;
    Json(SceneResponse {
        scene: scene_view(&engine),
    })
}

async fn reset<M>(State(engine): State<SharedEngine<M>>) -> StatusCode
where
    M: LanguageModel + Send + 'static,
{
    engine.lock().await.reset();
    StatusCode::NO_CONTENT
}

fn scene_view<M: LanguageModel>(engine: &DiagramEngine<M>) -> Option<SceneView> {
    let scene = engine.session().scene()?;
    Some(SceneView {
        surface: scene.view().cloned().unwrap_or_default(),
        objects: scene.objects().to_vec(),
    })
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("request body is required"));
    }

    serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use axum::Router;
    use axum::body::Body;
    use http::{Method, Request, Response, StatusCode};
    use http_body_util::BodyExt;
    use serde::de::DeserializeOwned;
    use serde_json::json;
    use tower::ServiceExt;

    use geo_ai::{DiagramEngine, LanguageModel, ModelError, ModelRequest};
    use geo_scene::ViewConfig;

    use super::{GenerateResponse, SceneResponse, app};

    #[derive(Default)]
    struct StubModel {
        responses: VecDeque<Result<String, ModelError>>,
    }

    impl StubModel {
        fn with(mut self, response: Result<&str, ModelError>) -> Self {
            self.responses
                .push_back(response.map(str::to_string));
            self
        }
    }

    #[async_trait]
    impl LanguageModel for StubModel {
        async fn generate(&mut self, _request: ModelRequest<'_>) -> Result<String, ModelError> {
            self.responses
                .pop_front()
                .unwrap_or_else(|| Err(ModelError::Transport("no scripted response".to_string())))
        }
    }

    const SEGMENT: &str = "A = point(0, 0) { name: \"A\" }\n\
                           B = point(6, 0) { name: \"B\" }\n\
                           AB = segment(A, B)";

    fn test_app(model: StubModel) -> Router {
        app(DiagramEngine::new(model, ViewConfig::default()))
    }

    async fn send_json(
        router: Router,
        method: Method,
        uri: &str,
        body: serde_json::Value,
    ) -> Response<Body> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build");
        router.oneshot(request).await.expect("request should run")
    }

    async fn send_empty(router: Router, method: Method, uri: &str) -> Response<Body> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request should build");
        router.oneshot(request).await.expect("request should run")
    }

    async fn parse_json_response<T: DeserializeOwned>(response: Response<Body>) -> T {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should read")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("body should be valid JSON")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = send_empty(test_app(StubModel::default()), Method::GET, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn generate_promotes_and_returns_scene() {
        let router = test_app(StubModel::default().with(Ok(SEGMENT)));
        let response = send_json(
            router,
            Method::POST,
            "/api/generate",
            json!({"input": "segment AB"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let payload: GenerateResponse = parse_json_response(response).await;
        assert!(payload.promoted);
        assert!(!payload.kept_previous);
        assert_eq!(payload.result.as_deref(), Some(SEGMENT));
        assert_eq!(payload.error, None);
        let scene = payload.scene.expect("scene should be present");
        assert_eq!(scene.objects.len(), 3);
        assert_eq!(scene.surface.container_id, "diagram");
    }

    #[tokio::test]
    async fn generate_keeps_previous_diagram_on_validation_failure() {
        let router = test_app(
            StubModel::default()
                .with(Ok(SEGMENT))
                .with(Ok("s = segment(A, X)")),
        );

        let first = send_json(
            router.clone(),
            Method::POST,
            "/api/generate",
            json!({"input": "segment AB"}),
        )
        .await;
        assert_eq!(first.status(), StatusCode::OK);

        let second = send_json(
            router,
            Method::POST,
            "/api/generate",
            json!({"input": "garbage"}),
        )
        .await;
        assert_eq!(second.status(), StatusCode::OK);
        let payload: GenerateResponse = parse_json_response(second).await;
        assert!(!payload.promoted);
        assert!(payload.kept_previous);
        assert_eq!(payload.result.as_deref(), Some(SEGMENT));
        let error = payload.error.expect("error notice");
        assert!(error.contains("keeping the previous one"), "{error}");
        assert_eq!(payload.scene.expect("scene kept").objects.len(), 3);
    }

    #[tokio::test]
    async fn generate_maps_transport_failure_to_bad_gateway() {
        let router = test_app(StubModel::default().with(Err(ModelError::Status(503))));
        let response = send_json(
            router,
            Method::POST,
            "/api/generate",
            json!({"input": "anything"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn generate_surfaces_empty_result_notice() {
        let router = test_app(StubModel::default().with(Ok("  ")));
        let response = send_json(
            router,
            Method::POST,
            "/api/generate",
            json!({"input": "anything"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let payload: GenerateResponse = parse_json_response(response).await;
        assert!(!payload.promoted);
        assert_eq!(payload.result, None);
        assert!(payload.error.expect("notice").contains("no usable result"));
    }

    #[tokio::test]
    async fn generate_rejects_blank_input() {
        let router = test_app(StubModel::default());
        let response = send_json(
            router,
            Method::POST,
            "/api/generate",
            json!({"input": "   "}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reset_clears_the_current_scene() {
        let router = test_app(StubModel::default().with(Ok(SEGMENT)));
        send_json(
            router.clone(),
            Method::POST,
            "/api/generate",
            json!({"input": "segment AB"}),
        )
        .await;

        let reset = send_empty(router.clone(), Method::POST, "/api/reset").await;
        assert_eq!(reset.status(), StatusCode::NO_CONTENT);

        let response = send_empty(router, Method::GET, "/api/scene").await;
        assert_eq!(response.status(), StatusCode::OK);
        let payload: SceneResponse = parse_json_response(response).await;
        assert!(payload.scene.is_none());
    }

    #[tokio::test]
    async fn continuation_flag_round_trips_through_the_api() {
        let extended = format!("{SEGMENT}\nC = point(3, 5) {{ name: \"C\" }}");
        let router = test_app(
            StubModel::default()
                .with(Ok(SEGMENT))
                .with(Ok(extended.as_str())),
        );

        send_json(
            router.clone(),
            Method::POST,
            "/api/generate",
            json!({"input": "segment AB"}),
        )
        .await;
        let response = send_json(
            router,
            Method::POST,
            "/api/generate",
            json!({"input": "add C", "continue": true}),
        )
        .await;

        let payload: GenerateResponse = parse_json_response(response).await;
        assert!(payload.promoted);
        assert_eq!(payload.scene.expect("scene").objects.len(), 4);
    }
}

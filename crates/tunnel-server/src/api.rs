use axum::{
    extract::{rejection::FormRejection, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Form, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use tunnel_common::{
    ActionRequest, ActionResponse, KeyExchangeRequest, KeyExchangeResponse, ACTION_PATH,
    KEY_EXCHANGE_PATH,
};

use crate::audit::{log_session_event, FailureReason, SessionEventType};
use crate::controller::SessionController;
use crate::error::{ApiError, MSG_BAD_PUBLIC_KEY};
use crate::store::SessionStore;

const MSG_BAD_FORM: &str = "Unable to parse form data";

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

async fn metrics<S: SessionStore>(
    State(controller): State<Arc<SessionController<S>>>,
) -> impl IntoResponse {
    (StatusCode::OK, Json(controller.metrics()))
}

fn form_rejected(rejection: FormRejection, message: &str) -> ApiError {
    log_session_event(
        SessionEventType::ValidationError,
        None,
        Some(FailureReason::MissingField),
        Some(&rejection.body_text()),
    );
    ApiError::BadRequest(message.to_string())
}

async fn key_exchange<S: SessionStore>(
    State(controller): State<Arc<SessionController<S>>>,
    form: Result<Form<KeyExchangeRequest>, FormRejection>,
) -> Result<Json<KeyExchangeResponse>, ApiError> {
    let Form(req) = form.map_err(|e| form_rejected(e, MSG_BAD_PUBLIC_KEY))?;
    let resp = controller.key_exchange(&req.client_public_key).await?;
    Ok(Json(resp))
}

async fn action<S: SessionStore>(
    State(controller): State<Arc<SessionController<S>>>,
    form: Result<Form<ActionRequest>, FormRejection>,
) -> Result<Json<ActionResponse>, ApiError> {
    let Form(req) = form.map_err(|e| form_rejected(e, MSG_BAD_FORM))?;
    let resp = controller.handle_action(&req).await?;
    Ok(Json(resp))
}

fn build_cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]),
    )
}

/// HTTP routes for one controller.
///
/// `cors_origins` lists browser origins allowed to call the API; empty
/// disables CORS, `*` allows any origin.
pub fn router<S: SessionStore>(
    controller: Arc<SessionController<S>>,
    cors_origins: &[String],
) -> Router {
    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::<S>))
        .route(KEY_EXCHANGE_PATH, post(key_exchange::<S>))
        .route(ACTION_PATH, post(action::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(controller);

    match build_cors_layer(cors_origins) {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

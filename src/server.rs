use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::ai::client::ModelClient;
use crate::ai::flows::RecipeFlows;
use crate::catalog::{self, CategoryMatch, DietTag};
use crate::error::{FlowError, FlowErrorKind, ModelError};

/// JSON error body shared by every route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub retryable: bool,
}

#[derive(Debug)]
pub enum ApiError {
    Flow(FlowError),
    BadRequest(String),
}

impl From<FlowError> for ApiError {
    fn from(e: FlowError) -> Self {
        ApiError::Flow(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    code: "bad_request".to_string(),
                    message,
                    field: None,
                    retryable: false,
                },
            ),
            ApiError::Flow(e) => {
                let timed_out = matches!(
                    e,
                    FlowError::ModelInvocationFailed {
                        source: ModelError::Timeout(_),
                        ..
                    }
                );
                let status = match e.kind() {
                    _ if timed_out => StatusCode::GATEWAY_TIMEOUT,
                    FlowErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    FlowErrorKind::UnknownFlow => StatusCode::NOT_FOUND,
                    FlowErrorKind::ModelInvocationFailed | FlowErrorKind::InvalidModelOutput => {
                        StatusCode::BAD_GATEWAY
                    }
                };
                (
                    status,
                    ErrorResponse {
                        code: e.kind().as_str().to_string(),
                        message: e.to_string(),
                        field: e.field().map(str::to_string),
                        retryable: e.is_retryable(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

pub fn router<C: ModelClient + 'static>(flows: Arc<RecipeFlows<C>>) -> Router {
    Router::new()
        .route("/api/flows", get(list_flows::<C>))
        .route("/api/flows/{name}", post(run_flow::<C>))
        .route("/api/ingredients", get(list_ingredients))
        .with_state(flows)
}

pub async fn serve<C: ModelClient + 'static>(
    flows: Arc<RecipeFlows<C>>,
    addr: SocketAddr,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("🌐 Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(flows)).await
}

async fn list_flows<C: ModelClient + 'static>(
    State(flows): State<Arc<RecipeFlows<C>>>,
) -> Json<Value> {
    let listed: Vec<Value> = flows
        .definitions()
        .iter()
        .map(|d| {
            json!({
                "name": d.name(),
                "input": d.input_hint(),
                "output": d.response_schema(),
            })
        })
        .collect();
    Json(json!({ "flows": listed }))
}

async fn run_flow<C: ModelClient + 'static>(
    State(flows): State<Arc<RecipeFlows<C>>>,
    Path(name): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(input) = body?;
    let output = flows.invoke(&name, input).await?;
    Ok(Json(output))
}

#[derive(Debug, Deserialize)]
struct IngredientQuery {
    #[serde(default)]
    search: String,
    diet: Option<String>,
}

async fn list_ingredients(
    query: Result<Query<IngredientQuery>, QueryRejection>,
) -> Result<Json<Vec<CategoryMatch>>, ApiError> {
    let Query(query) = query?;
    let diet = query
        .diet
        .as_deref()
        .map(str::parse::<DietTag>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    Ok(Json(catalog::search(&query.search, diet)))
}

use std::net::SocketAddr;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::AppState;

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: String,
}

#[derive(Debug, Deserialize)]
struct CreateTaskInput {
    prompt: Option<String>,
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = app_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("drover-engine listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                futures::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/task", post(create_task))
        .route("/task/{id}", get(get_task))
        .route("/task/{id}/logs", get(task_logs))
        .route("/tasks", get(list_tasks))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

async fn create_task(
    State(state): State<AppState>,
    Json(input): Json<CreateTaskInput>,
) -> Response {
    let prompt = input
        .prompt
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());
    let Some(prompt) = prompt else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorEnvelope {
                error: "prompt is required".to_string(),
            }),
        )
            .into_response();
    };

    let record = state.engine.submit(prompt).await;
    Json(json!({
        "id": record.id,
        "status": "queued",
    }))
    .into_response()
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.registry().get(&id).await {
        Some(record) => Json(record).into_response(),
        None => task_not_found(&id),
    }
}

async fn task_logs(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(record) = state.engine.registry().get(&id).await else {
        return task_not_found(&id);
    };

    // The log file appears when the driving flow opens its sink; a read that
    // races task startup sees an empty log, not an error.
    let content = tokio::fs::read(&record.log_file)
        .await
        .unwrap_or_default();
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        content,
    )
        .into_response()
}

async fn list_tasks(State(state): State<AppState>) -> Response {
    Json(state.engine.registry().list().await).into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    let (tasks, running) = state.engine.registry().counts().await;
    Json(json!({
        "ok": true,
        "tasks": tasks,
        "running": running,
        "version": env!("CARGO_PKG_VERSION"),
    }))
    .into_response()
}

fn task_not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorEnvelope {
            error: format!("task not found: {id}"),
        }),
    )
        .into_response()
}

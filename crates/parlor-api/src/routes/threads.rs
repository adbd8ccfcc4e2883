use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use parlor_persist::ChatThread;

use crate::error::{ApiError, ApiResult};
use crate::routes::current_user;
use crate::state::AppState;

const THREAD_LIST_LIMIT: i64 = 100;

pub async fn create_thread(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ChatThread>> {
    let user = current_user(&headers)?;

    // New threads capture the current default model; resolution failures
    // leave the thread on the registry default at chat time
    let default_model_id = match state.persist.models().get_default().await {
        Ok(model) => Some(model.id),
        Err(e) => {
            tracing::warn!("failed to get default model for new chat thread: {}", e);
            None
        }
    };

    let thread = state
        .persist
        .threads()
        .create_thread(ChatThread::new(&user.id, &user.name, default_model_id))
        .await?;

    Ok(Json(thread))
}

pub async fn list_threads(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ChatThread>>> {
    let user = current_user(&headers)?;
    let threads = state
        .persist
        .threads()
        .list_threads(&user.id, THREAD_LIST_LIMIT)
        .await?;
    Ok(Json(threads))
}

pub async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<ChatThread>> {
    let user = current_user(&headers)?;
    let thread = state
        .persist
        .threads()
        .get_thread(&thread_id, &user.id)
        .await?
        .ok_or(ApiError::ThreadNotFound(thread_id))?;
    Ok(Json(thread))
}

pub async fn delete_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let user = current_user(&headers)?;
    state
        .persist
        .soft_delete_thread(&thread_id, &user.id)
        .await?;
    Ok(Json(json!({ "status": "deleted" })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateModelRequest {
    pub model_id: String,
}

pub async fn update_thread_model(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateModelRequest>,
) -> ApiResult<Json<Value>> {
    let user = current_user(&headers)?;

    // Reject unknown/disabled model ids up front
    state.persist.models().resolve(Some(&req.model_id)).await?;

    let thread = state
        .persist
        .threads()
        .get_thread(&thread_id, &user.id)
        .await?
        .ok_or(ApiError::ThreadNotFound(thread_id))?;

    state
        .persist
        .threads()
        .update_model(&thread.id, &req.model_id)
        .await?;

    Ok(Json(json!({ "status": "updated" })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateImageModelRequest {
    pub image_model_id: String,
}

pub async fn update_thread_image_model(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateImageModelRequest>,
) -> ApiResult<Json<Value>> {
    let user = current_user(&headers)?;

    if !state.image_models.contains(&req.image_model_id) {
        return Err(ApiError::BadRequest(format!(
            "Invalid image model: {}. Available models: {}",
            req.image_model_id,
            state.image_models.ids().join(", ")
        )));
    }

    let thread = state
        .persist
        .threads()
        .get_thread(&thread_id, &user.id)
        .await?
        .ok_or(ApiError::ThreadNotFound(thread_id))?;

    state
        .persist
        .threads()
        .update_image_model(&thread.id, &req.image_model_id)
        .await?;

    Ok(Json(json!({ "status": "updated" })))
}

#[derive(Debug, Deserialize)]
pub struct BookmarkRequest {
    pub bookmarked: bool,
}

pub async fn set_bookmarked(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<BookmarkRequest>,
) -> ApiResult<Json<Value>> {
    let user = current_user(&headers)?;
    let thread = state
        .persist
        .threads()
        .get_thread(&thread_id, &user.id)
        .await?
        .ok_or(ApiError::ThreadNotFound(thread_id))?;

    state
        .persist
        .threads()
        .set_bookmarked(&thread.id, req.bookmarked)
        .await?;

    Ok(Json(json!({ "status": "updated" })))
}

pub async fn add_extension(
    State(state): State<AppState>,
    Path((thread_id, extension_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let user = current_user(&headers)?;
    let thread = state
        .persist
        .threads()
        .get_thread(&thread_id, &user.id)
        .await?
        .ok_or(ApiError::ThreadNotFound(thread_id))?;

    state
        .persist
        .threads()
        .add_extension(&thread.id, &extension_id)
        .await?;

    Ok(Json(json!({ "status": "updated" })))
}

pub async fn remove_extension(
    State(state): State<AppState>,
    Path((thread_id, extension_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let user = current_user(&headers)?;
    let thread = state
        .persist
        .threads()
        .get_thread(&thread_id, &user.id)
        .await?
        .ok_or(ApiError::ThreadNotFound(thread_id))?;

    state
        .persist
        .threads()
        .remove_extension(&thread.id, &extension_id)
        .await?;

    Ok(Json(json!({ "status": "updated" })))
}

#[derive(Debug, Deserialize)]
pub struct GenerateTitleRequest {
    pub message: String,
}

pub async fn generate_title(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<GenerateTitleRequest>,
) -> ApiResult<Json<Value>> {
    let user = current_user(&headers)?;
    let thread = state
        .persist
        .threads()
        .get_thread(&thread_id, &user.id)
        .await?
        .ok_or(ApiError::ThreadNotFound(thread_id))?;

    let title = state
        .orchestrator
        .generate_title(&thread, &req.message)
        .await?;

    state.persist.threads().set_name(&thread.id, &title).await?;

    Ok(Json(json!({ "name": title })))
}

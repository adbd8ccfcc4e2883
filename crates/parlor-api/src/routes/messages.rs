use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};

use parlor_persist::ChatMessage;

use crate::error::{ApiError, ApiResult};
use crate::routes::current_user;
use crate::state::AppState;

pub async fn list_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let user = current_user(&headers)?;

    let thread = state
        .persist
        .threads()
        .get_thread(&thread_id, &user.id)
        .await?
        .ok_or(ApiError::ThreadNotFound(thread_id))?;

    let messages = state
        .persist
        .messages()
        .list_for_thread(&thread.id, &user.id)
        .await?;

    Ok(Json(messages))
}

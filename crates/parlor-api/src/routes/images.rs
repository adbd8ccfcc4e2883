use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::IntoResponse,
};

use crate::error::{ApiError, ApiResult};
use crate::routes::current_user;
use crate::state::AppState;

/// Serve a generated image back out of the blob store.
pub async fn get_image(
    State(state): State<AppState>,
    Path((thread_id, filename)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let user = current_user(&headers)?;

    // Images are namespaced per thread; ownership gates access
    state
        .persist
        .threads()
        .get_thread(&thread_id, &user.id)
        .await?
        .ok_or(ApiError::ThreadNotFound(thread_id.clone()))?;

    let bytes = state.persist.images().download(&thread_id, &filename).await?;

    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}

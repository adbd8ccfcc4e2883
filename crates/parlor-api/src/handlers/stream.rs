use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use parlor_chat::TurnInput;
use parlor_types::ChatCompletionEvent;

use crate::error::{ApiError, ApiResult};
use crate::routes::current_user;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
    #[serde(default)]
    pub multimodal_image: Option<String>,
}

/// Send a message and stream the response as server-sent events.
///
/// The response stays open until exactly one terminal event; dropping the
/// connection cancels the in-flight turn cooperatively.
pub async fn send_message_stream(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let user = current_user(&headers)?;

    // Setup gate: no chat before an admin has configured a model
    if !state.persist.models().has_enabled_models().await? {
        return Err(ApiError::SetupRequired);
    }

    let thread = state
        .persist
        .threads()
        .get_thread(&thread_id, &user.id)
        .await?
        .ok_or(ApiError::ThreadNotFound(thread_id))?;

    let cancel = CancellationToken::new();
    // Dropping the guard (client disconnect tears down the stream) cancels
    // every in-flight provider and tool call
    let guard = cancel.clone().drop_guard();

    let events = state
        .orchestrator
        .stream_turn(
            thread,
            user,
            TurnInput {
                message: req.message,
                multimodal_image: req.multimodal_image,
            },
            cancel,
        )
        .await?;

    let sse_stream = events.map(move |event| {
        let _hold = &guard;
        Ok::<Event, Infallible>(to_sse_event(&event))
    });

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: &ChatCompletionEvent) -> Event {
    match Event::default().event(event.event_name()).json_data(event) {
        Ok(sse_event) => sse_event,
        Err(e) => {
            tracing::error!("failed to serialize SSE event: {}", e);
            Event::default().event("error").data("serialization error")
        }
    }
}

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::guards::AuthUser;
use crate::models::message::{FileMeta, MessageType, MessageView};
use crate::routes::Pagination;
use crate::services::conversation_service::{ConversationService, ConversationSummary};
use crate::services::message_service::MessageService;
use crate::state::AppState;
use crate::websocket::events::OutboundEvent;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationSummary>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageView>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: Uuid,
    pub content: Option<String>,
    #[serde(default)]
    pub message_type: MessageType,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message: &'static str,
    pub data: MessageView,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMessageRequest {
    pub content: String,
}

pub async fn list_conversations(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PageParams>,
) -> AppResult<Json<ConversationsResponse>> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(20).clamp(1, 100);

    let (conversations, total) =
        ConversationService::list_for_user(&state.db, user.id, page, limit).await?;

    Ok(Json(ConversationsResponse {
        conversations,
        pagination: Pagination::new(page, limit, total),
    }))
}

/// History with another user. Fetching the page also marks everything
/// addressed to the caller in this room as read and zeroes the caller's
/// unread counter, so opening a chat clears its badge.
pub async fn get_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(other_user_id): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<MessagesResponse>> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(50).clamp(1, 1000);

    let (messages, total) =
        MessageService::list_by_room(&state.db, user.id, other_user_id, page, limit).await?;
    MessageService::mark_read(&state.db, user.id, other_user_id).await?;

    Ok(Json(MessagesResponse {
        messages,
        pagination: Pagination::new(page, limit, total),
    }))
}

pub async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<SendMessageResponse>)> {
    let file = body.file_url.as_ref().map(|url| FileMeta {
        file_url: url.clone(),
        file_name: body.file_name.clone(),
        file_size: body.file_size,
    });

    let message = MessageService::send(
        &state.db,
        user.id,
        body.receiver_id,
        body.content,
        body.message_type,
        file,
    )
    .await?;

    // Push only after the commit: the room channel reaches open chats,
    // the user channel the recipient's other devices. Delivery is
    // best-effort; offline recipients catch up via unread counters.
    let event = OutboundEvent::MessageNew {
        message: message.clone(),
    };
    match event.to_ws_message() {
        Ok(msg) => {
            state
                .registry
                .send_to_room_and_user(&message.room_id, body.receiver_id, msg)
                .await;
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize message event"),
    }

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            message: "Message sent successfully",
            data: message,
        }),
    ))
}

pub async fn update_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(message_id): Path<Uuid>,
    Json(body): Json<UpdateMessageRequest>,
) -> AppResult<Json<SendMessageResponse>> {
    let message = MessageService::edit(&state.db, message_id, user.id, &body.content).await?;
    Ok(Json(SendMessageResponse {
        message: "Message updated successfully",
        data: message,
    }))
}

pub async fn delete_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(message_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    MessageService::soft_delete(&state.db, message_id, user.id).await?;
    Ok(Json(serde_json::json!({
        "message": "Message deleted successfully"
    })))
}

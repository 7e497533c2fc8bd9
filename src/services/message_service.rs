use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::message::{FileMeta, Message, MessageType, MessageView, MAX_CONTENT_LEN};
use crate::services::conversation_service::ConversationService;

pub struct MessageService;

impl MessageService {
    /// Room key for the pair, identical no matter which side derives it.
    pub fn room_id(a: Uuid, b: Uuid) -> String {
        ConversationService::room_id(a, b)
    }

    /// Persist a message and update the pair's conversation bookkeeping
    /// in one transaction: insert, refresh the last-message pointer and
    /// bump the recipient's unread counter. Returns the enriched view
    /// ready to be pushed to the recipient.
    pub async fn send(
        db: &Pool<Postgres>,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: Option<String>,
        message_type: MessageType,
        file: Option<FileMeta>,
    ) -> AppResult<MessageView> {
        if sender_id == receiver_id {
            return Err(AppError::BadRequest(
                "Cannot send a message to yourself".into(),
            ));
        }

        let content = Self::resolve_content(content, file.as_ref())?;
        let room_id = Self::room_id(sender_id, receiver_id);

        let mut tx = db.begin().await?;

        let receiver_exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
            .bind(receiver_id)
            .fetch_optional(&mut *tx)
            .await?;
        if receiver_exists.is_none() {
            return Err(AppError::NotFound("Receiver not found".into()));
        }

        let conversation = ConversationService::find_or_create(&mut tx, sender_id, receiver_id).await?;

        let message_id = Uuid::new_v4();
        let (file_url, file_name, file_size) = match &file {
            Some(meta) => (
                Some(meta.file_url.clone()),
                meta.file_name.clone(),
                meta.file_size,
            ),
            None => (None, None, None),
        };

        let row = sqlx::query(
            "INSERT INTO messages \
             (id, room_id, sender_id, receiver_id, content, message_type, file_url, file_name, file_size) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING created_at",
        )
        .bind(message_id)
        .bind(&room_id)
        .bind(sender_id)
        .bind(receiver_id)
        .bind(&content)
        .bind(message_type.as_str())
        .bind(&file_url)
        .bind(&file_name)
        .bind(file_size)
        .fetch_one(&mut *tx)
        .await?;
        let created_at = row.get("created_at");

        ConversationService::update_last_message(&mut tx, conversation.id, message_id).await?;
        ConversationService::increment_unread(&mut tx, &conversation, receiver_id).await?;

        let sender_row = sqlx::query("SELECT username, avatar FROM users WHERE id = $1")
            .bind(sender_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(MessageView {
            id: message_id,
            room_id,
            sender_id,
            sender_name: sender_row.get("username"),
            sender_avatar: sender_row.get("avatar"),
            receiver_id,
            content,
            message_type,
            file_url,
            file_name,
            file_size,
            is_read: false,
            is_edited: false,
            created_at,
        })
    }

    /// Message history between the caller and another user, oldest first
    /// within the page. The page itself is taken from the newest end, so
    /// page 1 is always the latest messages.
    pub async fn list_by_room(
        db: &Pool<Postgres>,
        user_id: Uuid,
        other_user_id: Uuid,
        page: i64,
        limit: i64,
    ) -> AppResult<(Vec<MessageView>, i64)> {
        let room_id = Self::room_id(user_id, other_user_id);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE room_id = $1 AND is_deleted = FALSE",
        )
        .bind(&room_id)
        .fetch_one(db)
        .await?;

        let rows = sqlx::query(
            r#"
            SELECT m.*, u.username AS sender_name, u.avatar AS sender_avatar
            FROM messages m
            JOIN users u ON u.id = m.sender_id
            WHERE m.room_id = $1 AND m.is_deleted = FALSE
            ORDER BY m.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(&room_id)
        .bind(limit)
        .bind((page - 1) * limit)
        .fetch_all(db)
        .await?;

        let mut messages: Vec<MessageView> = rows
            .into_iter()
            .map(|row| MessageView {
                id: row.get("id"),
                room_id: row.get("room_id"),
                sender_id: row.get("sender_id"),
                sender_name: row.get("sender_name"),
                sender_avatar: row.get("sender_avatar"),
                receiver_id: row.get("receiver_id"),
                content: row.get("content"),
                message_type: MessageType::from_str(row.get("message_type")),
                file_url: row.get("file_url"),
                file_name: row.get("file_name"),
                file_size: row.get("file_size"),
                is_read: row.get("is_read"),
                is_edited: row.get("is_edited"),
                created_at: row.get("created_at"),
            })
            .collect();
        // Fetched newest-first for the page window, returned chronological
        messages.reverse();

        Ok((messages, total))
    }

    /// Mark everything addressed to `reader_id` in this room as read and
    /// zero the reader's unread counter, atomically.
    pub async fn mark_read(
        db: &Pool<Postgres>,
        reader_id: Uuid,
        other_user_id: Uuid,
    ) -> AppResult<()> {
        let room_id = Self::room_id(reader_id, other_user_id);
        let mut tx = db.begin().await?;

        sqlx::query(
            "UPDATE messages SET is_read = TRUE, read_at = NOW() \
             WHERE room_id = $1 AND receiver_id = $2 AND is_read = FALSE AND is_deleted = FALSE",
        )
        .bind(&room_id)
        .bind(reader_id)
        .execute(&mut *tx)
        .await?;

        if let Some(conversation) = ConversationService::get_by_room(&mut tx, &room_id).await? {
            ConversationService::reset_unread(&mut tx, &conversation, reader_id).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Replace a message's content. Only the sender may edit, and a
    /// deleted message is gone for this purpose too.
    pub async fn edit(
        db: &Pool<Postgres>,
        message_id: Uuid,
        editor_id: Uuid,
        new_content: &str,
    ) -> AppResult<MessageView> {
        let message = Self::get_visible(db, message_id).await?;
        if message.sender_id != editor_id {
            return Err(AppError::Forbidden);
        }

        let new_content = new_content.trim();
        if new_content.is_empty() {
            return Err(AppError::BadRequest("Message content is required".into()));
        }
        if new_content.chars().count() > MAX_CONTENT_LEN {
            return Err(AppError::BadRequest(format!(
                "Message cannot exceed {MAX_CONTENT_LEN} characters"
            )));
        }

        let row = sqlx::query(
            r#"
            UPDATE messages m SET content = $1, is_edited = TRUE, edited_at = NOW()
            FROM users u
            WHERE m.id = $2 AND u.id = m.sender_id
            RETURNING m.*, u.username AS sender_name, u.avatar AS sender_avatar
            "#,
        )
        .bind(new_content)
        .bind(message_id)
        .fetch_one(db)
        .await?;

        Ok(MessageView {
            id: row.get("id"),
            room_id: row.get("room_id"),
            sender_id: row.get("sender_id"),
            sender_name: row.get("sender_name"),
            sender_avatar: row.get("sender_avatar"),
            receiver_id: row.get("receiver_id"),
            content: row.get("content"),
            message_type: MessageType::from_str(row.get("message_type")),
            file_url: row.get("file_url"),
            file_name: row.get("file_name"),
            file_size: row.get("file_size"),
            is_read: row.get("is_read"),
            is_edited: row.get("is_edited"),
            created_at: row.get("created_at"),
        })
    }

    /// Soft delete: the row stays but disappears from every read path.
    /// Only the sender may delete.
    pub async fn soft_delete(
        db: &Pool<Postgres>,
        message_id: Uuid,
        requester_id: Uuid,
    ) -> AppResult<()> {
        let message = Self::get_visible(db, message_id).await?;
        if message.sender_id != requester_id {
            return Err(AppError::Forbidden);
        }

        sqlx::query(
            "UPDATE messages SET is_deleted = TRUE, deleted_at = NOW() \
             WHERE id = $1 AND is_deleted = FALSE",
        )
        .bind(message_id)
        .execute(db)
        .await?;
        Ok(())
    }

    async fn get_visible(db: &Pool<Postgres>, message_id: Uuid) -> AppResult<Message> {
        let message = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(db)
            .await?;
        match message {
            Some(m) if !m.is_deleted => Ok(m),
            _ => Err(AppError::NotFound("Message not found".into())),
        }
    }

    /// Validate and normalize outgoing content. File messages fall back
    /// to the file name when the caller sends no caption.
    fn resolve_content(content: Option<String>, file: Option<&FileMeta>) -> AppResult<String> {
        let content = content.map(|c| c.trim().to_string()).unwrap_or_default();
        let content = if content.is_empty() {
            match file {
                Some(meta) => meta
                    .file_name
                    .clone()
                    .unwrap_or_else(|| meta.file_url.clone()),
                None => return Err(AppError::BadRequest("Message content is required".into())),
            }
        } else {
            content
        };

        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(AppError::BadRequest(format!(
                "Message cannot exceed {MAX_CONTENT_LEN} characters"
            )));
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_matches_conversation_derivation() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(
            MessageService::room_id(a, b),
            ConversationService::room_id(b, a)
        );
    }

    #[test]
    fn test_resolve_content_rejects_empty_without_file() {
        let err = MessageService::resolve_content(Some("   ".into()), None).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        let err = MessageService::resolve_content(None, None).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_resolve_content_falls_back_to_file_name() {
        let file = FileMeta {
            file_url: "/uploads/123-9.pdf".into(),
            file_name: Some("report.pdf".into()),
            file_size: Some(2048),
        };
        let content = MessageService::resolve_content(None, Some(&file)).unwrap();
        assert_eq!(content, "report.pdf");

        let unnamed = FileMeta {
            file_url: "/uploads/123-9.pdf".into(),
            file_name: None,
            file_size: None,
        };
        let content = MessageService::resolve_content(Some("".into()), Some(&unnamed)).unwrap();
        assert_eq!(content, "/uploads/123-9.pdf");
    }

    #[test]
    fn test_resolve_content_enforces_length_limit() {
        let long = "x".repeat(MAX_CONTENT_LEN + 1);
        let err = MessageService::resolve_content(Some(long), None).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let exact = "x".repeat(MAX_CONTENT_LEN);
        assert!(MessageService::resolve_content(Some(exact), None).is_ok());
    }

    #[test]
    fn test_resolve_content_keeps_caption_over_file_name() {
        let file = FileMeta {
            file_url: "/uploads/1-1.png".into(),
            file_name: Some("photo.png".into()),
            file_size: Some(100),
        };
        let content =
            MessageService::resolve_content(Some("check this out".into()), Some(&file)).unwrap();
        assert_eq!(content, "check this out");
    }
}

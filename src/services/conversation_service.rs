use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::conversation::Conversation;
use crate::models::user::UserProfile;

pub const ROOM_ID_DELIMITER: char = '_';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

/// Preview of the most recent message, as shown in the conversation list.
#[derive(Debug, Clone, Serialize)]
pub struct LastMessagePreview {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
}

/// One entry of a user's conversation list: the counterpart's profile,
/// the last message preview and the caller's own unread count.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub room_id: String,
    pub contact: UserProfile,
    pub last_message: Option<LastMessagePreview>,
    pub unread_count: i32,
    pub last_message_time: DateTime<Utc>,
}

pub struct ConversationService;

impl ConversationService {
    /// Canonical room id for a user pair: both ids sorted by their string
    /// form and joined with a fixed delimiter, so the key is identical
    /// regardless of who initiates.
    pub fn room_id(a: Uuid, b: Uuid) -> String {
        let (first, second) = Self::sorted_pair(a, b);
        format!("{first}{ROOM_ID_DELIMITER}{second}")
    }

    pub fn sorted_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
        if a.to_string() <= b.to_string() {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Look up the pair's conversation, creating it with zeroed counters
    /// on first contact. Safe under a concurrent first-contact race: the
    /// insert is `ON CONFLICT DO NOTHING` against the unique room_id and
    /// the re-fetch returns whichever row survived.
    pub async fn find_or_create(
        conn: &mut PgConnection,
        a: Uuid,
        b: Uuid,
    ) -> AppResult<Conversation> {
        let room_id = Self::room_id(a, b);

        if let Some(conv) =
            sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE room_id = $1")
                .bind(&room_id)
                .fetch_optional(&mut *conn)
                .await?
        {
            return Ok(conv);
        }

        let (one, two) = Self::sorted_pair(a, b);
        sqlx::query(
            "INSERT INTO conversations (id, room_id, participant_one, participant_two) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (room_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(&room_id)
        .bind(one)
        .bind(two)
        .execute(&mut *conn)
        .await?;

        let conv =
            sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE room_id = $1")
                .bind(&room_id)
                .fetch_one(&mut *conn)
                .await?;
        Ok(conv)
    }

    /// Point the conversation at its newest message and refresh the
    /// last-message timestamp.
    pub async fn update_last_message(
        conn: &mut PgConnection,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE conversations \
             SET last_message_id = $1, last_message_at = NOW(), updated_at = NOW() \
             WHERE id = $2",
        )
        .bind(message_id)
        .bind(conversation_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Bump the recipient's unread counter. The sender's counter is
    /// never touched.
    pub async fn increment_unread(
        conn: &mut PgConnection,
        conversation: &Conversation,
        recipient_id: Uuid,
    ) -> AppResult<()> {
        let sql = Self::unread_update_sql(conversation, recipient_id, false)?;
        sqlx::query(sql).bind(conversation.id).execute(conn).await?;
        Ok(())
    }

    /// Zero the reader's unread counter. Idempotent.
    pub async fn reset_unread(
        conn: &mut PgConnection,
        conversation: &Conversation,
        reader_id: Uuid,
    ) -> AppResult<()> {
        let sql = Self::unread_update_sql(conversation, reader_id, true)?;
        sqlx::query(sql).bind(conversation.id).execute(conn).await?;
        Ok(())
    }

    fn unread_update_sql(
        conversation: &Conversation,
        user_id: Uuid,
        reset: bool,
    ) -> AppResult<&'static str> {
        if !conversation.involves(user_id) {
            return Err(AppError::BadRequest(
                "User is not a participant of this conversation".into(),
            ));
        }
        let first = conversation.participant_one == user_id;
        Ok(match (first, reset) {
            (true, false) => {
                "UPDATE conversations SET unread_one = unread_one + 1, updated_at = NOW() WHERE id = $1"
            }
            (false, false) => {
                "UPDATE conversations SET unread_two = unread_two + 1, updated_at = NOW() WHERE id = $1"
            }
            (true, true) => {
                "UPDATE conversations SET unread_one = 0, updated_at = NOW() WHERE id = $1"
            }
            (false, true) => {
                "UPDATE conversations SET unread_two = 0, updated_at = NOW() WHERE id = $1"
            }
        })
    }

    pub async fn get_by_room(
        conn: &mut PgConnection,
        room_id: &str,
    ) -> AppResult<Option<Conversation>> {
        let conv =
            sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE room_id = $1")
                .bind(room_id)
                .fetch_optional(conn)
                .await?;
        Ok(conv)
    }

    /// List a user's conversations, newest activity first, with the
    /// counterpart's profile and the caller's own unread count.
    pub async fn list_for_user(
        db: &Pool<Postgres>,
        user_id: Uuid,
        page: i64,
        limit: i64,
    ) -> AppResult<(Vec<ConversationSummary>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM conversations WHERE participant_one = $1 OR participant_two = $1",
        )
        .bind(user_id)
        .fetch_one(db)
        .await?;

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.room_id, c.participant_one, c.unread_one, c.unread_two, c.last_message_at,
                   u.id AS contact_id, u.username, u.email, u.avatar, u.status, u.is_online, u.last_seen,
                   m.content AS last_content, m.created_at AS last_at,
                   m.sender_id AS last_sender, m.is_deleted AS last_deleted
            FROM conversations c
            JOIN users u
              ON u.id = CASE WHEN c.participant_one = $1 THEN c.participant_two ELSE c.participant_one END
            LEFT JOIN messages m ON m.id = c.last_message_id
            WHERE c.participant_one = $1 OR c.participant_two = $1
            ORDER BY c.last_message_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind((page - 1) * limit)
        .fetch_all(db)
        .await?;

        let conversations = rows
            .into_iter()
            .map(|row| {
                let participant_one: Uuid = row.get("participant_one");
                let unread_one: i32 = row.get("unread_one");
                let unread_two: i32 = row.get("unread_two");
                let unread_count = if participant_one == user_id {
                    unread_one
                } else {
                    unread_two
                };

                let contact = UserProfile {
                    id: row.get("contact_id"),
                    username: row.get("username"),
                    email: row.get("email"),
                    avatar: row.get("avatar"),
                    status: row.get("status"),
                    is_online: row.get("is_online"),
                    last_seen: row.get("last_seen"),
                };

                // Soft-deleted last messages are excluded from the preview
                let last_deleted: Option<bool> = row.try_get("last_deleted").ok();
                let last_message = match (row.try_get::<String, _>("last_content"), last_deleted) {
                    (Ok(content), Some(false)) => {
                        let sender: Uuid = row.get("last_sender");
                        Some(LastMessagePreview {
                            content,
                            timestamp: row.get("last_at"),
                            direction: if sender == user_id {
                                Direction::Sent
                            } else {
                                Direction::Received
                            },
                        })
                    }
                    _ => None,
                };

                ConversationSummary {
                    id: row.get("id"),
                    room_id: row.get("room_id"),
                    contact,
                    last_message,
                    unread_count,
                    last_message_time: row.get("last_message_at"),
                }
            })
            .collect();

        Ok((conversations, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_is_order_independent() {
        for _ in 0..64 {
            let a = Uuid::new_v4();
            let b = Uuid::new_v4();
            assert_eq!(
                ConversationService::room_id(a, b),
                ConversationService::room_id(b, a)
            );
        }
    }

    #[test]
    fn test_room_id_shape() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let room = ConversationService::room_id(a, b);
        let (first, second) = room.split_once(ROOM_ID_DELIMITER).unwrap();
        assert!(first <= second);
        assert_eq!(first.parse::<Uuid>().unwrap().to_string(), first);
        assert_eq!(second.parse::<Uuid>().unwrap().to_string(), second);
    }

    #[test]
    fn test_sorted_pair_matches_room_id_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (one, two) = ConversationService::sorted_pair(a, b);
        assert_eq!(
            ConversationService::room_id(a, b),
            format!("{one}{ROOM_ID_DELIMITER}{two}")
        );
    }
}

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One row per unordered user pair. Participants are stored sorted by
/// their id's string form (the same ordering that produces the room id),
/// so each unread counter column maps to a fixed participant.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub room_id: String,
    pub participant_one: Uuid,
    pub participant_two: Uuid,
    pub last_message_id: Option<Uuid>,
    pub last_message_at: DateTime<Utc>,
    pub unread_one: i32,
    pub unread_two: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.participant_one == user_id || self.participant_two == user_id
    }

    /// The other participant from `user_id`'s point of view.
    pub fn counterpart(&self, user_id: Uuid) -> Uuid {
        if self.participant_one == user_id {
            self.participant_two
        } else {
            self.participant_one
        }
    }

    pub fn unread_for(&self, user_id: Uuid) -> i32 {
        if self.participant_one == user_id {
            self.unread_one
        } else {
            self.unread_two
        }
    }
}

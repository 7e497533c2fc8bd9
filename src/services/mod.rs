pub mod conversation_service;
pub mod message_service;
pub mod user_service;

/// `true` while another page of results remains after `page`.
pub fn has_more(page: i64, limit: i64, total: i64) -> bool {
    page * limit < total
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored reading session from the database. One row per guild.
///
/// The deadline columns double as the phase marker: a non-null
/// `join_deadline` means the join window is open, a non-null
/// `poll_deadline` means the selection poll is running, and both null
/// means the session is active until `end_time`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionRow {
    pub guild_id: String,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub join_deadline: Option<DateTime<Utc>>,
    pub poll_deadline: Option<DateTime<Utc>>,
    pub voting_enabled: i32,
}

/// A membership fact: the user's current opt-in state for a guild.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MembershipRow {
    pub guild_id: String,
    pub user_id: String,
    pub is_member: i32,
}

/// A book suggestion, unique per guild by normalized title.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SuggestionRow {
    pub guild_id: String,
    pub normalized_title: String,
    pub proposer_user_id: String,
}

/// A shared book record, keyed by ISBN.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BookRow {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub image_url: Option<String>,
}

/// A user's shelf entry joined with its book record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShelfRow {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub image_url: Option<String>,
    pub rating: Option<i64>,
    pub top_ten: i32,
}

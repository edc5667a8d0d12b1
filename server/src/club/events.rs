use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Announcement event emitted by the lifecycle engine for the chat layer to
/// render. The engine never formats user-facing text; it only reports what
/// changed. Delivery is best-effort: a missing consumer never fails or
/// retries the underlying transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClubEvent {
    /// A session was created and its join window opened.
    SessionCreated {
        guild_id: String,
        title: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        join_deadline: DateTime<Utc>,
    },

    /// A user opted in during the join window.
    MemberJoined { guild_id: String, user_id: String },

    /// A user opted out during the join window.
    MemberLeft { guild_id: String, user_id: String },

    /// A suggestion was recorded or its tally grew.
    SuggestionAdded {
        guild_id: String,
        title: String,
        count: u32,
    },

    /// The join window closed and the selection poll opened.
    PollOpened {
        guild_id: String,
        candidates: Vec<String>,
        poll_deadline: DateTime<Utc>,
    },

    /// The session entered its active phase. `selection` is the poll winner,
    /// or `None` when no poll ran or nobody voted.
    SessionStarted {
        guild_id: String,
        selection: Option<String>,
    },

    /// An early-termination vote opened.
    EndVoteStarted { guild_id: String },

    /// The session closed: `early` when ended by quorum vote, otherwise the
    /// scheduled end time elapsed.
    SessionClosed { guild_id: String, early: bool },
}

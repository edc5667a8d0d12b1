/// Errors surfaced by the session lifecycle operations.
///
/// Only [`ClubError::DurableWrite`] is ever retried, and only the failing
/// write itself; every other variant is reported to the caller as-is.
#[derive(Debug, thiserror::Error)]
pub enum ClubError {
    /// Malformed input: bad duration, bad date or time, empty title.
    #[error("{0}")]
    Validation(String),

    /// The action is not valid in the session's current phase or window.
    #[error("this action is closed for the current session phase")]
    PhaseClosed,

    /// The action requires membership the user does not have.
    #[error("user has not joined this reading session")]
    NotAMember,

    /// The guild has no session in any phase.
    #[error("no active reading session for this guild")]
    NoActiveSession,

    /// A ballot was cast but no vote is running.
    #[error("no vote is currently running")]
    NoActiveVote,

    /// An early-end vote was initiated while one is already running.
    #[error("an end-of-session vote is already running")]
    VoteAlreadyRunning,

    /// A session was created while the guild already has one.
    #[error("a reading session is already running for this guild")]
    SessionAlreadyRunning,

    /// The persistence layer rejected or timed out a write.
    #[error("durable write failed: {0}")]
    DurableWrite(#[from] sqlx::Error),
}

/// Errors surfaced by the personal library service.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    /// Malformed input, e.g. a rating outside 1-10.
    #[error("{0}")]
    Validation(String),

    /// The book is not on the user's shelf.
    #[error("book is not in this user's library")]
    NotInLibrary,

    /// The persistence layer failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::warn;

use crate::db::models::SessionRow;
use crate::db::queries::sessions::{CreateSessionParams, DeadlineField};
use crate::db::queries::{memberships, sessions, suggestions};

use super::session::SessionState;

/// How many times a failing durable write is attempted before the error is
/// surfaced. Only the write is retried; the caller's in-memory state stays
/// untouched until the write has succeeded.
const WRITE_ATTEMPTS: u32 = 3;

/// Mediates between in-memory session state and the durable store. Every
/// mutation that must survive a restart goes through here before the
/// corresponding in-memory update is considered committed.
#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Load a guild's session with its membership facts and suggestions,
    /// reconstructing the in-memory state a restarted process needs.
    /// Ballots are not durable: a mid-vote restart reopens the tally.
    pub async fn load(&self, guild_id: &str) -> Result<Option<SessionState>, sqlx::Error> {
        let Some(row) = sessions::get_session(&self.pool, guild_id).await? else {
            return Ok(None);
        };

        let mut state = SessionState {
            guild_id: row.guild_id,
            title: row.title,
            description: row.description,
            start_time: row.start_time,
            end_time: row.end_time,
            join_deadline: row.join_deadline,
            poll_deadline: row.poll_deadline,
            voting_enabled: row.voting_enabled != 0,
            members: Default::default(),
            declined: Default::default(),
            suggestions: Vec::new(),
            end_vote: None,
            poll: None,
            message_ref: None,
            closed: false,
        };

        for fact in memberships::list_memberships(&self.pool, guild_id).await? {
            if fact.is_member != 0 {
                state.add_member(&fact.user_id);
            } else {
                state.remove_member(&fact.user_id);
            }
        }

        for suggestion in suggestions::list_suggestions(&self.pool, guild_id).await? {
            state.record_suggestion(&suggestion.normalized_title, &suggestion.proposer_user_id);
        }

        if state.poll_deadline.is_some() {
            state.poll = Some(super::session::SelectionPoll::new(
                state.suggestion_titles(),
            ));
        }

        Ok(Some(state))
    }

    /// Persist a freshly created session row.
    pub async fn create(&self, params: &CreateSessionParams<'_>) -> Result<(), sqlx::Error> {
        with_retry("create_session", || {
            sessions::create_session(&self.pool, params)
        })
        .await
    }

    /// Record a membership fact. Committed before the caller acknowledges
    /// the join or leave.
    pub async fn record_membership(
        &self,
        guild_id: &str,
        user_id: &str,
        is_member: bool,
    ) -> Result<(), sqlx::Error> {
        with_retry("set_membership", || {
            memberships::set_membership(&self.pool, guild_id, user_id, is_member)
        })
        .await
    }

    /// Record a suggestion via insert-if-absent.
    pub async fn record_suggestion(
        &self,
        guild_id: &str,
        normalized_title: &str,
        proposer: &str,
    ) -> Result<(), sqlx::Error> {
        with_retry("add_suggestion", || {
            suggestions::add_suggestion(&self.pool, guild_id, normalized_title, proposer)
        })
        .await
    }

    /// Close the join window and open the poll.
    pub async fn open_poll(
        &self,
        guild_id: &str,
        poll_deadline: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        with_retry("open_poll", || {
            sessions::open_poll(&self.pool, guild_id, poll_deadline)
        })
        .await
    }

    /// Mark the session active: both deadlines cleared and the suggestion
    /// rows dropped, in one transaction.
    pub async fn begin_active(&self, guild_id: &str) -> Result<(), sqlx::Error> {
        with_retry("begin_active", || async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                "UPDATE sessions SET join_deadline = NULL, poll_deadline = NULL WHERE guild_id = ?",
            )
            .bind(guild_id)
            .execute(&mut *tx)
            .await?;
            sqlx::query("DELETE FROM suggestions WHERE guild_id = ?")
                .bind(guild_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await
        })
        .await
    }

    /// Remove every durable trace of a guild's session. Transactional so a
    /// crash cannot leave membership facts behind to leak into the guild's
    /// next session.
    pub async fn delete(&self, guild_id: &str) -> Result<(), sqlx::Error> {
        with_retry("delete_session", || async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM suggestions WHERE guild_id = ?")
                .bind(guild_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM memberships WHERE guild_id = ?")
                .bind(guild_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM sessions WHERE guild_id = ?")
                .bind(guild_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await
        })
        .await
    }

    /// Sessions whose given deadline has elapsed, straight from the durable
    /// store, which is the cross-restart ground truth the sweeper works from.
    pub async fn elapsed(
        &self,
        field: DeadlineField,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionRow>, sqlx::Error> {
        sessions::list_elapsed(&self.pool, field, now).await
    }
}

/// True for errors worth a second attempt: pool exhaustion, I/O trouble,
/// database busy. Constraint violations are final.
fn is_retryable(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => {
            !(db.is_unique_violation() || db.is_foreign_key_violation() || db.is_check_violation())
        }
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

/// Run a durable write, retrying the write (and only the write) a bounded
/// number of times with a short backoff.
async fn with_retry<F, Fut>(op_name: &str, op: F) -> Result<(), sqlx::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), sqlx::Error>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < WRITE_ATTEMPTS && is_retryable(&e) => {
                warn!(%op_name, attempt, error = %e, "durable write failed, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(50 * attempt as u64)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

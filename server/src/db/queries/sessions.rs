use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::models::SessionRow;

/// Which deadline column a sweep pass inspects. Each variant maps to one
/// phase transition: `Join` advances the join window, `Poll` closes the
/// selection poll, `End` closes the session after its end time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineField {
    Join,
    Poll,
    End,
}

/// Parameters for creating a session row (avoids too-many-arguments).
pub struct CreateSessionParams<'a> {
    pub guild_id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub join_deadline: DateTime<Utc>,
    pub voting_enabled: bool,
}

/// Create a new session row. Fails if the guild already has one (PK).
pub async fn create_session(
    pool: &SqlitePool,
    params: &CreateSessionParams<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO sessions (guild_id, title, description, start_time, end_time, join_deadline, voting_enabled) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(params.guild_id)
    .bind(params.title)
    .bind(params.description)
    .bind(params.start_time)
    .bind(params.end_time)
    .bind(params.join_deadline)
    .bind(params.voting_enabled as i32)
    .execute(pool)
    .await?;
    Ok(())
}

/// Get the session row for a guild, if any.
pub async fn get_session(
    pool: &SqlitePool,
    guild_id: &str,
) -> Result<Option<SessionRow>, sqlx::Error> {
    sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE guild_id = ?")
        .bind(guild_id)
        .fetch_optional(pool)
        .await
}

/// Close the join window and open the selection poll: the join deadline is
/// cleared and the poll deadline set in one statement.
pub async fn open_poll(
    pool: &SqlitePool,
    guild_id: &str,
    poll_deadline: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE sessions SET join_deadline = NULL, poll_deadline = ? WHERE guild_id = ?",
    )
    .bind(poll_deadline)
    .bind(guild_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Clear both deadlines, marking the session active until its end time.
pub async fn begin_active(pool: &SqlitePool, guild_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE sessions SET join_deadline = NULL, poll_deadline = NULL WHERE guild_id = ?",
    )
    .bind(guild_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete a session row.
pub async fn delete_session(pool: &SqlitePool, guild_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE guild_id = ?")
        .bind(guild_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// List sessions whose given deadline has elapsed. The three variants share
/// one entry point so the sweeper has a single polling shape.
pub async fn list_elapsed(
    pool: &SqlitePool,
    field: DeadlineField,
    now: DateTime<Utc>,
) -> Result<Vec<SessionRow>, sqlx::Error> {
    let sql = match field {
        DeadlineField::Join => {
            "SELECT * FROM sessions WHERE join_deadline IS NOT NULL AND join_deadline <= ?"
        }
        DeadlineField::Poll => {
            "SELECT * FROM sessions WHERE poll_deadline IS NOT NULL AND poll_deadline <= ?"
        }
        DeadlineField::End => {
            "SELECT * FROM sessions \
             WHERE join_deadline IS NULL AND poll_deadline IS NULL AND end_time <= ?"
        }
    };
    sqlx::query_as::<_, SessionRow>(sql)
        .bind(now)
        .fetch_all(pool)
        .await
}

use sqlx::SqlitePool;

use crate::db::models::MembershipRow;

/// Record a user's current join state for a guild. Upserts so repeated
/// joins or leaves collapse into a single fact row.
pub async fn set_membership(
    pool: &SqlitePool,
    guild_id: &str,
    user_id: &str,
    is_member: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO memberships (guild_id, user_id, is_member) VALUES (?, ?, ?) \
         ON CONFLICT(guild_id, user_id) DO UPDATE \
         SET is_member = excluded.is_member, updated_at = datetime('now')",
    )
    .bind(guild_id)
    .bind(user_id)
    .bind(is_member as i32)
    .execute(pool)
    .await?;
    Ok(())
}

/// All membership facts for a guild, opt-ins and opt-outs alike.
pub async fn list_memberships(
    pool: &SqlitePool,
    guild_id: &str,
) -> Result<Vec<MembershipRow>, sqlx::Error> {
    sqlx::query_as::<_, MembershipRow>(
        "SELECT guild_id, user_id, is_member FROM memberships WHERE guild_id = ? ORDER BY updated_at",
    )
    .bind(guild_id)
    .fetch_all(pool)
    .await
}

/// Remove every membership fact for a guild (session closed).
pub async fn delete_guild_memberships(
    pool: &SqlitePool,
    guild_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM memberships WHERE guild_id = ?")
        .bind(guild_id)
        .execute(pool)
        .await?;
    Ok(())
}

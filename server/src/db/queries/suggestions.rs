use sqlx::SqlitePool;

use crate::db::models::SuggestionRow;

/// Insert a suggestion if the normalized title is not already present for
/// the guild. The unique key is case-insensitive, so concurrent duplicate
/// submissions land on one row and the first proposer wins attribution.
pub async fn add_suggestion(
    pool: &SqlitePool,
    guild_id: &str,
    normalized_title: &str,
    proposer_user_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT OR IGNORE INTO suggestions (guild_id, normalized_title, proposer_user_id) \
         VALUES (?, ?, ?)",
    )
    .bind(guild_id)
    .bind(normalized_title)
    .bind(proposer_user_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// All suggestions for a guild in submission order.
pub async fn list_suggestions(
    pool: &SqlitePool,
    guild_id: &str,
) -> Result<Vec<SuggestionRow>, sqlx::Error> {
    sqlx::query_as::<_, SuggestionRow>(
        "SELECT guild_id, normalized_title, proposer_user_id FROM suggestions \
         WHERE guild_id = ? ORDER BY created_at, rowid",
    )
    .bind(guild_id)
    .fetch_all(pool)
    .await
}

/// Remove every suggestion for a guild (poll resolved or session closed).
pub async fn delete_guild_suggestions(
    pool: &SqlitePool,
    guild_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM suggestions WHERE guild_id = ?")
        .bind(guild_id)
        .execute(pool)
        .await?;
    Ok(())
}

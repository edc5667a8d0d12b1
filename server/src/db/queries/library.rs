use sqlx::SqlitePool;

use crate::db::models::ShelfRow;

/// Parameters for adding a book to a user's shelf (avoids too-many-arguments).
pub struct AddBookParams<'a> {
    pub user_id: &'a str,
    pub isbn: &'a str,
    pub title: &'a str,
    pub author: &'a str,
    pub image_url: Option<&'a str>,
    pub rating: Option<i64>,
}

/// Add a book to a user's shelf. The shared book row is created on first
/// sight of the ISBN; re-adding updates the rating but leaves the top-ten
/// flag alone.
pub async fn add_book(pool: &SqlitePool, params: &AddBookParams<'_>) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT OR IGNORE INTO books (isbn, title, author, image_url) VALUES (?, ?, ?, ?)",
    )
    .bind(params.isbn)
    .bind(params.title)
    .bind(params.author)
    .bind(params.image_url)
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO user_books (user_id, isbn, rating) VALUES (?, ?, ?) \
         ON CONFLICT(user_id, isbn) DO UPDATE SET rating = excluded.rating",
    )
    .bind(params.user_id)
    .bind(params.isbn)
    .bind(params.rating)
    .execute(pool)
    .await?;
    Ok(())
}

/// Remove a book from a user's shelf. Returns whether an entry was removed.
pub async fn remove_book(
    pool: &SqlitePool,
    user_id: &str,
    isbn: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM user_books WHERE user_id = ? AND isbn = ?")
        .bind(user_id)
        .bind(isbn)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Update the rating on a shelf entry. Returns whether the entry existed.
pub async fn set_rating(
    pool: &SqlitePool,
    user_id: &str,
    isbn: &str,
    rating: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE user_books SET rating = ? WHERE user_id = ? AND isbn = ?")
        .bind(rating)
        .bind(user_id)
        .bind(isbn)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Set or clear the top-ten flag. Returns whether the entry existed.
pub async fn set_top_ten(
    pool: &SqlitePool,
    user_id: &str,
    isbn: &str,
    top_ten: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE user_books SET top_ten = ? WHERE user_id = ? AND isbn = ?")
        .bind(top_ten as i32)
        .bind(user_id)
        .bind(isbn)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

const SHELF_SELECT: &str = "SELECT b.isbn, b.title, b.author, b.image_url, ub.rating, ub.top_ten \
     FROM books b JOIN user_books ub ON b.isbn = ub.isbn";

/// All books on a user's shelf.
pub async fn list_books(pool: &SqlitePool, user_id: &str) -> Result<Vec<ShelfRow>, sqlx::Error> {
    sqlx::query_as::<_, ShelfRow>(&format!(
        "{SHELF_SELECT} WHERE ub.user_id = ? ORDER BY b.title"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Shelf entries whose author contains the given fragment.
pub async fn list_books_by_author(
    pool: &SqlitePool,
    user_id: &str,
    author: &str,
) -> Result<Vec<ShelfRow>, sqlx::Error> {
    sqlx::query_as::<_, ShelfRow>(&format!(
        "{SHELF_SELECT} WHERE ub.user_id = ? AND b.author LIKE ? ORDER BY b.title"
    ))
    .bind(user_id)
    .bind(format!("%{author}%"))
    .fetch_all(pool)
    .await
}

/// Shelf entries rated at or above the given minimum.
pub async fn list_books_by_min_rating(
    pool: &SqlitePool,
    user_id: &str,
    min_rating: i64,
) -> Result<Vec<ShelfRow>, sqlx::Error> {
    sqlx::query_as::<_, ShelfRow>(&format!(
        "{SHELF_SELECT} WHERE ub.user_id = ? AND ub.rating >= ? ORDER BY ub.rating DESC, b.title"
    ))
    .bind(user_id)
    .bind(min_rating)
    .fetch_all(pool)
    .await
}

/// Shelf entries whose title contains the given fragment.
pub async fn list_books_by_title(
    pool: &SqlitePool,
    user_id: &str,
    title_part: &str,
) -> Result<Vec<ShelfRow>, sqlx::Error> {
    sqlx::query_as::<_, ShelfRow>(&format!(
        "{SHELF_SELECT} WHERE ub.user_id = ? AND b.title LIKE ? ORDER BY b.title"
    ))
    .bind(user_id)
    .bind(format!("%{title_part}%"))
    .fetch_all(pool)
    .await
}

/// A user's top-ten shelf, best-rated first.
pub async fn list_top_ten(pool: &SqlitePool, user_id: &str) -> Result<Vec<ShelfRow>, sqlx::Error> {
    sqlx::query_as::<_, ShelfRow>(&format!(
        "{SHELF_SELECT} WHERE ub.user_id = ? AND ub.top_ten = 1 \
         ORDER BY ub.rating DESC, b.title LIMIT 10"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::{create_pool, run_migrations};

    async fn setup_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn dune<'a>(user: &'a str) -> AddBookParams<'a> {
        AddBookParams {
            user_id: user,
            isbn: "9780441013593",
            title: "Dune",
            author: "Frank Herbert",
            image_url: None,
            rating: Some(9),
        }
    }

    #[tokio::test]
    async fn test_add_and_list() {
        let pool = setup_db().await;
        add_book(&pool, &dune("u1")).await.unwrap();

        let shelf = list_books(&pool, "u1").await.unwrap();
        assert_eq!(shelf.len(), 1);
        assert_eq!(shelf[0].title, "Dune");
        assert_eq!(shelf[0].rating, Some(9));
    }

    #[tokio::test]
    async fn test_readd_updates_rating_keeps_top_ten() {
        let pool = setup_db().await;
        add_book(&pool, &dune("u1")).await.unwrap();
        set_top_ten(&pool, "u1", "9780441013593", true).await.unwrap();

        add_book(
            &pool,
            &AddBookParams {
                rating: Some(7),
                ..dune("u1")
            },
        )
        .await
        .unwrap();

        let shelf = list_books(&pool, "u1").await.unwrap();
        assert_eq!(shelf.len(), 1, "re-add should not duplicate the shelf row");
        assert_eq!(shelf[0].rating, Some(7));
        assert_eq!(shelf[0].top_ten, 1, "top-ten flag survives a re-add");
    }

    #[tokio::test]
    async fn test_book_row_shared_between_users() {
        let pool = setup_db().await;
        add_book(&pool, &dune("u1")).await.unwrap();
        add_book(&pool, &dune("u2")).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(list_books(&pool, "u1").await.unwrap().len(), 1);
        assert_eq!(list_books(&pool, "u2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_reports_missing() {
        let pool = setup_db().await;
        add_book(&pool, &dune("u1")).await.unwrap();

        assert!(remove_book(&pool, "u1", "9780441013593").await.unwrap());
        assert!(!remove_book(&pool, "u1", "9780441013593").await.unwrap());
        assert!(list_books(&pool, "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filters() {
        let pool = setup_db().await;
        add_book(&pool, &dune("u1")).await.unwrap();
        add_book(
            &pool,
            &AddBookParams {
                user_id: "u1",
                isbn: "9781635575569",
                title: "Piranesi",
                author: "Susanna Clarke",
                image_url: None,
                rating: Some(8),
            },
        )
        .await
        .unwrap();

        let by_author = list_books_by_author(&pool, "u1", "herbert").await.unwrap();
        assert_eq!(by_author.len(), 1);
        assert_eq!(by_author[0].title, "Dune");

        let by_rating = list_books_by_min_rating(&pool, "u1", 9).await.unwrap();
        assert_eq!(by_rating.len(), 1);
        assert_eq!(by_rating[0].title, "Dune");

        let by_title = list_books_by_title(&pool, "u1", "iran").await.unwrap();
        assert_eq!(by_title.len(), 1);
        assert_eq!(by_title[0].title, "Piranesi");
    }

    #[tokio::test]
    async fn test_top_ten_ordering_and_cap() {
        let pool = setup_db().await;
        for i in 0..12i64 {
            add_book(
                &pool,
                &AddBookParams {
                    user_id: "u1",
                    isbn: &format!("isbn-{i:02}"),
                    title: &format!("Book {i:02}"),
                    author: "Author",
                    image_url: None,
                    rating: Some(i % 11),
                },
            )
            .await
            .unwrap();
            set_top_ten(&pool, "u1", &format!("isbn-{i:02}"), true)
                .await
                .unwrap();
        }

        let top = list_top_ten(&pool, "u1").await.unwrap();
        assert_eq!(top.len(), 10, "top ten is capped at 10 entries");
        // Best-rated first
        assert!(top[0].rating >= top[9].rating);
    }
}

use sqlx::SqlitePool;
use tracing::info;

use crate::club::error::LibraryError;
use crate::club::validation;
use crate::db::models::ShelfRow;
use crate::db::queries::library;

pub use crate::db::queries::library::AddBookParams;

/// Per-user book shelf: add, remove, rate, mark favourites, list with
/// filters. Fully decoupled from the session lifecycle; shares only the
/// database pool.
#[derive(Clone)]
pub struct LibraryService {
    pool: SqlitePool,
}

impl LibraryService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Add a book to the user's shelf. An optional initial rating is
    /// validated like any other rating.
    pub async fn add_book(&self, params: &AddBookParams<'_>) -> Result<(), LibraryError> {
        if params.isbn.trim().is_empty() {
            return Err(LibraryError::Validation("ISBN cannot be empty".into()));
        }
        validation::validate_title(params.title).map_err(LibraryError::Validation)?;
        if let Some(rating) = params.rating {
            validation::validate_rating(rating).map_err(LibraryError::Validation)?;
        }

        library::add_book(&self.pool, params).await?;
        info!(user_id = %params.user_id, isbn = %params.isbn, "book added to library");
        Ok(())
    }

    pub async fn remove_book(&self, user_id: &str, isbn: &str) -> Result<(), LibraryError> {
        if !library::remove_book(&self.pool, user_id, isbn).await? {
            return Err(LibraryError::NotInLibrary);
        }
        info!(%user_id, %isbn, "book removed from library");
        Ok(())
    }

    /// Rate a shelved book, 1-10 inclusive.
    pub async fn rate_book(
        &self,
        user_id: &str,
        isbn: &str,
        rating: i64,
    ) -> Result<(), LibraryError> {
        validation::validate_rating(rating).map_err(LibraryError::Validation)?;
        if !library::set_rating(&self.pool, user_id, isbn, rating).await? {
            return Err(LibraryError::NotInLibrary);
        }
        Ok(())
    }

    /// Mark or unmark a shelved book as a top-ten pick.
    pub async fn set_top_ten(
        &self,
        user_id: &str,
        isbn: &str,
        top_ten: bool,
    ) -> Result<(), LibraryError> {
        if !library::set_top_ten(&self.pool, user_id, isbn, top_ten).await? {
            return Err(LibraryError::NotInLibrary);
        }
        Ok(())
    }

    pub async fn list_books(&self, user_id: &str) -> Result<Vec<ShelfRow>, LibraryError> {
        Ok(library::list_books(&self.pool, user_id).await?)
    }

    pub async fn list_by_author(
        &self,
        user_id: &str,
        author: &str,
    ) -> Result<Vec<ShelfRow>, LibraryError> {
        Ok(library::list_books_by_author(&self.pool, user_id, author).await?)
    }

    pub async fn list_by_min_rating(
        &self,
        user_id: &str,
        min_rating: i64,
    ) -> Result<Vec<ShelfRow>, LibraryError> {
        validation::validate_rating(min_rating).map_err(LibraryError::Validation)?;
        Ok(library::list_books_by_min_rating(&self.pool, user_id, min_rating).await?)
    }

    pub async fn list_by_title(
        &self,
        user_id: &str,
        title_part: &str,
    ) -> Result<Vec<ShelfRow>, LibraryError> {
        Ok(library::list_books_by_title(&self.pool, user_id, title_part).await?)
    }

    /// The user's top-ten picks, best-rated first.
    pub async fn top_ten(&self, user_id: &str) -> Result<Vec<ShelfRow>, LibraryError> {
        Ok(library::list_top_ten(&self.pool, user_id).await?)
    }
}

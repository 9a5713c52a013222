use crate::{
    error::AppResult,
    models::{favorite::FavoriteInsert, Author, Book, BookList, BookSummary, Series, UserFavorite},
};

/// Catalog persistence abstraction
///
/// Implemented by the Postgres store for deployments and by the in-memory
/// store for development and tests. Books are always returned in insertion
/// order so vector models built from the same catalog line up row for row.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_authors(&self) -> AppResult<Vec<Author>>;
    async fn get_author(&self, author_id: &str) -> AppResult<Option<Author>>;
    /// Fails with `Conflict` if the identifier is taken
    async fn create_author(&self, author: Author) -> AppResult<Author>;
    /// Fails with `NotFound` if the author does not exist
    async fn update_author(&self, author: Author) -> AppResult<Author>;
    /// Returns whether a row was deleted. Book links to the author are removed.
    async fn delete_author(&self, author_id: &str) -> AppResult<bool>;

    async fn list_series(&self) -> AppResult<Vec<Series>>;
    async fn get_series(&self, series_id: &str) -> AppResult<Option<Series>>;
    async fn create_series(&self, series: Series) -> AppResult<Series>;

    /// Lists books, optionally filtered by a case-insensitive substring of
    /// the title or any author's name
    async fn list_books(&self, search: Option<String>) -> AppResult<Vec<Book>>;
    async fn get_book(&self, book_id: &str) -> AppResult<Option<Book>>;
    async fn create_book(&self, book: Book) -> AppResult<Book>;
    async fn update_book(&self, book: Book) -> AppResult<Book>;
    /// Returns whether a row was deleted. Favorites and list memberships cascade.
    async fn delete_book(&self, book_id: &str) -> AppResult<bool>;

    async fn list_lists(&self) -> AppResult<Vec<BookList>>;
    async fn get_list(&self, list_id: i64) -> AppResult<Option<BookList>>;
    async fn create_list(&self, list: BookList) -> AppResult<BookList>;

    /// Every book with resolved author names, in catalog order
    async fn list_book_summaries(&self) -> AppResult<Vec<BookSummary>>;

    /// A user's favorites, oldest first
    async fn list_favorites(&self, user_id: i64) -> AppResult<Vec<UserFavorite>>;
    /// Inserts a favorite unless it exists or the user already holds `limit` favorites
    async fn add_favorite(&self, user_id: i64, book_id: &str, limit: usize) -> AppResult<FavoriteInsert>;
    /// Returns whether a favorite was removed
    async fn remove_favorite(&self, user_id: i64, book_id: &str) -> AppResult<bool>;
}

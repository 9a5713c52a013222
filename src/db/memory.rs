use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    db::CatalogStore,
    error::{AppError, AppResult},
    models::{favorite::FavoriteInsert, Author, Book, BookList, BookSummary, Series, UserFavorite},
};

/// In-process catalog store
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    authors: BTreeMap<String, Author>,
    series: BTreeMap<String, Series>,
    books: HashMap<String, Book>,
    /// Book ids in insertion order
    book_order: Vec<String>,
    lists: BTreeMap<i64, BookList>,
    /// Per-user favorites, oldest first
    favorites: HashMap<i64, Vec<(String, DateTime<Utc>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryStoreInner {
    fn author_names(&self, book: &Book) -> Vec<String> {
        book.author_ids
            .iter()
            .filter_map(|id| self.authors.get(id))
            .map(|a| a.name.clone())
            .collect()
    }

    fn summary(&self, book: &Book) -> BookSummary {
        book.summary(self.author_names(book))
    }

    fn ordered_books(&self) -> impl Iterator<Item = &Book> {
        self.book_order.iter().filter_map(|id| self.books.get(id))
    }
}

#[async_trait::async_trait]
impl CatalogStore for MemoryStore {
    async fn list_authors(&self) -> AppResult<Vec<Author>> {
        let inner = self.inner.read().await;
        Ok(inner.authors.values().cloned().collect())
    }

    async fn get_author(&self, author_id: &str) -> AppResult<Option<Author>> {
        let inner = self.inner.read().await;
        Ok(inner.authors.get(author_id).cloned())
    }

    async fn create_author(&self, author: Author) -> AppResult<Author> {
        let mut inner = self.inner.write().await;
        if inner.authors.contains_key(&author.author_id) {
            return Err(AppError::Conflict(format!(
                "Author {} already exists",
                author.author_id
            )));
        }
        inner.authors.insert(author.author_id.clone(), author.clone());
        Ok(author)
    }

    async fn update_author(&self, author: Author) -> AppResult<Author> {
        let mut inner = self.inner.write().await;
        match inner.authors.get_mut(&author.author_id) {
            Some(existing) => {
                *existing = author.clone();
                Ok(author)
            }
            None => Err(AppError::NotFound(format!("Author {}", author.author_id))),
        }
    }

    async fn delete_author(&self, author_id: &str) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.authors.remove(author_id).is_none() {
            return Ok(false);
        }
        for book in inner.books.values_mut() {
            book.author_ids.retain(|id| id != author_id);
        }
        Ok(true)
    }

    async fn list_series(&self) -> AppResult<Vec<Series>> {
        let inner = self.inner.read().await;
        Ok(inner.series.values().cloned().collect())
    }

    async fn get_series(&self, series_id: &str) -> AppResult<Option<Series>> {
        let inner = self.inner.read().await;
        Ok(inner.series.get(series_id).cloned())
    }

    async fn create_series(&self, series: Series) -> AppResult<Series> {
        let mut inner = self.inner.write().await;
        if inner.series.contains_key(&series.series_id) {
            return Err(AppError::Conflict(format!(
                "Series {} already exists",
                series.series_id
            )));
        }
        inner.series.insert(series.series_id.clone(), series.clone());
        Ok(series)
    }

    async fn list_books(&self, search: Option<String>) -> AppResult<Vec<Book>> {
        let inner = self.inner.read().await;
        let needle = search.map(|s| s.to_lowercase()).filter(|s| !s.is_empty());

        let books = inner
            .ordered_books()
            .filter(|book| match &needle {
                None => true,
                Some(needle) => {
                    book.title.to_lowercase().contains(needle)
                        || inner
                            .author_names(book)
                            .iter()
                            .any(|name| name.to_lowercase().contains(needle))
                }
            })
            .cloned()
            .collect();

        Ok(books)
    }

    async fn get_book(&self, book_id: &str) -> AppResult<Option<Book>> {
        let inner = self.inner.read().await;
        Ok(inner.books.get(book_id).cloned())
    }

    async fn create_book(&self, book: Book) -> AppResult<Book> {
        let mut inner = self.inner.write().await;
        if inner.books.contains_key(&book.book_id) {
            return Err(AppError::Conflict(format!(
                "Book {} already exists",
                book.book_id
            )));
        }
        inner.book_order.push(book.book_id.clone());
        inner.books.insert(book.book_id.clone(), book.clone());
        Ok(book)
    }

    async fn update_book(&self, book: Book) -> AppResult<Book> {
        let mut inner = self.inner.write().await;
        match inner.books.get_mut(&book.book_id) {
            Some(existing) => {
                *existing = book.clone();
                Ok(book)
            }
            None => Err(AppError::NotFound(format!("Book {}", book.book_id))),
        }
    }

    async fn delete_book(&self, book_id: &str) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.books.remove(book_id).is_none() {
            return Ok(false);
        }
        inner.book_order.retain(|id| id != book_id);
        for favorites in inner.favorites.values_mut() {
            favorites.retain(|(id, _)| id != book_id);
        }
        for list in inner.lists.values_mut() {
            list.book_ids.retain(|id| id != book_id);
        }
        Ok(true)
    }

    async fn list_lists(&self) -> AppResult<Vec<BookList>> {
        let inner = self.inner.read().await;
        Ok(inner.lists.values().cloned().collect())
    }

    async fn get_list(&self, list_id: i64) -> AppResult<Option<BookList>> {
        let inner = self.inner.read().await;
        Ok(inner.lists.get(&list_id).cloned())
    }

    async fn create_list(&self, list: BookList) -> AppResult<BookList> {
        let mut inner = self.inner.write().await;
        if inner.lists.contains_key(&list.list_id) {
            return Err(AppError::Conflict(format!(
                "List {} already exists",
                list.list_id
            )));
        }
        inner.lists.insert(list.list_id, list.clone());
        Ok(list)
    }

    async fn list_book_summaries(&self) -> AppResult<Vec<BookSummary>> {
        let inner = self.inner.read().await;
        Ok(inner.ordered_books().map(|book| inner.summary(book)).collect())
    }

    async fn list_favorites(&self, user_id: i64) -> AppResult<Vec<UserFavorite>> {
        let inner = self.inner.read().await;
        let favorites = inner
            .favorites
            .get(&user_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(book_id, added_at)| {
                        inner.books.get(book_id).map(|book| UserFavorite {
                            user_id,
                            book: inner.summary(book),
                            added_at: *added_at,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(favorites)
    }

    async fn add_favorite(&self, user_id: i64, book_id: &str, limit: usize) -> AppResult<FavoriteInsert> {
        let mut inner = self.inner.write().await;
        if !inner.books.contains_key(book_id) {
            return Err(AppError::NotFound(format!("Book {}", book_id)));
        }

        let entries = inner.favorites.entry(user_id).or_default();
        if entries.iter().any(|(id, _)| id == book_id) {
            return Ok(FavoriteInsert::AlreadyPresent);
        }
        if entries.len() >= limit {
            return Ok(FavoriteInsert::LimitReached);
        }
        entries.push((book_id.to_string(), Utc::now()));
        Ok(FavoriteInsert::Added)
    }

    async fn remove_favorite(&self, user_id: i64, book_id: &str) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(entries) = inner.favorites.get_mut(&user_id) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|(id, _)| id != book_id);
        Ok(entries.len() != before)
    }
}

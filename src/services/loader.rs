use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    db::CatalogStore,
    error::{AppError, AppResult},
    models::{Author, Book, BookList, Series},
};

const BOOK_DATE_FORMAT: &str = "%Y-%m-%d";
const LIST_DATE_FORMAT: &str = "%B %d, %Y";

/// Rows written by a bulk load
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub authors: usize,
    pub series: usize,
    pub books: usize,
    pub lists: usize,
    /// Rows created only because another record referenced them
    pub placeholders: usize,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    id: Value,
    #[serde(default)]
    name: String,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    about: Option<String>,
    #[serde(default)]
    average_rating: Value,
    #[serde(default)]
    ratings_count: Value,
    #[serde(default)]
    text_reviews_count: Value,
    #[serde(default)]
    works_count: Value,
    #[serde(default)]
    fans_count: Value,
}

#[derive(Debug, Deserialize)]
struct RawSeries {
    id: Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    series_works_count: Value,
    #[serde(default)]
    primary_work_count: Value,
    #[serde(default)]
    numbered: Value,
}

#[derive(Debug, Deserialize)]
struct RawRef {
    id: Value,
}

#[derive(Debug, Deserialize)]
struct RawBook {
    id: Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    isbn: Option<String>,
    #[serde(default)]
    isbn13: Option<String>,
    #[serde(default)]
    asin: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    average_rating: Value,
    #[serde(default)]
    rating_dist: Option<String>,
    #[serde(default)]
    ratings_count: Value,
    #[serde(default)]
    text_reviews_count: Value,
    #[serde(default)]
    publication_date: Option<String>,
    #[serde(default)]
    original_publication_date: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    edition_information: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    publisher: Option<String>,
    #[serde(default)]
    num_pages: Value,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    series_id: Value,
    #[serde(default)]
    series_position: Option<String>,
    #[serde(default)]
    work_id: Value,
    #[serde(default)]
    authors: Vec<RawRef>,
    #[serde(default)]
    genres: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawCreator {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawList {
    id: Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    description_html: Option<String>,
    #[serde(default)]
    num_pages: Value,
    #[serde(default)]
    num_books: Value,
    #[serde(default)]
    num_voters: Value,
    #[serde(default)]
    created_date: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    num_likes: Value,
    #[serde(default)]
    created_by: Option<RawCreator>,
    #[serde(default)]
    num_comments: Value,
    #[serde(default)]
    books: Vec<RawRef>,
}

/// Identifiers arrive as either strings or numbers
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Counts arrive as numbers, numeric strings, or not at all
fn count(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn rating(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn date(value: Option<&str>, format: &str) -> Option<NaiveDate> {
    value.and_then(|s| NaiveDate::parse_from_str(s.trim(), format).ok())
}

impl RawAuthor {
    fn into_author(self) -> Option<Author> {
        Some(Author {
            author_id: id_string(&self.id)?,
            name: self.name,
            gender: self.gender.unwrap_or_default(),
            image_url: self.image_url.unwrap_or_default(),
            about: self.about.unwrap_or_default(),
            average_rating: rating(&self.average_rating),
            ratings_count: count(&self.ratings_count),
            text_reviews_count: count(&self.text_reviews_count),
            works_count: count(&self.works_count),
            fans_count: count(&self.fans_count),
        })
    }
}

impl RawSeries {
    fn into_series(self) -> Option<Series> {
        Some(Series {
            series_id: id_string(&self.id)?,
            title: self.title,
            description: self.description.unwrap_or_default(),
            note: self.note,
            series_works_count: count(&self.series_works_count),
            primary_work_count: count(&self.primary_work_count),
            numbered: flag(&self.numbered),
        })
    }
}

impl RawBook {
    fn into_book(self) -> Option<Book> {
        let num_pages = match count(&self.num_pages) {
            0 => None,
            pages => i32::try_from(pages).ok(),
        };

        Some(Book {
            book_id: id_string(&self.id)?,
            title: self.title,
            isbn: self.isbn.unwrap_or_default(),
            isbn13: self.isbn13.unwrap_or_default(),
            asin: self.asin.unwrap_or_default(),
            language: self.language.unwrap_or_default(),
            average_rating: rating(&self.average_rating),
            rating_dist: self.rating_dist.unwrap_or_default(),
            ratings_count: count(&self.ratings_count),
            text_reviews_count: count(&self.text_reviews_count),
            publication_date: date(self.publication_date.as_deref(), BOOK_DATE_FORMAT),
            original_publication_date: date(
                self.original_publication_date.as_deref(),
                BOOK_DATE_FORMAT,
            ),
            format: self.format.unwrap_or_default(),
            edition_information: self.edition_information.unwrap_or_default(),
            image_url: self.image_url.unwrap_or_default(),
            publisher: self.publisher.unwrap_or_default(),
            num_pages,
            description: self.description.unwrap_or_default(),
            series_id: id_string(&self.series_id),
            series_position: self.series_position.unwrap_or_default(),
            work_id: id_string(&self.work_id).unwrap_or_default(),
            author_ids: self.authors.iter().filter_map(|a| id_string(&a.id)).collect(),
            genres: self.genres,
        })
    }
}

impl RawList {
    fn into_list(self) -> Option<BookList> {
        let list_id = match &self.id {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        let (created_by_name, created_by_id) = self
            .created_by
            .map(|c| (c.name, id_string(&c.id).unwrap_or_default()))
            .unwrap_or_default();

        Some(BookList {
            list_id,
            title: self.title,
            description: self.description.unwrap_or_default(),
            description_html: self.description_html.unwrap_or_default(),
            num_pages: count(&self.num_pages),
            num_books: count(&self.num_books),
            num_voters: count(&self.num_voters),
            created_date: date(self.created_date.as_deref(), LIST_DATE_FORMAT),
            tags: self.tags,
            num_likes: count(&self.num_likes),
            created_by_name,
            created_by_id,
            num_comments: count(&self.num_comments),
            book_ids: self.books.iter().filter_map(|b| id_string(&b.id)).collect(),
        })
    }
}

/// Seeds a store from a dataset directory
///
/// Reads `authors.json`, `series.json`, `books.json` and `list.json` in that
/// order; a missing file is skipped. References to authors, series or books
/// that were never loaded get placeholder rows.
pub struct CatalogLoader<'a> {
    store: &'a dyn CatalogStore,
    report: LoadReport,
}

impl<'a> CatalogLoader<'a> {
    pub fn new(store: &'a dyn CatalogStore) -> Self {
        Self {
            store,
            report: LoadReport::default(),
        }
    }

    pub async fn load_dir(mut self, dir: impl AsRef<Path>) -> AppResult<LoadReport> {
        let dir = dir.as_ref();

        if let Some(records) = read_records::<RawAuthor>(&dir.join("authors.json")).await? {
            self.load_authors(records).await?;
        }
        if let Some(records) = read_records::<RawSeries>(&dir.join("series.json")).await? {
            self.load_series(records).await?;
        }
        if let Some(records) = read_records::<RawBook>(&dir.join("books.json")).await? {
            self.load_books(records).await?;
        }
        if let Some(records) = read_records::<RawList>(&dir.join("list.json")).await? {
            self.load_lists(records).await?;
        }

        tracing::info!(
            authors = self.report.authors,
            series = self.report.series,
            books = self.report.books,
            lists = self.report.lists,
            placeholders = self.report.placeholders,
            "Catalog loaded"
        );
        Ok(self.report)
    }

    async fn load_authors(&mut self, records: Vec<RawAuthor>) -> AppResult<()> {
        for author in records.into_iter().filter_map(RawAuthor::into_author) {
            self.store.create_author(author).await?;
            self.report.authors += 1;
        }
        Ok(())
    }

    async fn load_series(&mut self, records: Vec<RawSeries>) -> AppResult<()> {
        for series in records.into_iter().filter_map(RawSeries::into_series) {
            self.store.create_series(series).await?;
            self.report.series += 1;
        }
        Ok(())
    }

    async fn load_books(&mut self, records: Vec<RawBook>) -> AppResult<()> {
        for book in records.into_iter().filter_map(RawBook::into_book) {
            for author_id in &book.author_ids {
                if self.store.get_author(author_id).await?.is_none() {
                    self.store.create_author(Author::placeholder(author_id)).await?;
                    self.report.placeholders += 1;
                }
            }
            if let Some(series_id) = &book.series_id {
                if self.store.get_series(series_id).await?.is_none() {
                    self.store.create_series(Series::placeholder(series_id)).await?;
                    self.report.placeholders += 1;
                }
            }
            self.store.create_book(book).await?;
            self.report.books += 1;
        }
        Ok(())
    }

    async fn load_lists(&mut self, records: Vec<RawList>) -> AppResult<()> {
        for list in records.into_iter().filter_map(RawList::into_list) {
            for book_id in &list.book_ids {
                if self.store.get_book(book_id).await?.is_none() {
                    self.store.create_book(Book::placeholder(book_id)).await?;
                    self.report.placeholders += 1;
                }
            }
            self.store.create_list(list).await?;
            self.report.lists += 1;
        }
        Ok(())
    }
}

async fn read_records<T: serde::de::DeserializeOwned>(path: &Path) -> AppResult<Option<Vec<T>>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "Dataset file missing, skipping");
            return Ok(None);
        }
        Err(e) => {
            return Err(AppError::Internal(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    let records = serde_json::from_slice(&bytes).map_err(|e| {
        AppError::InvalidInput(format!("Malformed dataset file {}: {}", path.display(), e))
    })?;
    Ok(Some(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use serde_json::json;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("folio-loader-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write(dir: &Path, file: &str, value: serde_json::Value) {
        std::fs::write(dir.join(file), value.to_string()).unwrap();
    }

    #[test]
    fn test_field_coercions() {
        assert_eq!(count(&json!("12")), 12);
        assert_eq!(count(&json!(7)), 7);
        assert_eq!(count(&Value::Null), 0);
        assert_eq!(rating(&json!("4.25")), Some(4.25));
        assert!(flag(&json!("True")));
        assert!(!flag(&json!("false")));
        assert_eq!(id_string(&json!(42)), Some("42".to_string()));
        assert_eq!(
            date(Some("March 3, 2012"), LIST_DATE_FORMAT),
            NaiveDate::from_ymd_opt(2012, 3, 3)
        );
        assert_eq!(date(Some("not a date"), BOOK_DATE_FORMAT), None);
    }

    #[tokio::test]
    async fn test_load_dir_with_placeholders() {
        let dir = scratch_dir("full");
        write(&dir, "authors.json", json!([
            { "id": "a1", "name": "Ursula K. Le Guin", "ratings_count": 100, "average_rating": "4.1" }
        ]));
        write(&dir, "series.json", json!([
            { "id": "s1", "title": "Hainish Cycle", "numbered": "true", "series_works_count": "11" }
        ]));
        write(&dir, "books.json", json!([
            {
                "id": "b1",
                "title": "The Left Hand of Darkness",
                "publication_date": "1969-03-01",
                "authors": [{ "id": "a1" }, { "id": "a2" }],
                "series_id": "s1",
                "num_pages": "304",
                "genres": ["science fiction"]
            }
        ]));
        write(&dir, "list.json", json!([
            {
                "id": 9,
                "title": "Best SF",
                "created_date": "January 5, 2010",
                "created_by": { "id": 77, "name": "reader" },
                "books": [{ "id": "b1" }, { "id": "b2" }]
            }
        ]));

        let store = MemoryStore::new();
        let report = CatalogLoader::new(&store).load_dir(&dir).await.unwrap();
        assert_eq!(
            report,
            LoadReport {
                authors: 1,
                series: 1,
                books: 1,
                lists: 1,
                placeholders: 2,
            }
        );

        let book = store.get_book("b1").await.unwrap().unwrap();
        assert_eq!(book.author_ids, vec!["a1", "a2"]);
        assert_eq!(book.series_id.as_deref(), Some("s1"));
        assert_eq!(book.num_pages, Some(304));
        assert_eq!(book.publication_date, NaiveDate::from_ymd_opt(1969, 3, 1));
        assert_eq!(book.genres, vec!["science fiction"]);

        let series = store.get_series("s1").await.unwrap().unwrap();
        assert!(series.numbered);
        assert_eq!(series.series_works_count, 11);

        assert!(store.get_author("a2").await.unwrap().is_some());
        assert!(store.get_book("b2").await.unwrap().is_some());

        let list = store.get_list(9).await.unwrap().unwrap();
        assert_eq!(list.created_by_id, "77");
        assert_eq!(list.created_date, NaiveDate::from_ymd_opt(2010, 1, 5));

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_missing_files_are_skipped() {
        let dir = scratch_dir("empty");
        let store = MemoryStore::new();
        let report = CatalogLoader::new(&store).load_dir(&dir).await.unwrap();
        assert_eq!(report, LoadReport::default());
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_malformed_file_is_rejected() {
        let dir = scratch_dir("bad");
        std::fs::write(dir.join("authors.json"), "{ not json").unwrap();
        let store = MemoryStore::new();
        let result = CatalogLoader::new(&store).load_dir(&dir).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        std::fs::remove_dir_all(dir).ok();
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub mod favorite;
pub mod job;
pub mod recommendation;

pub use favorite::UserFavorite;
pub use job::{JobId, JobStatus};
pub use recommendation::{CachedRecommendations, RecommendationEpoch};

/// A book author
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Author {
    #[serde(default)]
    pub author_id: String,
    pub name: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub about: String,
    #[serde(default)]
    pub average_rating: Option<f64>,
    #[serde(default)]
    pub ratings_count: i64,
    #[serde(default)]
    pub text_reviews_count: i64,
    #[serde(default)]
    pub works_count: i64,
    #[serde(default)]
    pub fans_count: i64,
}

impl Author {
    /// Creates an author carrying only its identifier, used when a book
    /// references an author that has not been loaded yet
    pub fn placeholder(author_id: impl Into<String>) -> Self {
        Self {
            author_id: author_id.into(),
            name: String::new(),
            gender: String::new(),
            image_url: String::new(),
            about: String::new(),
            average_rating: None,
            ratings_count: 0,
            text_reviews_count: 0,
            works_count: 0,
            fans_count: 0,
        }
    }
}

/// A book series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Series {
    pub series_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub series_works_count: i64,
    #[serde(default)]
    pub primary_work_count: i64,
    #[serde(default)]
    pub numbered: bool,
}

impl Series {
    pub fn placeholder(series_id: impl Into<String>) -> Self {
        Self {
            series_id: series_id.into(),
            title: String::new(),
            description: String::new(),
            note: None,
            series_works_count: 0,
            primary_work_count: 0,
            numbered: false,
        }
    }
}

/// A catalog book
///
/// `genres` is a stored attribute; it is empty unless the loader or an API
/// client provides it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Book {
    #[serde(default)]
    pub book_id: String,
    pub title: String,
    #[serde(default)]
    pub isbn: String,
    #[serde(default)]
    pub isbn13: String,
    #[serde(default)]
    pub asin: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub average_rating: Option<f64>,
    #[serde(default)]
    pub rating_dist: String,
    #[serde(default)]
    pub ratings_count: i64,
    #[serde(default)]
    pub text_reviews_count: i64,
    #[serde(default)]
    pub publication_date: Option<NaiveDate>,
    #[serde(default)]
    pub original_publication_date: Option<NaiveDate>,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub edition_information: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub num_pages: Option<i32>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub series_id: Option<String>,
    #[serde(default)]
    pub series_position: String,
    #[serde(default)]
    pub work_id: String,
    #[serde(default)]
    pub author_ids: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl Book {
    pub fn placeholder(book_id: impl Into<String>) -> Self {
        Self::new(book_id, String::new())
    }

    /// Creates a book with a title and every optional field left empty
    pub fn new(book_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            book_id: book_id.into(),
            title: title.into(),
            isbn: String::new(),
            isbn13: String::new(),
            asin: String::new(),
            language: String::new(),
            average_rating: None,
            rating_dist: String::new(),
            ratings_count: 0,
            text_reviews_count: 0,
            publication_date: None,
            original_publication_date: None,
            format: String::new(),
            edition_information: String::new(),
            image_url: String::new(),
            publisher: String::new(),
            num_pages: None,
            description: String::new(),
            series_id: None,
            series_position: String::new(),
            work_id: String::new(),
            author_ids: Vec::new(),
            genres: Vec::new(),
        }
    }

    /// Resolves this book into a summary given its authors' names
    pub fn summary(&self, authors: Vec<String>) -> BookSummary {
        BookSummary {
            book_id: self.book_id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            authors,
            publisher: self.publisher.clone(),
            language: self.language.clone(),
            genres: self.genres.clone(),
            average_rating: self.average_rating,
            ratings_count: self.ratings_count,
            text_reviews_count: self.text_reviews_count,
        }
    }
}

/// Book with resolved author names
///
/// This is what the vectorizer reads and what recommendation results are
/// serialized as.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct BookSummary {
    pub book_id: String,
    pub title: String,
    pub description: String,
    pub authors: Vec<String>,
    pub publisher: String,
    pub language: String,
    pub genres: Vec<String>,
    pub average_rating: Option<f64>,
    pub ratings_count: i64,
    pub text_reviews_count: i64,
}

impl BookSummary {
    /// Concatenated text fields the vector model is built from
    pub fn document(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.title,
            self.description,
            self.authors.join(" "),
            self.publisher,
            self.genres.join(" ")
        )
    }
}

/// A curated book list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct BookList {
    pub list_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub description_html: String,
    #[serde(default)]
    pub num_pages: i64,
    #[serde(default)]
    pub num_books: i64,
    #[serde(default)]
    pub num_voters: i64,
    #[serde(default)]
    pub created_date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub num_likes: i64,
    #[serde(default)]
    pub created_by_name: String,
    #[serde(default)]
    pub created_by_id: String,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub book_ids: Vec<String>,
}

/// Query parameters for listing books
#[derive(Debug, Default, Deserialize)]
pub struct BookQuery {
    /// Case-insensitive match against title or author name
    pub search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_document_concatenates_text_fields() {
        let mut book = Book::new("b1", "Dune");
        book.description = "Desert planet".to_string();
        book.publisher = "Chilton".to_string();
        book.genres = vec!["science".to_string(), "fiction".to_string()];

        let summary = book.summary(vec!["Frank".to_string(), "Herbert".to_string()]);
        assert_eq!(
            summary.document(),
            "Dune Desert planet Frank Herbert Chilton science fiction"
        );
    }

    #[test]
    fn test_book_deserializes_with_defaults() {
        let book: Book = serde_json::from_str(r#"{"book_id": "42", "title": "Emma"}"#).unwrap();
        assert_eq!(book, Book::new("42", "Emma"));
    }
}

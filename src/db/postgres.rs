use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};

use crate::{
    db::CatalogStore,
    error::{AppError, AppResult},
    models::{favorite::FavoriteInsert, Author, Book, BookList, BookSummary, Series, UserFavorite},
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const AUTHOR_COLUMNS: &str = r#"
    author_id, name, gender, image_url, about, average_rating,
    ratings_count, text_reviews_count, works_count, fans_count
"#;

const SERIES_COLUMNS: &str = r#"
    series_id, title, description, note, series_works_count, primary_work_count, numbered
"#;

const BOOK_SELECT: &str = r#"
    SELECT b.book_id, b.title, b.isbn, b.isbn13, b.asin, b.language, b.average_rating,
           b.rating_dist, b.ratings_count, b.text_reviews_count, b.publication_date,
           b.original_publication_date, b.format, b.edition_information, b.image_url,
           b.publisher, b.num_pages, b.description, b.series_id, b.series_position,
           b.work_id, b.genres,
           COALESCE(
               (SELECT array_agg(ba.author_id ORDER BY ba.position)
                FROM book_authors ba WHERE ba.book_id = b.book_id),
               '{}'::text[]
           ) AS author_ids
    FROM books b
"#;

const SUMMARY_SELECT: &str = r#"
    SELECT b.book_id, b.title, b.description, b.publisher, b.language, b.genres,
           b.average_rating, b.ratings_count, b.text_reviews_count,
           COALESCE(
               (SELECT array_agg(a.name ORDER BY ba.position)
                FROM book_authors ba JOIN authors a ON a.author_id = ba.author_id
                WHERE ba.book_id = b.book_id),
               '{}'::text[]
           ) AS authors
    FROM books b
"#;

const LIST_SELECT: &str = r#"
    SELECT l.list_id, l.title, l.description, l.description_html, l.num_pages, l.num_books,
           l.num_voters, l.created_date, l.tags, l.num_likes, l.created_by_name,
           l.created_by_id, l.num_comments,
           COALESCE(
               (SELECT array_agg(lb.book_id ORDER BY lb.position)
                FROM book_list_books lb WHERE lb.list_id = l.list_id),
               '{}'::text[]
           ) AS book_ids
    FROM book_lists l
"#;

#[derive(sqlx::FromRow)]
struct FavoriteRow {
    user_id: i64,
    added_at: DateTime<Utc>,
    #[sqlx(flatten)]
    book: BookSummary,
}

/// Postgres-backed catalog store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Maps constraint violations to client errors and everything else to `Database`
fn map_write_error(e: sqlx::Error, what: &str) -> AppError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return AppError::Conflict(format!("{} already exists", what));
        }
        if db_err.is_foreign_key_violation() {
            return AppError::InvalidInput(format!("{} references a missing record", what));
        }
    }
    AppError::Database(e)
}

async fn replace_book_authors(
    tx: &mut Transaction<'_, Postgres>,
    book_id: &str,
    author_ids: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM book_authors WHERE book_id = $1")
        .bind(book_id)
        .execute(&mut **tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO book_authors (book_id, author_id, position)
        SELECT $1, ids.author_id, ids.ord::int
        FROM UNNEST($2::text[]) WITH ORDINALITY AS ids(author_id, ord)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(book_id)
    .bind(author_ids)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait::async_trait]
impl CatalogStore for PgStore {
    async fn list_authors(&self) -> AppResult<Vec<Author>> {
        let authors = sqlx::query_as::<_, Author>(&format!(
            "SELECT {} FROM authors ORDER BY id",
            AUTHOR_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(authors)
    }

    async fn get_author(&self, author_id: &str) -> AppResult<Option<Author>> {
        let author = sqlx::query_as::<_, Author>(&format!(
            "SELECT {} FROM authors WHERE author_id = $1",
            AUTHOR_COLUMNS
        ))
        .bind(author_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(author)
    }

    async fn create_author(&self, author: Author) -> AppResult<Author> {
        sqlx::query(
            r#"
            INSERT INTO authors (author_id, name, gender, image_url, about, average_rating,
                                 ratings_count, text_reviews_count, works_count, fans_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&author.author_id)
        .bind(&author.name)
        .bind(&author.gender)
        .bind(&author.image_url)
        .bind(&author.about)
        .bind(author.average_rating)
        .bind(author.ratings_count)
        .bind(author.text_reviews_count)
        .bind(author.works_count)
        .bind(author.fans_count)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &format!("Author {}", author.author_id)))?;

        Ok(author)
    }

    async fn update_author(&self, author: Author) -> AppResult<Author> {
        let result = sqlx::query(
            r#"
            UPDATE authors
            SET name = $2, gender = $3, image_url = $4, about = $5, average_rating = $6,
                ratings_count = $7, text_reviews_count = $8, works_count = $9, fans_count = $10
            WHERE author_id = $1
            "#,
        )
        .bind(&author.author_id)
        .bind(&author.name)
        .bind(&author.gender)
        .bind(&author.image_url)
        .bind(&author.about)
        .bind(author.average_rating)
        .bind(author.ratings_count)
        .bind(author.text_reviews_count)
        .bind(author.works_count)
        .bind(author.fans_count)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Author {}", author.author_id)));
        }
        Ok(author)
    }

    async fn delete_author(&self, author_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM authors WHERE author_id = $1")
            .bind(author_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_series(&self) -> AppResult<Vec<Series>> {
        let series = sqlx::query_as::<_, Series>(&format!(
            "SELECT {} FROM series ORDER BY id",
            SERIES_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(series)
    }

    async fn get_series(&self, series_id: &str) -> AppResult<Option<Series>> {
        let series = sqlx::query_as::<_, Series>(&format!(
            "SELECT {} FROM series WHERE series_id = $1",
            SERIES_COLUMNS
        ))
        .bind(series_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(series)
    }

    async fn create_series(&self, series: Series) -> AppResult<Series> {
        sqlx::query(
            r#"
            INSERT INTO series (series_id, title, description, note, series_works_count,
                                primary_work_count, numbered)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&series.series_id)
        .bind(&series.title)
        .bind(&series.description)
        .bind(&series.note)
        .bind(series.series_works_count)
        .bind(series.primary_work_count)
        .bind(series.numbered)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &format!("Series {}", series.series_id)))?;

        Ok(series)
    }

    async fn list_books(&self, search: Option<String>) -> AppResult<Vec<Book>> {
        let pattern = search
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let books = sqlx::query_as::<_, Book>(&format!(
            r#"
            {}
            WHERE $1::text IS NULL
               OR b.title ILIKE $1
               OR EXISTS (
                   SELECT 1 FROM book_authors ba JOIN authors a ON a.author_id = ba.author_id
                   WHERE ba.book_id = b.book_id AND a.name ILIKE $1
               )
            ORDER BY b.id
            "#,
            BOOK_SELECT
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    async fn get_book(&self, book_id: &str) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!("{} WHERE b.book_id = $1", BOOK_SELECT))
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    async fn create_book(&self, book: Book) -> AppResult<Book> {
        let what = format!("Book {}", book.book_id);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO books (book_id, title, isbn, isbn13, asin, language, average_rating,
                               rating_dist, ratings_count, text_reviews_count, publication_date,
                               original_publication_date, format, edition_information, image_url,
                               publisher, num_pages, description, series_id, series_position,
                               work_id, genres)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                    $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(&book.book_id)
        .bind(&book.title)
        .bind(&book.isbn)
        .bind(&book.isbn13)
        .bind(&book.asin)
        .bind(&book.language)
        .bind(book.average_rating)
        .bind(&book.rating_dist)
        .bind(book.ratings_count)
        .bind(book.text_reviews_count)
        .bind(book.publication_date)
        .bind(book.original_publication_date)
        .bind(&book.format)
        .bind(&book.edition_information)
        .bind(&book.image_url)
        .bind(&book.publisher)
        .bind(book.num_pages)
        .bind(&book.description)
        .bind(&book.series_id)
        .bind(&book.series_position)
        .bind(&book.work_id)
        .bind(&book.genres)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, &what))?;

        replace_book_authors(&mut tx, &book.book_id, &book.author_ids)
            .await
            .map_err(|e| map_write_error(e, &what))?;

        tx.commit().await?;
        Ok(book)
    }

    async fn update_book(&self, book: Book) -> AppResult<Book> {
        let what = format!("Book {}", book.book_id);
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE books
            SET title = $2, isbn = $3, isbn13 = $4, asin = $5, language = $6,
                average_rating = $7, rating_dist = $8, ratings_count = $9,
                text_reviews_count = $10, publication_date = $11,
                original_publication_date = $12, format = $13, edition_information = $14,
                image_url = $15, publisher = $16, num_pages = $17, description = $18,
                series_id = $19, series_position = $20, work_id = $21, genres = $22
            WHERE book_id = $1
            "#,
        )
        .bind(&book.book_id)
        .bind(&book.title)
        .bind(&book.isbn)
        .bind(&book.isbn13)
        .bind(&book.asin)
        .bind(&book.language)
        .bind(book.average_rating)
        .bind(&book.rating_dist)
        .bind(book.ratings_count)
        .bind(book.text_reviews_count)
        .bind(book.publication_date)
        .bind(book.original_publication_date)
        .bind(&book.format)
        .bind(&book.edition_information)
        .bind(&book.image_url)
        .bind(&book.publisher)
        .bind(book.num_pages)
        .bind(&book.description)
        .bind(&book.series_id)
        .bind(&book.series_position)
        .bind(&book.work_id)
        .bind(&book.genres)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, &what))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(what));
        }

        replace_book_authors(&mut tx, &book.book_id, &book.author_ids)
            .await
            .map_err(|e| map_write_error(e, &what))?;

        tx.commit().await?;
        Ok(book)
    }

    async fn delete_book(&self, book_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM books WHERE book_id = $1")
            .bind(book_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_lists(&self) -> AppResult<Vec<BookList>> {
        let lists = sqlx::query_as::<_, BookList>(&format!("{} ORDER BY l.id", LIST_SELECT))
            .fetch_all(&self.pool)
            .await?;
        Ok(lists)
    }

    async fn get_list(&self, list_id: i64) -> AppResult<Option<BookList>> {
        let list = sqlx::query_as::<_, BookList>(&format!("{} WHERE l.list_id = $1", LIST_SELECT))
            .bind(list_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(list)
    }

    async fn create_list(&self, list: BookList) -> AppResult<BookList> {
        let what = format!("List {}", list.list_id);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO book_lists (list_id, title, description, description_html, num_pages,
                                    num_books, num_voters, created_date, tags, num_likes,
                                    created_by_name, created_by_id, num_comments)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(list.list_id)
        .bind(&list.title)
        .bind(&list.description)
        .bind(&list.description_html)
        .bind(list.num_pages)
        .bind(list.num_books)
        .bind(list.num_voters)
        .bind(list.created_date)
        .bind(&list.tags)
        .bind(list.num_likes)
        .bind(&list.created_by_name)
        .bind(&list.created_by_id)
        .bind(list.num_comments)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, &what))?;

        sqlx::query(
            r#"
            INSERT INTO book_list_books (list_id, book_id, position)
            SELECT $1, ids.book_id, ids.ord::int
            FROM UNNEST($2::text[]) WITH ORDINALITY AS ids(book_id, ord)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(list.list_id)
        .bind(&list.book_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, &what))?;

        tx.commit().await?;
        Ok(list)
    }

    async fn list_book_summaries(&self) -> AppResult<Vec<BookSummary>> {
        let summaries = sqlx::query_as::<_, BookSummary>(&format!("{} ORDER BY b.id", SUMMARY_SELECT))
            .fetch_all(&self.pool)
            .await?;
        Ok(summaries)
    }

    async fn list_favorites(&self, user_id: i64) -> AppResult<Vec<UserFavorite>> {
        let rows = sqlx::query_as::<_, FavoriteRow>(&format!(
            r#"
            SELECT f.user_id, f.added_at, s.*
            FROM user_favorites f
            JOIN ({}) s ON s.book_id = f.book_id
            WHERE f.user_id = $1
            ORDER BY f.added_at, f.id
            "#,
            SUMMARY_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| UserFavorite {
                user_id: row.user_id,
                book: row.book,
                added_at: row.added_at,
            })
            .collect())
    }

    async fn add_favorite(&self, user_id: i64, book_id: &str, limit: usize) -> AppResult<FavoriteInsert> {
        let (book_exists, already_present): (bool, bool) = sqlx::query_as(
            r#"
            SELECT EXISTS (SELECT 1 FROM books WHERE book_id = $2),
                   EXISTS (SELECT 1 FROM user_favorites WHERE user_id = $1 AND book_id = $2)
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;

        if !book_exists {
            return Err(AppError::NotFound(format!("Book {}", book_id)));
        }
        if already_present {
            return Ok(FavoriteInsert::AlreadyPresent);
        }

        // Soft cap: the count and the insert share one statement but no lock.
        let result = sqlx::query(
            r#"
            INSERT INTO user_favorites (user_id, book_id)
            SELECT $1, $2
            WHERE (SELECT COUNT(*) FROM user_favorites WHERE user_id = $1) < $3
            ON CONFLICT (user_id, book_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(limit as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &format!("Favorite {}", book_id)))?;

        if result.rows_affected() == 1 {
            return Ok(FavoriteInsert::Added);
        }

        let present: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM user_favorites WHERE user_id = $1 AND book_id = $2)",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(if present {
            FavoriteInsert::AlreadyPresent
        } else {
            FavoriteInsert::LimitReached
        })
    }

    async fn remove_favorite(&self, user_id: i64, book_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM user_favorites WHERE user_id = $1 AND book_id = $2")
            .bind(user_id)
            .bind(book_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

//! Books repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookDetails, BookFilter, BookShort, BookSortField, NewBook},
        query::{like_pattern, Paging, Sort},
        DeleteOutcome, Suggestion,
    },
};

const BOOK_COLUMNS: &str =
    "id, author, title, publish_year, price, is_new, annotation, created_at, updated_at";

/// Catalog storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BooksRepository: Send + Sync {
    /// Filtered, sorted page of books plus the total matching count
    async fn search(
        &self,
        filter: &BookFilter,
        sort: Option<Sort<BookSortField>>,
        paging: Paging,
    ) -> AppResult<(Vec<BookShort>, i64)>;

    /// Book with its lending summary; `NotFound` for unknown or archived ids
    async fn get_details(&self, id: i32) -> AppResult<BookDetails>;

    async fn create(&self, book: &NewBook) -> AppResult<Book>;

    async fn update(&self, id: i32, book: &NewBook) -> AppResult<Book>;

    /// Archive the book unless an active issue references it. The check and
    /// the write happen under a row lock in one transaction.
    async fn delete_if_not_on_loan(&self, id: i32) -> AppResult<DeleteOutcome>;

    async fn autocomplete(&self, term: &str, limit: i64) -> AppResult<Vec<Suggestion>>;
}

#[derive(Clone)]
pub struct PgBooksRepository {
    pool: Pool<Postgres>,
}

impl PgBooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &BookFilter) {
    builder.push(" WHERE b.archived_at IS NULL");

    if let Some(ref search) = filter.search {
        let pattern = like_pattern(search);
        builder
            .push(" AND (b.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR b.author ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(is_new) = filter.is_new {
        builder.push(" AND b.is_new = ").push_bind(is_new);
    }
}

#[async_trait]
impl BooksRepository for PgBooksRepository {
    async fn search(
        &self,
        filter: &BookFilter,
        sort: Option<Sort<BookSortField>>,
        paging: Paging,
    ) -> AppResult<(Vec<BookShort>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM books b");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(
            r#"
            SELECT b.id, b.author, b.title, b.publish_year, b.price, b.is_new, b.created_at,
                   EXISTS(
                       SELECT 1 FROM issues i
                       WHERE i.book_id = b.id AND i.returned_at IS NULL
                   ) AS on_loan
            FROM books b
            "#,
        );
        push_filter(&mut select, filter);

        let order = match sort {
            Some(sort) => format!("{}, b.id", sort.to_sql()),
            None => "b.created_at DESC, b.id DESC".to_string(),
        };
        select
            .push(" ORDER BY ")
            .push(order)
            .push(" LIMIT ")
            .push_bind(paging.per_page)
            .push(" OFFSET ")
            .push_bind(paging.offset());

        let books = select
            .build_query_as::<BookShort>()
            .fetch_all(&self.pool)
            .await?;

        Ok((books, total))
    }

    async fn get_details(&self, id: i32) -> AppResult<BookDetails> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE id = $1 AND archived_at IS NULL",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        let (on_loan, issue_count): (bool, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(BOOL_OR(returned_at IS NULL), FALSE), COUNT(*)
            FROM issues
            WHERE book_id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(BookDetails {
            book,
            on_loan,
            issue_count,
        })
    }

    async fn create(&self, book: &NewBook) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (author, title, publish_year, price, is_new, annotation)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(&book.author)
        .bind(&book.title)
        .bind(book.publish_year)
        .bind(book.price)
        .bind(book.is_new)
        .bind(&book.annotation)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn update(&self, id: i32, book: &NewBook) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books
            SET author = $2, title = $3, publish_year = $4, price = $5,
                is_new = $6, annotation = $7, updated_at = NOW()
            WHERE id = $1 AND archived_at IS NULL
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(id)
        .bind(&book.author)
        .bind(&book.title)
        .bind(book.publish_year)
        .bind(book.price)
        .bind(book.is_new)
        .bind(&book.annotation)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn delete_if_not_on_loan(&self, id: i32) -> AppResult<DeleteOutcome> {
        let mut tx = self.pool.begin().await?;

        // Issue creation locks the same row, so no loan can start in between
        let locked: Option<i32> = sqlx::query_scalar(
            "SELECT id FROM books WHERE id = $1 AND archived_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if locked.is_none() {
            return Ok(DeleteOutcome::NotFound);
        }

        let on_loan: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM issues WHERE book_id = $1 AND returned_at IS NULL)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if on_loan {
            return Ok(DeleteOutcome::HasActiveIssues);
        }

        sqlx::query("UPDATE books SET archived_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(DeleteOutcome::Deleted)
    }

    async fn autocomplete(&self, term: &str, limit: i64) -> AppResult<Vec<Suggestion>> {
        let suggestions = sqlx::query_as::<_, Suggestion>(
            r#"
            SELECT id, title || ' / ' || author AS label
            FROM books
            WHERE archived_at IS NULL AND (title ILIKE $1 OR author ILIKE $1)
            ORDER BY title
            LIMIT $2
            "#,
        )
        .bind(like_pattern(term))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(suggestions)
    }
}

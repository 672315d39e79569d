//! Readers repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::{is_unique_violation, AppError, AppResult},
    models::{
        query::{like_pattern, Paging, Sort},
        reader::{NewReader, Reader, ReaderFilter, ReaderShort, ReaderSortField, RosterRow},
        DeleteOutcome, Suggestion,
    },
};

const READER_COLUMNS: &str = "id, card_number, name, address, phone, created_at, updated_at";

const CARD_NUMBER_CONSTRAINT: &str = "readers_card_number_key";

/// Roster storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReadersRepository: Send + Sync {
    /// Filtered, sorted page of readers with lending counters plus the total
    /// matching count
    async fn search(
        &self,
        filter: &ReaderFilter,
        sort: Option<Sort<ReaderSortField>>,
        paging: Paging,
    ) -> AppResult<(Vec<ReaderShort>, i64)>;

    /// `NotFound` for unknown or archived ids
    async fn get_by_id(&self, id: i32) -> AppResult<Reader>;

    /// Whether any reader (archived ones included) holds this card number
    async fn card_number_exists(&self, card_number: &str, exclude_id: Option<i32>) -> AppResult<bool>;

    /// All card numbers starting with `<prefix>-`
    async fn card_numbers_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>>;

    /// Insert a reader; a card number clash yields `DuplicateCard`
    async fn create(&self, reader: &NewReader) -> AppResult<Reader>;

    async fn update(&self, id: i32, reader: &NewReader) -> AppResult<Reader>;

    /// Archive the reader unless they hold a book. The check and the write
    /// happen under a row lock in one transaction.
    async fn delete_if_no_active_issues(&self, id: i32) -> AppResult<DeleteOutcome>;

    async fn autocomplete(&self, term: &str, limit: i64) -> AppResult<Vec<Suggestion>>;

    /// Every active reader with lending counters, ordered by name
    async fn roster_rows(&self) -> AppResult<Vec<RosterRow>>;
}

#[derive(Clone)]
pub struct PgReadersRepository {
    pool: Pool<Postgres>,
}

impl PgReadersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &ReaderFilter) {
    builder.push(" WHERE r.archived_at IS NULL");

    if let Some(ref search) = filter.search {
        let pattern = like_pattern(search);
        builder
            .push(" AND (r.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR r.card_number ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    match filter.has_books {
        Some(true) => {
            builder.push(
                " AND EXISTS (SELECT 1 FROM issues i WHERE i.reader_id = r.id AND i.returned_at IS NULL)",
            );
        }
        Some(false) => {
            builder.push(
                " AND NOT EXISTS (SELECT 1 FROM issues i WHERE i.reader_id = r.id AND i.returned_at IS NULL)",
            );
        }
        None => {}
    }
}

fn map_card_conflict(e: sqlx::Error, card_number: &str) -> AppError {
    if is_unique_violation(&e, CARD_NUMBER_CONSTRAINT) {
        AppError::DuplicateCard(card_number.to_string())
    } else {
        AppError::Database(e)
    }
}

#[async_trait]
impl ReadersRepository for PgReadersRepository {
    async fn search(
        &self,
        filter: &ReaderFilter,
        sort: Option<Sort<ReaderSortField>>,
        paging: Paging,
    ) -> AppResult<(Vec<ReaderShort>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM readers r");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(
            r#"
            SELECT r.id, r.card_number, r.name, r.phone, r.created_at,
                   (SELECT COUNT(*) FROM issues i
                    WHERE i.reader_id = r.id AND i.returned_at IS NULL) AS active_issues,
                   (SELECT COUNT(*) FROM issues i WHERE i.reader_id = r.id) AS total_issues
            FROM readers r
            "#,
        );
        push_filter(&mut select, filter);

        let order = match sort {
            Some(sort) => format!("{}, r.id", sort.to_sql()),
            None => "r.created_at DESC, r.id DESC".to_string(),
        };
        select
            .push(" ORDER BY ")
            .push(order)
            .push(" LIMIT ")
            .push_bind(paging.per_page)
            .push(" OFFSET ")
            .push_bind(paging.offset());

        let readers = select
            .build_query_as::<ReaderShort>()
            .fetch_all(&self.pool)
            .await?;

        Ok((readers, total))
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Reader> {
        sqlx::query_as::<_, Reader>(&format!(
            "SELECT {} FROM readers WHERE id = $1 AND archived_at IS NULL",
            READER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Reader with id {} not found", id)))
    }

    async fn card_number_exists(&self, card_number: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM readers
                WHERE card_number = $1 AND ($2::INTEGER IS NULL OR id != $2)
            )
            "#,
        )
        .bind(card_number)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn card_numbers_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>> {
        let cards = sqlx::query_scalar::<_, String>(
            "SELECT card_number FROM readers WHERE card_number LIKE $1",
        )
        .bind(format!("{}-%", prefix))
        .fetch_all(&self.pool)
        .await?;
        Ok(cards)
    }

    async fn create(&self, reader: &NewReader) -> AppResult<Reader> {
        sqlx::query_as::<_, Reader>(&format!(
            r#"
            INSERT INTO readers (card_number, name, address, phone)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            READER_COLUMNS
        ))
        .bind(&reader.card_number)
        .bind(&reader.name)
        .bind(&reader.address)
        .bind(&reader.phone)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_card_conflict(e, &reader.card_number))
    }

    async fn update(&self, id: i32, reader: &NewReader) -> AppResult<Reader> {
        sqlx::query_as::<_, Reader>(&format!(
            r#"
            UPDATE readers
            SET card_number = $2, name = $3, address = $4, phone = $5, updated_at = NOW()
            WHERE id = $1 AND archived_at IS NULL
            RETURNING {}
            "#,
            READER_COLUMNS
        ))
        .bind(id)
        .bind(&reader.card_number)
        .bind(&reader.name)
        .bind(&reader.address)
        .bind(&reader.phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_card_conflict(e, &reader.card_number))?
        .ok_or_else(|| AppError::NotFound(format!("Reader with id {} not found", id)))
    }

    async fn delete_if_no_active_issues(&self, id: i32) -> AppResult<DeleteOutcome> {
        let mut tx = self.pool.begin().await?;

        // Issue creation takes a share lock on the reader row
        let locked: Option<i32> = sqlx::query_scalar(
            "SELECT id FROM readers WHERE id = $1 AND archived_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if locked.is_none() {
            return Ok(DeleteOutcome::NotFound);
        }

        let holds_books: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM issues WHERE reader_id = $1 AND returned_at IS NULL)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if holds_books {
            return Ok(DeleteOutcome::HasActiveIssues);
        }

        sqlx::query("UPDATE readers SET archived_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(DeleteOutcome::Deleted)
    }

    async fn autocomplete(&self, term: &str, limit: i64) -> AppResult<Vec<Suggestion>> {
        let suggestions = sqlx::query_as::<_, Suggestion>(
            r#"
            SELECT id, name || ' (' || card_number || ')' AS label
            FROM readers
            WHERE archived_at IS NULL AND (name ILIKE $1 OR card_number ILIKE $1)
            ORDER BY name
            LIMIT $2
            "#,
        )
        .bind(like_pattern(term))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(suggestions)
    }

    async fn roster_rows(&self) -> AppResult<Vec<RosterRow>> {
        let rows = sqlx::query_as::<_, RosterRow>(
            r#"
            SELECT r.card_number, r.name, r.address, r.phone, r.created_at,
                   COUNT(i.id) FILTER (WHERE i.returned_at IS NULL) AS active_issues,
                   COUNT(i.id) AS total_issues
            FROM readers r
            LEFT JOIN issues i ON i.reader_id = r.id
            WHERE r.archived_at IS NULL
            GROUP BY r.id
            ORDER BY r.name, r.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

//! Issues repository: the lending ledger

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::{is_unique_violation, AppError, AppResult},
    models::{
        issue::{
            overdue_cutoff, Issue, IssueFilter, IssueRecord, IssueStatusFilter, NewIssue,
            ReturnOutcome,
        },
        query::Paging,
    },
};

const ISSUE_COLUMNS: &str = "id, book_id, reader_id, issued_by, issued_at, returned_at";

const ONE_ACTIVE_PER_BOOK: &str = "issues_one_active_per_book";

const ISSUE_RECORD_SELECT: &str = r#"
    SELECT i.id, i.book_id, b.title AS book_title, b.author AS book_author,
           i.reader_id, r.name AS reader_name, r.card_number AS reader_card_number,
           i.issued_by, s.display_name AS issuer_name,
           i.issued_at, i.returned_at
    FROM issues i
    JOIN books b ON b.id = i.book_id
    JOIN readers r ON r.id = i.reader_id
    JOIN staff_users s ON s.id = i.issued_by
"#;

/// Ledger storage. Issues are never deleted; the only mutation after
/// creation is setting the return timestamp once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IssuesRepository: Send + Sync {
    /// Filtered page of issues, most recent first, plus the total count.
    /// `now` decides which active issues count as overdue.
    async fn search(
        &self,
        filter: &IssueFilter,
        paging: Paging,
        now: DateTime<Utc>,
    ) -> AppResult<(Vec<IssueRecord>, i64)>;

    async fn get_by_id(&self, id: i32) -> AppResult<IssueRecord>;

    /// Full lending history of a reader, most recent first
    async fn for_reader(&self, reader_id: i32) -> AppResult<Vec<IssueRecord>>;

    /// Record a new issue. Fails with `NotFound` when the book or reader is
    /// missing and with `BookOnLoan` when the book is already out.
    async fn create(&self, issue: &NewIssue) -> AppResult<Issue>;

    /// Set the return timestamp if the issue is still active
    async fn mark_returned(&self, id: i32, at: DateTime<Utc>) -> AppResult<ReturnOutcome>;
}

#[derive(Clone)]
pub struct PgIssuesRepository {
    pool: Pool<Postgres>,
}

impl PgIssuesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &IssueFilter, now: DateTime<Utc>) {
    builder.push(" WHERE 1 = 1");

    match filter.status {
        Some(IssueStatusFilter::Active) => {
            builder.push(" AND i.returned_at IS NULL");
        }
        Some(IssueStatusFilter::Returned) => {
            builder.push(" AND i.returned_at IS NOT NULL");
        }
        Some(IssueStatusFilter::Overdue) => {
            builder
                .push(" AND i.returned_at IS NULL AND i.issued_at <= ")
                .push_bind(overdue_cutoff(now));
        }
        None => {}
    }

    if let Some(reader_id) = filter.reader_id {
        builder.push(" AND i.reader_id = ").push_bind(reader_id);
    }

    if let Some(book_id) = filter.book_id {
        builder.push(" AND i.book_id = ").push_bind(book_id);
    }
}

#[async_trait]
impl IssuesRepository for PgIssuesRepository {
    async fn search(
        &self,
        filter: &IssueFilter,
        paging: Paging,
        now: DateTime<Utc>,
    ) -> AppResult<(Vec<IssueRecord>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM issues i");
        push_filter(&mut count, filter, now);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(ISSUE_RECORD_SELECT);
        push_filter(&mut select, filter, now);
        select
            .push(" ORDER BY i.issued_at DESC, i.id DESC LIMIT ")
            .push_bind(paging.per_page)
            .push(" OFFSET ")
            .push_bind(paging.offset());

        let issues = select
            .build_query_as::<IssueRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok((issues, total))
    }

    async fn get_by_id(&self, id: i32) -> AppResult<IssueRecord> {
        sqlx::query_as::<_, IssueRecord>(&format!("{} WHERE i.id = $1", ISSUE_RECORD_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Issue with id {} not found", id)))
    }

    async fn for_reader(&self, reader_id: i32) -> AppResult<Vec<IssueRecord>> {
        let issues = sqlx::query_as::<_, IssueRecord>(&format!(
            "{} WHERE i.reader_id = $1 ORDER BY i.issued_at DESC, i.id DESC",
            ISSUE_RECORD_SELECT
        ))
        .bind(reader_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(issues)
    }

    async fn create(&self, issue: &NewIssue) -> AppResult<Issue> {
        let mut tx = self.pool.begin().await?;

        // Same lock as book archiving; serializes concurrent issues of one book
        let book: Option<i32> = sqlx::query_scalar(
            "SELECT id FROM books WHERE id = $1 AND archived_at IS NULL FOR UPDATE",
        )
        .bind(issue.book_id)
        .fetch_optional(&mut *tx)
        .await?;
        if book.is_none() {
            return Err(AppError::NotFound(format!(
                "Book with id {} not found",
                issue.book_id
            )));
        }

        let reader: Option<i32> = sqlx::query_scalar(
            "SELECT id FROM readers WHERE id = $1 AND archived_at IS NULL FOR SHARE",
        )
        .bind(issue.reader_id)
        .fetch_optional(&mut *tx)
        .await?;
        if reader.is_none() {
            return Err(AppError::NotFound(format!(
                "Reader with id {} not found",
                issue.reader_id
            )));
        }

        let on_loan: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM issues WHERE book_id = $1 AND returned_at IS NULL)",
        )
        .bind(issue.book_id)
        .fetch_one(&mut *tx)
        .await?;
        if on_loan {
            return Err(AppError::BookOnLoan(issue.book_id));
        }

        let created = sqlx::query_as::<_, Issue>(&format!(
            r#"
            INSERT INTO issues (book_id, reader_id, issued_by, issued_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            ISSUE_COLUMNS
        ))
        .bind(issue.book_id)
        .bind(issue.reader_id)
        .bind(issue.issued_by)
        .bind(issue.issued_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, ONE_ACTIVE_PER_BOOK) {
                AppError::BookOnLoan(issue.book_id)
            } else {
                AppError::Database(e)
            }
        })?;

        tx.commit().await?;
        Ok(created)
    }

    async fn mark_returned(&self, id: i32, at: DateTime<Utc>) -> AppResult<ReturnOutcome> {
        let returned = sqlx::query_as::<_, Issue>(&format!(
            r#"
            UPDATE issues
            SET returned_at = GREATEST($2, issued_at)
            WHERE id = $1 AND returned_at IS NULL
            RETURNING {}
            "#,
            ISSUE_COLUMNS
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(issue) = returned {
            return Ok(ReturnOutcome::Returned(issue));
        }

        let existing = sqlx::query_as::<_, Issue>(&format!(
            "SELECT {} FROM issues WHERE id = $1",
            ISSUE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match existing {
            Some(issue) => ReturnOutcome::AlreadyReturned(issue),
            None => ReturnOutcome::NotFound,
        })
    }
}

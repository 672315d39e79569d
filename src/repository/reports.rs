//! Read-only aggregates over books, readers, issues and staff

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        book::BookShort,
        issue::overdue_cutoff,
        report::{BookIssueCount, BookStats, LibraryOverview, ReaderIssueCount, StaffIssueCount},
    },
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportsRepository: Send + Sync {
    /// Headline counters as seen at `now`
    async fn overview(&self, now: DateTime<Utc>) -> AppResult<LibraryOverview>;

    /// Catalog counters plus the top `limit` most issued and most recent books
    async fn book_stats(&self, limit: i64) -> AppResult<BookStats>;

    /// Readers ranked by total issues
    async fn top_readers(&self, limit: i64) -> AppResult<Vec<ReaderIssueCount>>;

    /// Issues recorded per staff member
    async fn issues_by_staff(&self) -> AppResult<Vec<StaffIssueCount>>;
}

#[derive(Clone)]
pub struct PgReportsRepository {
    pool: Pool<Postgres>,
}

impl PgReportsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportsRepository for PgReportsRepository {
    async fn overview(&self, now: DateTime<Utc>) -> AppResult<LibraryOverview> {
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(now);

        let row: (i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM books WHERE archived_at IS NULL),
                (SELECT COUNT(*) FROM readers WHERE archived_at IS NULL),
                (SELECT COUNT(DISTINCT reader_id) FROM issues WHERE returned_at IS NULL),
                (SELECT COUNT(*) FROM issues WHERE returned_at IS NULL),
                (SELECT COUNT(*) FROM issues WHERE returned_at IS NULL AND issued_at <= $1),
                (SELECT COUNT(*) FROM issues WHERE returned_at >= $2)
            "#,
        )
        .bind(overdue_cutoff(now))
        .bind(day_start)
        .fetch_one(&self.pool)
        .await?;

        Ok(LibraryOverview {
            books: row.0,
            readers: row.1,
            readers_with_books: row.2,
            active_issues: row.3,
            overdue_issues: row.4,
            returned_today: row.5,
        })
    }

    async fn book_stats(&self, limit: i64) -> AppResult<BookStats> {
        let (total, new): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE is_new)
            FROM books
            WHERE archived_at IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let most_issued = sqlx::query_as::<_, BookIssueCount>(
            r#"
            SELECT b.id, b.author, b.title, COUNT(i.id) AS issue_count
            FROM books b
            JOIN issues i ON i.book_id = b.id
            WHERE b.archived_at IS NULL
            GROUP BY b.id
            ORDER BY issue_count DESC, b.title
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let most_recent = sqlx::query_as::<_, BookShort>(
            r#"
            SELECT b.id, b.author, b.title, b.publish_year, b.price, b.is_new, b.created_at,
                   EXISTS(
                       SELECT 1 FROM issues i
                       WHERE i.book_id = b.id AND i.returned_at IS NULL
                   ) AS on_loan
            FROM books b
            WHERE b.archived_at IS NULL
            ORDER BY b.created_at DESC, b.id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(BookStats {
            total,
            new,
            old: total - new,
            most_issued,
            most_recent,
        })
    }

    async fn top_readers(&self, limit: i64) -> AppResult<Vec<ReaderIssueCount>> {
        let readers = sqlx::query_as::<_, ReaderIssueCount>(
            r#"
            SELECT r.id, r.card_number, r.name,
                   COUNT(i.id) FILTER (WHERE i.returned_at IS NULL) AS active_issues,
                   COUNT(i.id) AS total_issues
            FROM readers r
            JOIN issues i ON i.reader_id = r.id
            WHERE r.archived_at IS NULL
            GROUP BY r.id
            ORDER BY total_issues DESC, r.name
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(readers)
    }

    async fn issues_by_staff(&self) -> AppResult<Vec<StaffIssueCount>> {
        let staff = sqlx::query_as::<_, StaffIssueCount>(
            r#"
            SELECT s.id, s.login, s.display_name,
                   COUNT(i.id) AS total_issues,
                   COUNT(i.id) FILTER (WHERE i.returned_at IS NULL) AS active_issues
            FROM staff_users s
            LEFT JOIN issues i ON i.issued_by = s.id
            GROUP BY s.id
            ORDER BY total_issues DESC, s.login
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(staff)
    }
}

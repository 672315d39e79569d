//! Read-only aggregates over the catalog, roster and ledger

use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

use super::book::BookShort;

/// How many entries the "top" lists carry
pub const TOP_LIMIT: i64 = 5;

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct LibraryOverview {
    pub books: i64,
    pub readers: i64,
    /// Readers currently holding at least one book
    pub readers_with_books: i64,
    pub active_issues: i64,
    pub overdue_issues: i64,
    pub returned_today: i64,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct BookIssueCount {
    pub id: i32,
    pub author: String,
    pub title: String,
    pub issue_count: i64,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct BookStats {
    pub total: i64,
    pub new: i64,
    pub old: i64,
    /// Most frequently issued books
    pub most_issued: Vec<BookIssueCount>,
    /// Most recently added books
    pub most_recent: Vec<BookShort>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ReaderIssueCount {
    pub id: i32,
    pub card_number: String,
    pub name: String,
    pub active_issues: i64,
    pub total_issues: i64,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct StaffIssueCount {
    pub id: i32,
    pub login: String,
    pub display_name: String,
    /// Issues recorded by this staff member
    pub total_issues: i64,
    /// Of those, still active
    pub active_issues: i64,
}

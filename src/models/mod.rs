//! Data models for Bibliodesk

pub mod book;
pub mod issue;
pub mod query;
pub mod reader;
pub mod report;
pub mod staff;

// Re-export commonly used types
pub use book::{Book, BookDetails, BookShort};
pub use issue::{Issue, IssueDetails, LoanStatus};
pub use query::{Paging, Sort, Suggestion};
pub use reader::{Reader, ReaderDetails, ReaderShort};
pub use staff::{StaffClaims, StaffRole, StaffUser};

/// Outcome of a delete guarded by "no active issue references the record"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    HasActiveIssues,
    NotFound,
}

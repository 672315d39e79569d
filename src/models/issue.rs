//! Issue (lending ledger record) model and loan-term computation

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::query::Paging;
use crate::error::{push_field_error, AppError, AppResult, FieldErrors};

/// Loan period in days; an active issue older than this is overdue
pub const LOAN_PERIOD_DAYS: i64 = 30;

/// Issue record from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Issue {
    pub id: i32,
    pub book_id: i32,
    pub reader_id: i32,
    pub issued_by: i32,
    pub issued_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

/// Issue joined with the book, reader and issuer it references
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct IssueRecord {
    pub id: i32,
    pub book_id: i32,
    pub book_title: String,
    pub book_author: String,
    pub reader_id: i32,
    pub reader_name: String,
    pub reader_card_number: String,
    pub issued_by: i32,
    pub issuer_name: String,
    pub issued_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Returned,
}

/// Values derived from the two ledger timestamps, never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanTerms {
    pub status: LoanStatus,
    /// Whole days between issue and return (or `now` while active)
    pub days_on_loan: i64,
    /// Days past the loan period; for returned issues, how late the return was
    pub overdue_days: i64,
    /// Only active issues can be overdue
    pub is_overdue: bool,
}

/// Compute the loan terms of an issue as seen at `now`
pub fn loan_terms(
    issued_at: DateTime<Utc>,
    returned_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> LoanTerms {
    let status = if returned_at.is_some() {
        LoanStatus::Returned
    } else {
        LoanStatus::Active
    };
    let end = returned_at.unwrap_or(now);
    let days_on_loan = (end - issued_at).num_days().max(0);
    let overdue_days = (days_on_loan - LOAN_PERIOD_DAYS).max(0);

    LoanTerms {
        status,
        days_on_loan,
        overdue_days,
        is_overdue: status == LoanStatus::Active && overdue_days > 0,
    }
}

/// Active issues issued at or before this instant are overdue at `now`
pub fn overdue_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(LOAN_PERIOD_DAYS + 1)
}

/// Issue with related names and derived loan terms
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IssueDetails {
    pub id: i32,
    pub book_id: i32,
    pub book_title: String,
    pub book_author: String,
    pub reader_id: i32,
    pub reader_name: String,
    pub reader_card_number: String,
    pub issued_by: i32,
    pub issuer_name: String,
    pub issued_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub days_on_loan: i64,
    pub overdue_days: i64,
    pub is_overdue: bool,
}

impl IssueDetails {
    pub fn from_record(record: IssueRecord, now: DateTime<Utc>) -> Self {
        let terms = loan_terms(record.issued_at, record.returned_at, now);
        Self {
            id: record.id,
            book_id: record.book_id,
            book_title: record.book_title,
            book_author: record.book_author,
            reader_id: record.reader_id,
            reader_name: record.reader_name,
            reader_card_number: record.reader_card_number,
            issued_by: record.issued_by,
            issuer_name: record.issuer_name,
            issued_at: record.issued_at,
            returned_at: record.returned_at,
            status: terms.status,
            days_on_loan: terms.days_on_loan,
            overdue_days: terms.overdue_days,
            is_overdue: terms.is_overdue,
        }
    }
}

/// Issue creation payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct IssueForm {
    pub book_id: Option<i32>,
    pub reader_id: Option<i32>,
    /// Defaults to now
    pub issued_at: Option<DateTime<Utc>>,
}

/// Validated issue ready to be recorded
#[derive(Debug, Clone, PartialEq)]
pub struct NewIssue {
    pub book_id: i32,
    pub reader_id: i32,
    pub issued_by: i32,
    pub issued_at: DateTime<Utc>,
}

impl IssueForm {
    /// Validate the form; `issued_by` comes from the request context
    pub fn validate_for(&self, issued_by: i32, now: DateTime<Utc>) -> AppResult<NewIssue> {
        let mut fields = FieldErrors::new();
        if self.book_id.is_none() {
            push_field_error(&mut fields, "book_id", "Book is required");
        }
        if self.reader_id.is_none() {
            push_field_error(&mut fields, "reader_id", "Reader is required");
        }
        if matches!(self.issued_at, Some(at) if at > now) {
            push_field_error(&mut fields, "issued_at", "Issue date cannot be in the future");
        }

        match (self.book_id, self.reader_id) {
            (Some(book_id), Some(reader_id)) if fields.is_empty() => Ok(NewIssue {
                book_id,
                reader_id,
                issued_by,
                issued_at: self.issued_at.unwrap_or(now),
            }),
            _ => Err(AppError::validation(fields, self)),
        }
    }
}

/// Outcome of the conditional "set return timestamp if still active" update
#[derive(Debug, Clone)]
pub enum ReturnOutcome {
    Returned(Issue),
    /// The issue was already returned; carries the untouched record
    AlreadyReturned(Issue),
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatusFilter {
    Active,
    Returned,
    /// Active and past the loan period
    Overdue,
}

/// Issue list filter; set fields are combined with AND
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueFilter {
    pub status: Option<IssueStatusFilter>,
    pub reader_id: Option<i32>,
    pub book_id: Option<i32>,
}

/// Issue list query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct IssueQuery {
    /// active, returned or overdue
    pub status: Option<IssueStatusFilter>,
    pub reader_id: Option<i32>,
    pub book_id: Option<i32>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl IssueQuery {
    pub fn filter(&self) -> IssueFilter {
        IssueFilter {
            status: self.status,
            reader_id: self.reader_id,
            book_id: self.book_id,
        }
    }

    pub fn paging(&self) -> Paging {
        Paging::new(self.page, self.per_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_overdue_after_45_days() {
        let terms = loan_terms(t0(), None, t0() + Duration::days(45));
        assert_eq!(terms.status, LoanStatus::Active);
        assert_eq!(terms.days_on_loan, 45);
        assert_eq!(terms.overdue_days, 15);
        assert!(terms.is_overdue);
    }

    #[test]
    fn test_not_overdue_after_10_days() {
        let terms = loan_terms(t0(), None, t0() + Duration::days(10));
        assert_eq!(terms.overdue_days, 0);
        assert!(!terms.is_overdue);
    }

    #[test]
    fn test_loan_period_boundary() {
        let at_30 = loan_terms(t0(), None, t0() + Duration::days(30) + Duration::hours(23));
        assert!(!at_30.is_overdue);
        let at_31 = loan_terms(t0(), None, t0() + Duration::days(31));
        assert_eq!(at_31.overdue_days, 1);
        assert!(at_31.is_overdue);
        assert!(t0() <= overdue_cutoff(t0() + Duration::days(31)));
        assert!(t0() > overdue_cutoff(t0() + Duration::days(30) + Duration::hours(23)));
    }

    #[test]
    fn test_returned_issue_is_never_overdue() {
        let returned = t0() + Duration::days(40);
        let terms = loan_terms(t0(), Some(returned), t0() + Duration::days(90));
        assert_eq!(terms.status, LoanStatus::Returned);
        assert_eq!(terms.days_on_loan, 40);
        assert_eq!(terms.overdue_days, 10);
        assert!(!terms.is_overdue);
    }

    #[test]
    fn test_future_issue_date_clamps_to_zero() {
        let terms = loan_terms(t0() + Duration::days(2), None, t0());
        assert_eq!(terms.days_on_loan, 0);
    }

    #[test]
    fn test_issue_form() {
        let now = t0();
        let form = IssueForm {
            book_id: Some(1),
            reader_id: Some(2),
            issued_at: None,
        };
        let issue = form.validate_for(7, now).unwrap();
        assert_eq!(issue.issued_at, now);
        assert_eq!(issue.issued_by, 7);

        let form = IssueForm {
            book_id: None,
            reader_id: Some(2),
            issued_at: Some(now + Duration::days(1)),
        };
        match form.validate_for(7, now) {
            Err(AppError::Validation { fields, .. }) => {
                assert!(fields.contains_key("book_id"));
                assert!(fields.contains_key("issued_at"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

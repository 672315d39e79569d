//! Lending ledger service: issue and return books

use chrono::Utc;

use crate::{
    error::{AppError, AppResult},
    models::{
        issue::{IssueDetails, IssueFilter, IssueForm, ReturnOutcome},
        query::Paging,
        StaffClaims,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct LedgerService {
    repository: Repository,
}

impl LedgerService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Issues matching the filter, most recent first, with loan terms as of now
    pub async fn search_issues(
        &self,
        filter: &IssueFilter,
        paging: Paging,
    ) -> AppResult<(Vec<IssueDetails>, i64)> {
        let now = Utc::now();
        let (records, total) = self.repository.issues.search(filter, paging, now).await?;
        let issues = records
            .into_iter()
            .map(|record| IssueDetails::from_record(record, now))
            .collect();
        Ok((issues, total))
    }

    pub async fn get_issue(&self, id: i32) -> AppResult<IssueDetails> {
        let record = self.repository.issues.get_by_id(id).await?;
        Ok(IssueDetails::from_record(record, Utc::now()))
    }

    /// Lend a book to a reader on behalf of the authenticated staff member
    pub async fn issue_book(&self, form: &IssueForm, staff: &StaffClaims) -> AppResult<IssueDetails> {
        let issue = form.validate_for(staff.user_id, Utc::now())?;
        let created = self.repository.issues.create(&issue).await?;
        tracing::info!(
            issue_id = created.id,
            book_id = created.book_id,
            reader_id = created.reader_id,
            issued_by = created.issued_by,
            "Book issued"
        );
        self.get_issue(created.id).await
    }

    /// Close an active issue. Returning twice fails and leaves the first
    /// return timestamp in place.
    pub async fn return_book(&self, id: i32) -> AppResult<IssueDetails> {
        match self.repository.issues.mark_returned(id, Utc::now()).await? {
            ReturnOutcome::Returned(issue) => {
                tracing::info!(issue_id = issue.id, book_id = issue.book_id, "Book returned");
                self.get_issue(issue.id).await
            }
            ReturnOutcome::AlreadyReturned(issue) => {
                tracing::warn!(issue_id = issue.id, "Issue already returned at {:?}", issue.returned_at);
                Err(AppError::AlreadyReturned(issue.id))
            }
            ReturnOutcome::NotFound => {
                Err(AppError::NotFound(format!("Issue with id {} not found", id)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        issue::{Issue, IssueRecord, LoanStatus},
        StaffRole,
    };
    use crate::repository::mock::MockRepositoryBuilder;
    use chrono::{DateTime, Duration};

    fn staff() -> StaffClaims {
        StaffClaims {
            sub: "anna".to_string(),
            user_id: 7,
            role: StaffRole::Librarian,
            exp: 0,
            iat: 0,
        }
    }

    fn record(id: i32, issued_at: DateTime<Utc>, returned_at: Option<DateTime<Utc>>) -> IssueRecord {
        IssueRecord {
            id,
            book_id: 1,
            book_title: "Война и мир".to_string(),
            book_author: "Лев Толстой".to_string(),
            reader_id: 2,
            reader_name: "Иванов Иван".to_string(),
            reader_card_number: "ЧБ-00001".to_string(),
            issued_by: 7,
            issuer_name: "Anna".to_string(),
            issued_at,
            returned_at,
        }
    }

    fn issue(id: i32, issued_at: DateTime<Utc>, returned_at: Option<DateTime<Utc>>) -> Issue {
        Issue {
            id,
            book_id: 1,
            reader_id: 2,
            issued_by: 7,
            issued_at,
            returned_at,
        }
    }

    #[tokio::test]
    async fn test_issue_records_staff_from_context() {
        let mut mocks = MockRepositoryBuilder::new();
        mocks
            .issues
            .expect_create()
            .withf(|issue| issue.issued_by == 7 && issue.book_id == 1 && issue.reader_id == 2)
            .times(1)
            .returning(|new| Ok(issue(11, new.issued_at, None)));
        mocks
            .issues
            .expect_get_by_id()
            .returning(|id| Ok(record(id, Utc::now(), None)));
        let service = LedgerService::new(mocks.build());

        let form = IssueForm {
            book_id: Some(1),
            reader_id: Some(2),
            issued_at: None,
        };
        let details = service.issue_book(&form, &staff()).await.unwrap();
        assert_eq!(details.id, 11);
        assert_eq!(details.status, LoanStatus::Active);
        assert!(!details.is_overdue);
    }

    #[tokio::test]
    async fn test_issue_book_already_on_loan() {
        let mut mocks = MockRepositoryBuilder::new();
        mocks
            .issues
            .expect_create()
            .returning(|new| Err(AppError::BookOnLoan(new.book_id)));
        let service = LedgerService::new(mocks.build());

        let form = IssueForm {
            book_id: Some(1),
            reader_id: Some(2),
            issued_at: None,
        };
        assert!(matches!(
            service.issue_book(&form, &staff()).await,
            Err(AppError::BookOnLoan(1))
        ));
    }

    #[tokio::test]
    async fn test_second_return_fails_and_keeps_timestamp() {
        let issued_at = Utc::now() - Duration::days(3);
        let first_return = Utc::now() - Duration::days(1);

        let mut mocks = MockRepositoryBuilder::new();
        let mut calls = 0;
        mocks
            .issues
            .expect_mark_returned()
            .times(2)
            .returning(move |id, _| {
                calls += 1;
                if calls == 1 {
                    Ok(ReturnOutcome::Returned(issue(id, issued_at, Some(first_return))))
                } else {
                    Ok(ReturnOutcome::AlreadyReturned(issue(id, issued_at, Some(first_return))))
                }
            });
        mocks
            .issues
            .expect_get_by_id()
            .times(1)
            .returning(move |id| Ok(record(id, issued_at, Some(first_return))));
        let service = LedgerService::new(mocks.build());

        let returned = service.return_book(4).await.unwrap();
        assert_eq!(returned.status, LoanStatus::Returned);
        assert_eq!(returned.returned_at, Some(first_return));

        assert!(matches!(
            service.return_book(4).await,
            Err(AppError::AlreadyReturned(4))
        ));
    }

    #[tokio::test]
    async fn test_return_unknown_issue() {
        let mut mocks = MockRepositoryBuilder::new();
        mocks
            .issues
            .expect_mark_returned()
            .returning(|_, _| Ok(ReturnOutcome::NotFound));
        let service = LedgerService::new(mocks.build());

        assert!(matches!(service.return_book(99).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_search_derives_overdue() {
        let mut mocks = MockRepositoryBuilder::new();
        mocks.issues.expect_search().returning(|_, _, now| {
            Ok((
                vec![
                    record(1, now - Duration::days(45), None),
                    record(2, now - Duration::days(10), None),
                ],
                2,
            ))
        });
        let service = LedgerService::new(mocks.build());

        let (issues, total) = service
            .search_issues(&IssueFilter::default(), Paging::default())
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert!(issues[0].is_overdue);
        assert_eq!(issues[0].overdue_days, 15);
        assert!(!issues[1].is_overdue);
        assert_eq!(issues[1].overdue_days, 0);
    }
}

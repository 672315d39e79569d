//! Roster service: readers, card numbers and the roster export

use chrono::{NaiveDate, Utc};

use crate::{
    error::{AppError, AppResult},
    models::{
        issue::IssueDetails,
        query::{Paging, Sort, AUTOCOMPLETE_LIMIT, AUTOCOMPLETE_MIN_LEN},
        reader::{
            next_card_number, Reader, ReaderDetails, ReaderFilter, ReaderForm, ReaderShort,
            ReaderSortField, CARD_PREFIX,
        },
        DeleteOutcome, LoanStatus, Suggestion,
    },
    repository::Repository,
    services::reports::{export_filename, render_roster_csv},
};

/// Rendered roster export
#[derive(Debug, Clone)]
pub struct RosterExport {
    pub filename: String,
    pub content: Vec<u8>,
}

#[derive(Clone)]
pub struct RosterService {
    repository: Repository,
}

impl RosterService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn search_readers(
        &self,
        filter: &ReaderFilter,
        sort: Option<Sort<ReaderSortField>>,
        paging: Paging,
    ) -> AppResult<(Vec<ReaderShort>, i64)> {
        self.repository.readers.search(filter, sort, paging).await
    }

    /// Reader with the complete lending history, most recent first
    pub async fn get_reader(&self, id: i32) -> AppResult<ReaderDetails> {
        let reader = self.repository.readers.get_by_id(id).await?;
        let now = Utc::now();
        let issues: Vec<IssueDetails> = self
            .repository
            .issues
            .for_reader(id)
            .await?
            .into_iter()
            .map(|record| IssueDetails::from_record(record, now))
            .collect();
        let active_issues = issues
            .iter()
            .filter(|issue| issue.status == LoanStatus::Active)
            .count() as i64;

        Ok(ReaderDetails {
            reader,
            active_issues,
            issues,
        })
    }

    /// Suggest the next free card number. Nothing is reserved; a concurrent
    /// registration may take it first.
    pub async fn next_card_number(&self) -> AppResult<String> {
        let cards = self
            .repository
            .readers
            .card_numbers_with_prefix(CARD_PREFIX)
            .await?;
        Ok(next_card_number(cards.iter().map(String::as_str)))
    }

    /// Register a reader. Without a card number the next suggestion is used.
    pub async fn create_reader(&self, form: &ReaderForm) -> AppResult<Reader> {
        let input = form.validate_input()?;
        let card_number = match input.card_number.clone() {
            Some(card) => card,
            None => self.next_card_number().await?,
        };

        if self
            .repository
            .readers
            .card_number_exists(&card_number, None)
            .await?
        {
            return Err(AppError::DuplicateCard(card_number));
        }

        let reader = self
            .repository
            .readers
            .create(&input.with_card_number(card_number))
            .await?;
        tracing::info!(reader_id = reader.id, "Reader registered with card {}", reader.card_number);
        Ok(reader)
    }

    /// Update a reader. Without a card number the current one is kept.
    pub async fn update_reader(&self, id: i32, form: &ReaderForm) -> AppResult<Reader> {
        let input = form.validate_input()?;
        let card_number = match input.card_number.clone() {
            Some(card) => card,
            None => self.repository.readers.get_by_id(id).await?.card_number,
        };

        if self
            .repository
            .readers
            .card_number_exists(&card_number, Some(id))
            .await?
        {
            return Err(AppError::DuplicateCard(card_number));
        }

        let reader = self
            .repository
            .readers
            .update(id, &input.with_card_number(card_number))
            .await?;
        tracing::info!(reader_id = id, "Reader updated");
        Ok(reader)
    }

    /// Remove a reader from the roster; refused while they hold a book
    pub async fn delete_reader(&self, id: i32) -> AppResult<()> {
        match self.repository.readers.delete_if_no_active_issues(id).await? {
            DeleteOutcome::Deleted => {
                tracing::info!(reader_id = id, "Reader deleted");
                Ok(())
            }
            DeleteOutcome::HasActiveIssues => Err(AppError::ReaderHasActiveIssues(id)),
            DeleteOutcome::NotFound => {
                Err(AppError::NotFound(format!("Reader with id {} not found", id)))
            }
        }
    }

    pub async fn autocomplete(&self, term: &str) -> AppResult<Vec<Suggestion>> {
        let term = term.trim();
        if term.chars().count() < AUTOCOMPLETE_MIN_LEN {
            return Ok(Vec::new());
        }
        self.repository.readers.autocomplete(term, AUTOCOMPLETE_LIMIT).await
    }

    /// Render the whole roster as a CSV attachment dated `today`
    pub async fn export(&self, today: NaiveDate) -> AppResult<RosterExport> {
        let rows = self.repository.readers.roster_rows().await?;
        let content = render_roster_csv(&rows)?;
        tracing::info!("Roster exported: {} readers", rows.len());
        Ok(RosterExport {
            filename: export_filename(today),
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reader::RosterRow;
    use crate::repository::mock::MockRepositoryBuilder;
    use chrono::TimeZone;

    fn reader_from(id: i32, reader: &crate::models::reader::NewReader) -> Reader {
        let now = Utc::now();
        Reader {
            id,
            card_number: reader.card_number.clone(),
            name: reader.name.clone(),
            address: reader.address.clone(),
            phone: reader.phone.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    fn form(card: Option<&str>) -> ReaderForm {
        ReaderForm {
            card_number: card.map(str::to_string),
            name: Some("Иванов Иван".to_string()),
            address: Some("ул. Ленина, 1".to_string()),
            phone: Some("+7 (900) 123-45-67".to_string()),
        }
    }

    #[tokio::test]
    async fn test_duplicate_card_is_rejected_before_insert() {
        let mut mocks = MockRepositoryBuilder::new();
        mocks
            .readers
            .expect_card_number_exists()
            .withf(|card, exclude| card == "ЧБ-00001" && exclude.is_none())
            .times(1)
            .returning(|_, _| Ok(true));
        mocks.readers.expect_create().never();
        let service = RosterService::new(mocks.build());

        match service.create_reader(&form(Some("  чб-00001 "))).await {
            Err(AppError::DuplicateCard(card)) => assert_eq!(card, "ЧБ-00001"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_without_card_uses_next_number() {
        let mut mocks = MockRepositoryBuilder::new();
        mocks
            .readers
            .expect_card_numbers_with_prefix()
            .returning(|_| {
                Ok(vec![
                    "ЧБ-00001".to_string(),
                    "ЧБ-00007".to_string(),
                    "ЧБ-00003".to_string(),
                ])
            });
        mocks
            .readers
            .expect_card_number_exists()
            .returning(|_, _| Ok(false));
        mocks
            .readers
            .expect_create()
            .withf(|reader| reader.card_number == "ЧБ-00008" && reader.phone.as_deref() == Some("79001234567"))
            .times(1)
            .returning(|reader| Ok(reader_from(10, reader)));
        let service = RosterService::new(mocks.build());

        let reader = service.create_reader(&form(None)).await.unwrap();
        assert_eq!(reader.card_number, "ЧБ-00008");
    }

    #[tokio::test]
    async fn test_update_keeps_current_card() {
        let mut mocks = MockRepositoryBuilder::new();
        mocks.readers.expect_get_by_id().returning(|id| {
            Ok(reader_from(
                id,
                &crate::models::reader::NewReader {
                    card_number: "ЧБ-00042".to_string(),
                    name: "Старое имя".to_string(),
                    address: None,
                    phone: None,
                },
            ))
        });
        mocks
            .readers
            .expect_card_number_exists()
            .withf(|card, exclude| card == "ЧБ-00042" && *exclude == Some(4))
            .returning(|_, _| Ok(false));
        mocks
            .readers
            .expect_update()
            .returning(|id, reader| Ok(reader_from(id, reader)));
        let service = RosterService::new(mocks.build());

        let reader = service.update_reader(4, &form(None)).await.unwrap();
        assert_eq!(reader.card_number, "ЧБ-00042");
        assert_eq!(reader.name, "Иванов Иван");
    }

    #[tokio::test]
    async fn test_update_to_card_held_by_another_reader_is_rejected() {
        let mut mocks = MockRepositoryBuilder::new();
        mocks
            .readers
            .expect_card_number_exists()
            .withf(|card, exclude| card == "ЧБ-00009" && *exclude == Some(4))
            .times(1)
            .returning(|_, _| Ok(true));
        mocks.readers.expect_update().never();
        let service = RosterService::new(mocks.build());

        match service.update_reader(4, &form(Some("чб-00009"))).await {
            Err(AppError::DuplicateCard(card)) => assert_eq!(card, "ЧБ-00009"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_reader_holding_books_is_refused() {
        let mut mocks = MockRepositoryBuilder::new();
        mocks
            .readers
            .expect_delete_if_no_active_issues()
            .returning(|_| Ok(DeleteOutcome::HasActiveIssues));
        let service = RosterService::new(mocks.build());

        assert!(matches!(
            service.delete_reader(5).await,
            Err(AppError::ReaderHasActiveIssues(5))
        ));
    }

    #[tokio::test]
    async fn test_export_two_readers() {
        let mut mocks = MockRepositoryBuilder::new();
        mocks.readers.expect_roster_rows().returning(|| {
            let registered = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
            Ok(vec![
                RosterRow {
                    card_number: "ЧБ-00001".to_string(),
                    name: "Иванов Иван".to_string(),
                    address: Some("ул. Ленина, 1".to_string()),
                    phone: Some("79001234567".to_string()),
                    created_at: registered,
                    active_issues: 2,
                    total_issues: 5,
                },
                RosterRow {
                    card_number: "ЧБ-00002".to_string(),
                    name: "Петрова Анна".to_string(),
                    address: None,
                    phone: None,
                    created_at: registered,
                    active_issues: 0,
                    total_issues: 1,
                },
            ])
        });
        let service = RosterService::new(mocks.build());

        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let export = service.export(today).await.unwrap();
        assert_eq!(export.filename, "readers_2024-03-05.csv");

        let text = String::from_utf8(export.content).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "ЧБ-00001;Иванов Иван;ул. Ленина, 1;79001234567;15.01.2024;2;5");
        assert_eq!(lines[2], "ЧБ-00002;Петрова Анна;;;15.01.2024;0;1");
    }
}

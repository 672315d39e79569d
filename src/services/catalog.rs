//! Catalog service: books and their lending summary

use chrono::{Datelike, Utc};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookDetails, BookFilter, BookForm, BookShort, BookSortField},
        query::{Paging, Sort, AUTOCOMPLETE_LIMIT, AUTOCOMPLETE_MIN_LEN},
        report::{BookStats, TOP_LIMIT},
        DeleteOutcome, Suggestion,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Search books with filter, sort and pagination
    pub async fn search_books(
        &self,
        filter: &BookFilter,
        sort: Option<Sort<BookSortField>>,
        paging: Paging,
    ) -> AppResult<(Vec<BookShort>, i64)> {
        self.repository.books.search(filter, sort, paging).await
    }

    pub async fn get_book(&self, id: i32) -> AppResult<BookDetails> {
        self.repository.books.get_details(id).await
    }

    pub async fn create_book(&self, form: &BookForm) -> AppResult<Book> {
        let book = form.validate_for(Utc::now().year())?;
        let created = self.repository.books.create(&book).await?;
        tracing::info!(book_id = created.id, "Book created: {}", created.title);
        Ok(created)
    }

    pub async fn update_book(&self, id: i32, form: &BookForm) -> AppResult<Book> {
        let book = form.validate_for(Utc::now().year())?;
        let updated = self.repository.books.update(id, &book).await?;
        tracing::info!(book_id = id, "Book updated");
        Ok(updated)
    }

    /// Remove a book from the catalog; refused while it is on loan
    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        match self.repository.books.delete_if_not_on_loan(id).await? {
            DeleteOutcome::Deleted => {
                tracing::info!(book_id = id, "Book deleted");
                Ok(())
            }
            DeleteOutcome::HasActiveIssues => Err(AppError::BookOnLoan(id)),
            DeleteOutcome::NotFound => {
                Err(AppError::NotFound(format!("Book with id {} not found", id)))
            }
        }
    }

    /// Suggestions for a title or author fragment; short terms yield nothing
    pub async fn autocomplete(&self, term: &str) -> AppResult<Vec<Suggestion>> {
        let term = term.trim();
        if term.chars().count() < AUTOCOMPLETE_MIN_LEN {
            return Ok(Vec::new());
        }
        self.repository.books.autocomplete(term, AUTOCOMPLETE_LIMIT).await
    }

    pub async fn stats(&self) -> AppResult<BookStats> {
        self.repository.reports.book_stats(TOP_LIMIT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::mock::MockRepositoryBuilder;
    use rust_decimal::Decimal;

    fn form() -> BookForm {
        BookForm {
            author: Some(" Лев Толстой ".to_string()),
            title: Some("Война и мир".to_string()),
            publish_year: Some(1869),
            price: Some(Decimal::new(45050, 2)),
            is_new: None,
            annotation: None,
        }
    }

    #[tokio::test]
    async fn test_delete_book_on_loan_is_refused() {
        let mut mocks = MockRepositoryBuilder::new();
        mocks
            .books
            .expect_delete_if_not_on_loan()
            .withf(|id| *id == 3)
            .times(1)
            .returning(|_| Ok(DeleteOutcome::HasActiveIssues));
        let service = CatalogService::new(mocks.build());

        match service.delete_book(3).await {
            Err(AppError::BookOnLoan(id)) => assert_eq!(id, 3),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_missing_book() {
        let mut mocks = MockRepositoryBuilder::new();
        mocks
            .books
            .expect_delete_if_not_on_loan()
            .returning(|_| Ok(DeleteOutcome::NotFound));
        let service = CatalogService::new(mocks.build());

        assert!(matches!(service.delete_book(9).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_book_stores_normalized_values() {
        let mut mocks = MockRepositoryBuilder::new();
        mocks
            .books
            .expect_create()
            .withf(|book| book.author == "Лев Толстой" && !book.is_new)
            .times(1)
            .returning(|book| {
                let now = Utc::now();
                Ok(Book {
                    id: 1,
                    author: book.author.clone(),
                    title: book.title.clone(),
                    publish_year: book.publish_year,
                    price: book.price,
                    is_new: book.is_new,
                    annotation: book.annotation.clone(),
                    created_at: now,
                    updated_at: now,
                })
            });
        let service = CatalogService::new(mocks.build());

        let book = service.create_book(&form()).await.unwrap();
        assert_eq!(book.id, 1);
        assert_eq!(book.price, Decimal::new(45050, 2));
    }

    #[tokio::test]
    async fn test_invalid_book_never_reaches_storage() {
        let mocks = MockRepositoryBuilder::new();
        let service = CatalogService::new(mocks.build());

        let mut invalid = form();
        invalid.publish_year = Some(1700);
        match service.create_book(&invalid).await {
            Err(AppError::Validation { fields, input }) => {
                assert!(fields.contains_key("publish_year"));
                assert_eq!(input["author"], " Лев Толстой ");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_autocomplete_ignores_short_terms() {
        let mut mocks = MockRepositoryBuilder::new();
        mocks
            .books
            .expect_autocomplete()
            .withf(|term, limit| term == "во" && *limit == AUTOCOMPLETE_LIMIT)
            .times(1)
            .returning(|_, _| {
                Ok(vec![Suggestion {
                    id: 1,
                    label: "Война и мир / Лев Толстой".to_string(),
                }])
            });
        let service = CatalogService::new(mocks.build());

        assert!(service.autocomplete(" в ").await.unwrap().is_empty());
        assert_eq!(service.autocomplete("во").await.unwrap().len(), 1);
    }
}

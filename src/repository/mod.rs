//! Repository layer for database operations

pub mod books;
pub mod issues;
pub mod readers;
pub mod reports;
pub mod staff;

use std::sync::Arc;

use sqlx::{Pool, Postgres};

/// Main repository struct holding the storage behind each domain area
#[derive(Clone)]
pub struct Repository {
    pub pool: Option<Pool<Postgres>>,
    pub books: Arc<dyn books::BooksRepository>,
    pub readers: Arc<dyn readers::ReadersRepository>,
    pub issues: Arc<dyn issues::IssuesRepository>,
    pub staff: Arc<dyn staff::StaffRepository>,
    pub reports: Arc<dyn reports::ReportsRepository>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::PgBooksRepository::new(pool.clone())),
            readers: Arc::new(readers::PgReadersRepository::new(pool.clone())),
            issues: Arc::new(issues::PgIssuesRepository::new(pool.clone())),
            staff: Arc::new(staff::PgStaffRepository::new(pool.clone())),
            reports: Arc::new(reports::PgReportsRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Check the database answers; always true without a pool
    pub async fn ping(&self) -> bool {
        match &self.pool {
            Some(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
            None => true,
        }
    }
}

#[cfg(test)]
pub mod mock {
    //! Repository assembled from mocks for service tests

    use super::*;

    pub struct MockRepositoryBuilder {
        pub books: books::MockBooksRepository,
        pub readers: readers::MockReadersRepository,
        pub issues: issues::MockIssuesRepository,
        pub staff: staff::MockStaffRepository,
        pub reports: reports::MockReportsRepository,
    }

    impl MockRepositoryBuilder {
        pub fn new() -> Self {
            Self {
                books: books::MockBooksRepository::new(),
                readers: readers::MockReadersRepository::new(),
                issues: issues::MockIssuesRepository::new(),
                staff: staff::MockStaffRepository::new(),
                reports: reports::MockReportsRepository::new(),
            }
        }

        pub fn build(self) -> Repository {
            Repository {
                pool: None,
                books: Arc::new(self.books),
                readers: Arc::new(self.readers),
                issues: Arc::new(self.issues),
                staff: Arc::new(self.staff),
                reports: Arc::new(self.reports),
            }
        }
    }
}

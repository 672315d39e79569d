//! Business logic services

pub mod catalog;
pub mod ledger;
pub mod reports;
pub mod roster;
pub mod users;

use crate::{config::AuthConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub repository: Repository,
    pub catalog: catalog::CatalogService,
    pub roster: roster::RosterService,
    pub ledger: ledger::LedgerService,
    pub reports: reports::ReportsService,
    pub users: users::UsersService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, auth_config: AuthConfig) -> Self {
        Self {
            catalog: catalog::CatalogService::new(repository.clone()),
            roster: roster::RosterService::new(repository.clone()),
            ledger: ledger::LedgerService::new(repository.clone()),
            reports: reports::ReportsService::new(repository.clone()),
            users: users::UsersService::new(repository.clone(), auth_config),
            repository,
        }
    }
}

//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, health, issues, readers, stats, users};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bibliodesk API",
        version = "1.0.0",
        description = "Library back office REST API: catalog, readers and lending ledger"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    modifiers(&SecurityAddon),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::me,
        // Books
        books::list_books,
        books::autocomplete_books,
        books::book_stats,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Readers
        readers::list_readers,
        readers::autocomplete_readers,
        readers::next_card_number,
        readers::export_readers,
        readers::get_reader,
        readers::create_reader,
        readers::update_reader,
        readers::delete_reader,
        // Issues
        issues::list_issues,
        issues::get_issue,
        issues::create_issue,
        issues::return_issue,
        // Stats
        stats::get_stats,
        stats::get_reader_stats,
        stats::get_staff_stats,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
    ),
    components(
        schemas(
            // Shared
            crate::api::BookPage,
            crate::api::ReaderPage,
            crate::api::IssuePage,
            crate::api::MessageResponse,
            crate::api::SuggestionsResponse,
            crate::models::Suggestion,
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            auth::StaffInfo,
            // Books
            books::BookResponse,
            crate::models::book::Book,
            crate::models::book::BookShort,
            crate::models::book::BookDetails,
            crate::models::book::BookForm,
            // Readers
            readers::ReaderResponse,
            readers::CardNumberResponse,
            crate::models::reader::Reader,
            crate::models::reader::ReaderShort,
            crate::models::reader::ReaderDetails,
            crate::models::reader::ReaderForm,
            // Issues
            issues::IssueResponse,
            crate::models::issue::Issue,
            crate::models::issue::IssueDetails,
            crate::models::issue::IssueForm,
            crate::models::issue::LoanStatus,
            crate::models::issue::IssueStatusFilter,
            // Stats
            books::BookStatsResponse,
            stats::OverviewResponse,
            stats::ReaderStatsResponse,
            stats::StaffStatsResponse,
            crate::models::report::LibraryOverview,
            crate::models::report::BookStats,
            crate::models::report::BookIssueCount,
            crate::models::report::ReaderIssueCount,
            crate::models::report::StaffIssueCount,
            // Users
            users::StaffResponse,
            crate::models::staff::StaffRole,
            crate::models::staff::StaffForm,
            crate::models::staff::StaffUpdate,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Staff authentication"),
        (name = "books", description = "Catalog management"),
        (name = "readers", description = "Reader roster management"),
        (name = "issues", description = "Lending ledger"),
        (name = "stats", description = "Reporting"),
        (name = "users", description = "Staff account management")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

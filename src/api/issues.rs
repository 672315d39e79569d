//! Issue (lending ledger) endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::issue::{IssueDetails, IssueForm, IssueQuery},
};

use super::{AuthenticatedUser, FormJson, ListQuery, PaginatedResponse};

#[derive(Serialize, ToSchema)]
pub struct IssueResponse {
    pub message: String,
    pub issue: IssueDetails,
}

/// List issues, most recent first
#[utoipa::path(
    get,
    path = "/issues",
    tag = "issues",
    security(("bearer_auth" = [])),
    params(IssueQuery),
    responses(
        (status = 200, description = "Page of issues", body = crate::api::IssuePage),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_issues(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    query: ListQuery<IssueQuery>,
) -> Json<PaginatedResponse<IssueDetails>> {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return Json(PaginatedResponse::rejected(&rejection)),
    };
    let paging = query.paging();
    let result = state
        .services
        .ledger
        .search_issues(&query.filter(), paging)
        .await;

    Json(match result {
        Ok((issues, total)) => PaginatedResponse::new(issues, total, paging),
        Err(e) => PaginatedResponse::failed(paging, &e),
    })
}

/// Get an issue
#[utoipa::path(
    get,
    path = "/issues/{id}",
    tag = "issues",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Issue ID")
    ),
    responses(
        (status = 200, description = "Issue details", body = IssueDetails),
        (status = 404, description = "Issue not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_issue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<IssueDetails>> {
    let issue = state.services.ledger.get_issue(id).await?;
    Ok(Json(issue))
}

/// Issue a book to a reader
#[utoipa::path(
    post,
    path = "/issues",
    tag = "issues",
    security(("bearer_auth" = [])),
    request_body = IssueForm,
    responses(
        (status = 201, description = "Book issued", body = IssueResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 404, description = "Book or reader not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Book is on loan", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_issue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    FormJson(form): FormJson<IssueForm>,
) -> AppResult<(StatusCode, Json<IssueResponse>)> {
    claims.require_manage_library()?;

    let issue = state.services.ledger.issue_book(&form, &claims).await?;
    Ok((
        StatusCode::CREATED,
        Json(IssueResponse {
            message: format!(
                "\"{}\" issued to {} ({})",
                issue.book_title, issue.reader_name, issue.reader_card_number
            ),
            issue,
        }),
    ))
}

/// Return an issued book
#[utoipa::path(
    post,
    path = "/issues/{id}/return",
    tag = "issues",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Issue ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = IssueResponse),
        (status = 404, description = "Issue not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Issue already returned", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_issue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<IssueResponse>> {
    claims.require_manage_library()?;

    let issue = state.services.ledger.return_book(id).await?;
    Ok(Json(IssueResponse {
        message: format!("\"{}\" returned by {}", issue.book_title, issue.reader_name),
        issue,
    }))
}

//! Book (catalog) endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookDetails, BookForm, BookQuery, BookShort},
        report::BookStats,
    },
};

use super::{
    read_or_default, AuthenticatedUser, AutocompleteQuery, FormJson, ListQuery, MessageResponse,
    PaginatedResponse, SuggestionsResponse,
};

#[derive(Serialize, ToSchema)]
pub struct BookResponse {
    pub message: String,
    pub book: Book,
}

/// Catalog statistics; empty with a `message` when they could not be read
#[derive(Serialize, ToSchema)]
pub struct BookStatsResponse {
    #[serde(flatten)]
    pub stats: BookStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// List books with search, filter, sort and pagination
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    params(BookQuery),
    responses(
        (status = 200, description = "Page of books", body = crate::api::BookPage),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    query: ListQuery<BookQuery>,
) -> Json<PaginatedResponse<BookShort>> {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return Json(PaginatedResponse::rejected(&rejection)),
    };
    let paging = query.paging();
    let result = state
        .services
        .catalog
        .search_books(&query.filter(), query.sort(), paging)
        .await;

    Json(match result {
        Ok((books, total)) => PaginatedResponse::new(books, total, paging),
        Err(e) => PaginatedResponse::failed(paging, &e),
    })
}

/// Suggest books by a title or author fragment
#[utoipa::path(
    get,
    path = "/books/autocomplete",
    tag = "books",
    security(("bearer_auth" = [])),
    params(AutocompleteQuery),
    responses(
        (status = 200, description = "Up to 10 suggestions", body = SuggestionsResponse)
    )
)]
pub async fn autocomplete_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<AutocompleteQuery>,
) -> Json<SuggestionsResponse> {
    let term = query.q.unwrap_or_default();
    Json(SuggestionsResponse::from_result(
        state.services.catalog.autocomplete(&term).await,
    ))
}

/// Catalog statistics
#[utoipa::path(
    get,
    path = "/books/stats",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Book statistics", body = BookStatsResponse)
    )
)]
pub async fn book_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> Json<BookStatsResponse> {
    let (stats, message) = read_or_default(state.services.catalog.stats().await, "Book statistics");
    Json(BookStatsResponse { stats, message })
}

/// Get book details by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = BookDetails),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BookDetails>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = BookForm,
    responses(
        (status = 201, description = "Book created", body = BookResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient rights", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    FormJson(form): FormJson<BookForm>,
) -> AppResult<(StatusCode, Json<BookResponse>)> {
    claims.require_manage_library()?;

    let book = state.services.catalog.create_book(&form).await?;
    Ok((
        StatusCode::CREATED,
        Json(BookResponse {
            message: format!("Book \"{}\" added", book.title),
            book,
        }),
    ))
}

/// Update a book
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body = BookForm,
    responses(
        (status = 200, description = "Book updated", body = BookResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    FormJson(form): FormJson<BookForm>,
) -> AppResult<Json<BookResponse>> {
    claims.require_manage_library()?;

    let book = state.services.catalog.update_book(id, &form).await?;
    Ok(Json(BookResponse {
        message: format!("Book \"{}\" updated", book.title),
        book,
    }))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book deleted", body = MessageResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Book is on loan", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<MessageResponse>> {
    claims.require_manage_library()?;

    state.services.catalog.delete_book(id).await?;
    Ok(Json(MessageResponse::new("Book deleted")))
}

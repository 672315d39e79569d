//! Reader (roster) endpoints

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::reader::{Reader, ReaderDetails, ReaderForm, ReaderQuery, ReaderShort},
    services::reports::CSV_CONTENT_TYPE,
};

use super::{
    AuthenticatedUser, AutocompleteQuery, FormJson, ListQuery, MessageResponse,
    PaginatedResponse, SuggestionsResponse,
};

#[derive(Serialize, ToSchema)]
pub struct ReaderResponse {
    pub message: String,
    pub reader: Reader,
}

#[derive(Serialize, ToSchema)]
pub struct CardNumberResponse {
    /// Suggested card number; not reserved
    pub card_number: String,
}

/// List readers with search, filter, sort and pagination
#[utoipa::path(
    get,
    path = "/readers",
    tag = "readers",
    security(("bearer_auth" = [])),
    params(ReaderQuery),
    responses(
        (status = 200, description = "Page of readers", body = crate::api::ReaderPage),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_readers(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    query: ListQuery<ReaderQuery>,
) -> Json<PaginatedResponse<ReaderShort>> {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return Json(PaginatedResponse::rejected(&rejection)),
    };
    let paging = query.paging();
    let result = state
        .services
        .roster
        .search_readers(&query.filter(), query.sort(), paging)
        .await;

    Json(match result {
        Ok((readers, total)) => PaginatedResponse::new(readers, total, paging),
        Err(e) => PaginatedResponse::failed(paging, &e),
    })
}

/// Suggest readers by a name or card number fragment
#[utoipa::path(
    get,
    path = "/readers/autocomplete",
    tag = "readers",
    security(("bearer_auth" = [])),
    params(AutocompleteQuery),
    responses(
        (status = 200, description = "Up to 10 suggestions", body = SuggestionsResponse)
    )
)]
pub async fn autocomplete_readers(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<AutocompleteQuery>,
) -> Json<SuggestionsResponse> {
    let term = query.q.unwrap_or_default();
    Json(SuggestionsResponse::from_result(
        state.services.roster.autocomplete(&term).await,
    ))
}

/// Suggest the next free card number
#[utoipa::path(
    get,
    path = "/readers/next-card-number",
    tag = "readers",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Card number suggestion", body = CardNumberResponse)
    )
)]
pub async fn next_card_number(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<CardNumberResponse>> {
    let card_number = state.services.roster.next_card_number().await?;
    Ok(Json(CardNumberResponse { card_number }))
}

/// Download the roster as CSV
#[utoipa::path(
    get,
    path = "/readers/export",
    tag = "readers",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Roster CSV attachment", content_type = "text/csv", body = String)
    )
)]
pub async fn export_readers(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let export = state.services.roster.export(Utc::now().date_naive()).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, CSV_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export.filename),
            ),
        ],
        export.content,
    ))
}

/// Get a reader with their lending history
#[utoipa::path(
    get,
    path = "/readers/{id}",
    tag = "readers",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reader ID")
    ),
    responses(
        (status = 200, description = "Reader details", body = ReaderDetails),
        (status = 404, description = "Reader not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_reader(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReaderDetails>> {
    let reader = state.services.roster.get_reader(id).await?;
    Ok(Json(reader))
}

/// Register a reader
#[utoipa::path(
    post,
    path = "/readers",
    tag = "readers",
    security(("bearer_auth" = [])),
    request_body = ReaderForm,
    responses(
        (status = 201, description = "Reader registered", body = ReaderResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 409, description = "Card number already in use", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_reader(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    FormJson(form): FormJson<ReaderForm>,
) -> AppResult<(StatusCode, Json<ReaderResponse>)> {
    claims.require_manage_library()?;

    let reader = state.services.roster.create_reader(&form).await?;
    Ok((
        StatusCode::CREATED,
        Json(ReaderResponse {
            message: format!("Reader {} registered with card {}", reader.name, reader.card_number),
            reader,
        }),
    ))
}

/// Update a reader
#[utoipa::path(
    put,
    path = "/readers/{id}",
    tag = "readers",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reader ID")
    ),
    request_body = ReaderForm,
    responses(
        (status = 200, description = "Reader updated", body = ReaderResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 404, description = "Reader not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Card number already in use", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_reader(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    FormJson(form): FormJson<ReaderForm>,
) -> AppResult<Json<ReaderResponse>> {
    claims.require_manage_library()?;

    let reader = state.services.roster.update_reader(id, &form).await?;
    Ok(Json(ReaderResponse {
        message: format!("Reader {} updated", reader.name),
        reader,
    }))
}

/// Delete a reader
#[utoipa::path(
    delete,
    path = "/readers/{id}",
    tag = "readers",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reader ID")
    ),
    responses(
        (status = 200, description = "Reader deleted", body = MessageResponse),
        (status = 404, description = "Reader not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Reader still holds books", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_reader(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<MessageResponse>> {
    claims.require_manage_library()?;

    state.services.roster.delete_reader(id).await?;
    Ok(Json(MessageResponse::new("Reader deleted")))
}

//! API handlers for Bibliodesk REST endpoints

pub mod auth;
pub mod books;
pub mod health;
pub mod issues;
pub mod openapi;
pub mod readers;
pub mod stats;
pub mod users;

use axum::{
    async_trait,
    body::Bytes,
    extract::{rejection::QueryRejection, FromRequest, FromRequestParts, Query, Request},
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{push_field_error, AppError, AppResult, FieldErrors},
    models::{query::Paging, BookShort, IssueDetails, ReaderShort, StaffClaims},
    AppState,
};

/// Extractor for the authenticated staff member behind a request
pub struct AuthenticatedUser(pub StaffClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = state.services.users.authorize(token).await?;

        Ok(AuthenticatedUser(claims))
    }
}

/// JSON request body for create/update forms. A body that does not fit the
/// form's types is rejected as a validation error that echoes what was sent,
/// like any other invalid input.
pub struct FormJson<T>(pub T);

/// Keys never echoed back in an error body
const SECRET_KEYS: &[&str] = &["password"];

#[async_trait]
impl<S, T> FromRequest<S> for FormJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
            let mut fields = FieldErrors::new();
            push_field_error(&mut fields, "body", format!("Malformed JSON: {}", e));
            AppError::Validation {
                fields,
                input: Value::String(String::from_utf8_lossy(&bytes).into_owned()),
            }
        })?;

        match T::deserialize(&value) {
            Ok(form) => Ok(FormJson(form)),
            Err(e) => {
                let mut fields = FieldErrors::new();
                let field = offending_field::<T>(&value).unwrap_or_else(|| "body".to_string());
                push_field_error(&mut fields, &field, format!("Invalid value: {}", e));
                Err(AppError::Validation {
                    fields,
                    input: without_secrets(value),
                })
            }
        }
    }
}

/// First top-level key whose removal lets the body deserialize, or leaves
/// only that key reported missing
fn offending_field<T: DeserializeOwned>(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    object.keys().find_map(|key| {
        let mut rest = object.clone();
        rest.remove(key);
        let fits = match T::deserialize(&Value::Object(rest)) {
            Ok(_) => true,
            Err(e) => e.to_string() == format!("missing field `{}`", key),
        };
        fits.then(|| key.clone())
    })
}

fn without_secrets(mut value: Value) -> Value {
    if let Some(object) = value.as_object_mut() {
        for key in SECRET_KEYS {
            object.remove(*key);
        }
    }
    value
}

/// Query string of a list endpoint. Parameters of the wrong type do not fail
/// the request; the handler answers with an empty page and the reason.
pub type ListQuery<T> = Result<Query<T>, QueryRejection>;

/// Paginated response wrapper. When the underlying read failed the list is
/// empty and `message` says why.
#[derive(Serialize, ToSchema)]
#[aliases(
    BookPage = PaginatedResponse<BookShort>,
    ReaderPage = PaginatedResponse<ReaderShort>,
    IssuePage = PaginatedResponse<IssueDetails>
)]
pub struct PaginatedResponse<T>
where
    T: for<'a> ToSchema<'a>,
{
    pub items: Vec<T>,
    /// Total number of matching records
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> PaginatedResponse<T>
where
    T: for<'a> ToSchema<'a>,
{
    pub fn new(items: Vec<T>, total: i64, paging: Paging) -> Self {
        Self {
            items,
            total,
            page: paging.page,
            per_page: paging.per_page,
            message: None,
        }
    }

    /// Empty page standing in for a failed read
    pub fn failed(paging: Paging, error: &AppError) -> Self {
        tracing::error!("List query failed: {}", error);
        Self {
            items: Vec::new(),
            total: 0,
            page: paging.page,
            per_page: paging.per_page,
            message: Some(format!("Could not load the list: {}", error)),
        }
    }
}

impl<T> PaginatedResponse<T>
where
    T: for<'a> ToSchema<'a>,
{
    /// Empty default page for a query string that could not be parsed
    pub fn rejected(rejection: &QueryRejection) -> Self {
        Self::failed(
            Paging::default(),
            &AppError::BadRequest(rejection.body_text()),
        )
    }
}

/// The value of a read, or its empty default plus a diagnostic when the
/// read failed
pub fn read_or_default<T: Default>(result: AppResult<T>, what: &str) -> (T, Option<String>) {
    match result {
        Ok(value) => (value, None),
        Err(e) => {
            tracing::error!("{} failed: {}", what, e);
            (T::default(), Some(format!("{} unavailable: {}", what, e)))
        }
    }
}

/// Plain confirmation for mutations without a body
#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Autocomplete query
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct AutocompleteQuery {
    /// At least two characters
    pub q: Option<String>,
}

/// Autocomplete answer; a failed lookup yields no suggestions and a message
#[derive(Serialize, ToSchema)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<crate::models::Suggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SuggestionsResponse {
    pub fn from_result(result: crate::error::AppResult<Vec<crate::models::Suggestion>>) -> Self {
        match result {
            Ok(suggestions) => Self {
                suggestions,
                message: None,
            },
            Err(e) => {
                tracing::error!("Autocomplete failed: {}", e);
                Self {
                    suggestions: Vec::new(),
                    message: Some(format!("Suggestions unavailable: {}", e)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::book::BookForm;
    use crate::models::staff::StaffForm;
    use axum::body::Body;

    async fn extract<T: DeserializeOwned>(body: &'static str) -> Result<T, AppError> {
        let request = axum::http::Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        FormJson::<T>::from_request(request, &()).await.map(|FormJson(form)| form)
    }

    #[tokio::test]
    async fn test_wrong_type_becomes_field_error_with_input() {
        let result = extract::<BookForm>(r#"{"author":"Кто-то","publish_year":"19x9","price":"10"}"#).await;
        match result {
            Err(AppError::Validation { fields, input }) => {
                assert!(fields.contains_key("publish_year"), "{fields:?}");
                assert_eq!(input["author"], "Кто-то");
                assert_eq!(input["publish_year"], "19x9");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_json_is_echoed() {
        match extract::<BookForm>(r#"{"author": "#).await {
            Err(AppError::Validation { fields, input }) => {
                assert!(fields.contains_key("body"));
                assert_eq!(input, Value::String(r#"{"author": "#.to_string()));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_password_is_not_echoed() {
        match extract::<StaffForm>(r#"{"login":"olga","password":"secret123","display_name":5}"#).await {
            Err(AppError::Validation { fields, input }) => {
                assert!(fields.contains_key("display_name"));
                assert!(input.get("password").is_none());
                assert_eq!(input["login"], "olga");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_valid_body_passes() {
        let form = extract::<BookForm>(r#"{"title":"Идиот","publish_year":1869}"#).await.unwrap();
        assert_eq!(form.title.as_deref(), Some("Идиот"));
        assert_eq!(form.publish_year, Some(1869));
    }

    #[test]
    fn test_read_or_default() {
        let (value, message) = read_or_default(Ok(vec![1, 2]), "Report");
        assert_eq!(value, vec![1, 2]);
        assert!(message.is_none());

        let failed: AppResult<Vec<i32>> = Err(AppError::Internal("pool timed out".to_string()));
        let (value, message) = read_or_default(failed, "Report");
        assert!(value.is_empty());
        assert_eq!(message.as_deref(), Some("Report unavailable: Internal server error: pool timed out"));
    }

    #[test]
    fn test_rejected_query_gives_empty_page() {
        let uri: axum::http::Uri = "/books?is_new=yes".parse().unwrap();
        let rejection = Query::<crate::models::book::BookQuery>::try_from_uri(&uri)
            .err()
            .unwrap();
        let page = PaginatedResponse::<BookShort>::rejected(&rejection);
        assert!(page.items.is_empty());
        assert_eq!(page.total, 0);
        assert_eq!(page.page, 1);
        assert!(page.message.is_some());
    }
}

//! Book (catalog entry) model and related types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::query::{search_term, Paging, Sort, SortField};
use crate::error::{collect_field_errors, push_field_error, AppError, AppResult, FieldErrors};

/// Oldest accepted publication year
pub const PUBLISH_YEAR_MIN: i32 = 1800;

/// Largest price the `NUMERIC(10, 2)` column holds
pub const PRICE_MAX: Decimal = Decimal::from_parts(999_999_999, 0, 0, false, 2);

/// Book model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub author: String,
    pub title: String,
    pub publish_year: i32,
    pub price: Decimal,
    pub is_new: bool,
    pub annotation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Book row for lists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookShort {
    pub id: i32,
    pub author: String,
    pub title: String,
    pub publish_year: i32,
    pub price: Decimal,
    pub is_new: bool,
    /// An active issue exists for this book
    pub on_loan: bool,
    pub created_at: DateTime<Utc>,
}

/// Book with lending summary
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookDetails {
    #[serde(flatten)]
    pub book: Book,
    pub on_loan: bool,
    /// Number of times the book has been issued
    pub issue_count: i64,
}

/// Create/update payload as submitted by the client.
///
/// Every field is optional so that missing values surface as field-level
/// errors instead of a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct BookForm {
    #[validate(
        required(message = "Author is required"),
        length(max = 255, message = "Author must be at most 255 characters")
    )]
    pub author: Option<String>,
    #[validate(
        required(message = "Title is required"),
        length(max = 255, message = "Title must be at most 255 characters")
    )]
    pub title: Option<String>,
    pub publish_year: Option<i32>,
    pub price: Option<Decimal>,
    pub is_new: Option<bool>,
    #[validate(length(max = 1000, message = "Annotation must be at most 1000 characters"))]
    pub annotation: Option<String>,
}

/// Validated, normalized book values ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub author: String,
    pub title: String,
    pub publish_year: i32,
    pub price: Decimal,
    pub is_new: bool,
    pub annotation: Option<String>,
}

impl BookForm {
    /// Validate against the catalog rules. On failure the error carries the
    /// form exactly as submitted.
    pub fn validate_for(&self, current_year: i32) -> AppResult<NewBook> {
        let mut fields = FieldErrors::new();
        if let Err(errors) = self.validate() {
            collect_field_errors(&errors, &mut fields);
        }

        let author = self.author.as_deref().map(str::trim);
        if author == Some("") {
            push_field_error(&mut fields, "author", "Author is required");
        }
        let title = self.title.as_deref().map(str::trim);
        if title == Some("") {
            push_field_error(&mut fields, "title", "Title is required");
        }

        let max_year = current_year + 1;
        match self.publish_year {
            None => push_field_error(&mut fields, "publish_year", "Publish year is required"),
            Some(year) if !(PUBLISH_YEAR_MIN..=max_year).contains(&year) => push_field_error(
                &mut fields,
                "publish_year",
                format!("Publish year must be between {} and {}", PUBLISH_YEAR_MIN, max_year),
            ),
            Some(_) => {}
        }

        match self.price {
            None => push_field_error(&mut fields, "price", "Price is required"),
            Some(price) if price < Decimal::ZERO => {
                push_field_error(&mut fields, "price", "Price must not be negative")
            }
            Some(price) if price.round_dp(2) > PRICE_MAX => push_field_error(
                &mut fields,
                "price",
                format!("Price must not exceed {}", PRICE_MAX),
            ),
            Some(_) => {}
        }

        match (author, title, self.publish_year, self.price) {
            (Some(author), Some(title), Some(publish_year), Some(price)) if fields.is_empty() => {
                Ok(NewBook {
                    author: author.to_string(),
                    title: title.to_string(),
                    publish_year,
                    price: price.round_dp(2),
                    is_new: self.is_new.unwrap_or(false),
                    annotation: search_term(self.annotation.as_deref()),
                })
            }
            _ => Err(AppError::validation(fields, self)),
        }
    }
}

/// Columns a book list may be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSortField {
    Title,
    Author,
    PublishYear,
    Price,
    CreatedAt,
}

impl SortField for BookSortField {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "title" => Some(BookSortField::Title),
            "author" => Some(BookSortField::Author),
            "publish_year" => Some(BookSortField::PublishYear),
            "price" => Some(BookSortField::Price),
            "created_at" => Some(BookSortField::CreatedAt),
            _ => None,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            BookSortField::Title => "b.title",
            BookSortField::Author => "b.author",
            BookSortField::PublishYear => "b.publish_year",
            BookSortField::Price => "b.price",
            BookSortField::CreatedAt => "b.created_at",
        }
    }
}

/// Book list filter. Set fields are combined with AND; `search` matches the
/// title OR the author (case-insensitive substring).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookFilter {
    pub search: Option<String>,
    pub is_new: Option<bool>,
}

/// Book list query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    /// Substring of title or author
    pub search: Option<String>,
    pub is_new: Option<bool>,
    /// title, author, publish_year, price or created_at
    pub sort: Option<String>,
    /// asc or desc
    pub direction: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl BookQuery {
    pub fn filter(&self) -> BookFilter {
        BookFilter {
            search: search_term(self.search.as_deref()),
            is_new: self.is_new,
        }
    }

    pub fn sort(&self) -> Option<Sort<BookSortField>> {
        Sort::from_query(self.sort.as_deref(), self.direction.as_deref())
    }

    pub fn paging(&self) -> Paging {
        Paging::new(self.page, self.per_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn valid_form() -> BookForm {
        BookForm {
            author: Some("  Лев Толстой ".to_string()),
            title: Some("Война и мир".to_string()),
            publish_year: Some(1869),
            price: Some(Decimal::from_str("450.5").unwrap()),
            is_new: None,
            annotation: Some("   ".to_string()),
        }
    }

    #[test]
    fn test_valid_form_is_normalized() {
        let book = valid_form().validate_for(2024).unwrap();
        assert_eq!(book.author, "Лев Толстой");
        assert_eq!(book.price, Decimal::from_str("450.50").unwrap());
        assert!(!book.is_new);
        assert_eq!(book.annotation, None);
    }

    #[test]
    fn test_missing_fields_are_reported() {
        let form = BookForm::default();
        match form.validate_for(2024) {
            Err(AppError::Validation { fields, .. }) => {
                for field in ["author", "title", "publish_year", "price"] {
                    assert!(fields.contains_key(field), "missing error for {field}");
                }
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_bounds() {
        let mut form = valid_form();
        form.publish_year = Some(2026);
        form.price = Some(Decimal::from(-1));
        form.annotation = Some("x".repeat(1001));
        match form.validate_for(2024) {
            Err(AppError::Validation { fields, input }) => {
                assert_eq!(fields["publish_year"], vec!["Publish year must be between 1800 and 2025"]);
                assert_eq!(fields["price"], vec!["Price must not be negative"]);
                assert!(fields.contains_key("annotation"));
                // submitted values come back untouched
                assert_eq!(input["author"], "  Лев Толстой ");
                assert_eq!(input["publish_year"], 2026);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let mut form = valid_form();
        form.publish_year = Some(2025);
        form.price = Some(Decimal::ZERO);
        assert!(form.validate_for(2024).is_ok());
        form.publish_year = Some(1799);
        assert!(form.validate_for(2024).is_err());
    }

    #[test]
    fn test_price_fits_column() {
        let mut form = valid_form();
        form.price = Some(Decimal::from(1_000_000_000));
        match form.validate_for(2024) {
            Err(AppError::Validation { fields, input }) => {
                assert_eq!(fields["price"], vec!["Price must not exceed 99999999.99"]);
                assert_eq!(input["title"], "Война и мир");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        form.price = Some(Decimal::from_str("99999999.99").unwrap());
        assert!(form.validate_for(2024).is_ok());
        form.price = Some(Decimal::from_str("99999999.999").unwrap());
        assert!(form.validate_for(2024).is_err());
    }

    #[test]
    fn test_annotation_limit_counts_characters() {
        let mut form = valid_form();
        form.annotation = Some("ж".repeat(1000));
        assert!(form.validate_for(2024).is_ok());
    }

    #[test]
    fn test_unknown_sort_field_is_ignored() {
        let query = BookQuery {
            sort: Some("password_hash".to_string()),
            direction: Some("desc".to_string()),
            ..Default::default()
        };
        assert!(query.sort().is_none());

        let query = BookQuery {
            sort: Some("publish_year".to_string()),
            ..Default::default()
        };
        assert_eq!(query.sort().unwrap().to_sql(), "b.publish_year ASC");
    }

    #[test]
    fn test_filter_trims_search() {
        let query = BookQuery {
            search: Some("  ".to_string()),
            is_new: Some(true),
            ..Default::default()
        };
        assert_eq!(
            query.filter(),
            BookFilter {
                search: None,
                is_new: Some(true)
            }
        );
    }
}

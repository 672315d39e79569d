//! Reader (roster entry) model and related types

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::issue::IssueDetails;
use super::query::{search_term, Paging, Sort, SortField};
use crate::error::{collect_field_errors, push_field_error, AppError, AppResult, FieldErrors};

/// Fixed prefix of generated library card numbers
pub const CARD_PREFIX: &str = "ЧБ";

/// Width of the zero-padded numeric part of a card number
pub const CARD_DIGITS: usize = 5;

static CARD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^{}-(\d+)$", regex::escape(CARD_PREFIX))).expect("valid card number pattern")
});

/// Reader model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Reader {
    pub id: i32,
    pub card_number: String,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    /// Registration date
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reader row for lists, with lending counters
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ReaderShort {
    pub id: i32,
    pub card_number: String,
    pub name: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Books currently held
    pub active_issues: i64,
    /// Books ever taken
    pub total_issues: i64,
}

/// Reader with full lending history, most recent first
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReaderDetails {
    #[serde(flatten)]
    pub reader: Reader,
    pub active_issues: i64,
    pub issues: Vec<IssueDetails>,
}

/// One line of the roster CSV export
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct RosterRow {
    pub card_number: String,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub active_issues: i64,
    pub total_issues: i64,
}

/// Create/update payload as submitted by the client
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReaderForm {
    /// Leave empty to have the next free number assigned
    #[validate(length(max = 50, message = "Card number must be at most 50 characters"))]
    pub card_number: Option<String>,
    #[validate(
        required(message = "Name is required"),
        length(max = 255, message = "Name must be at most 255 characters")
    )]
    pub name: Option<String>,
    #[validate(length(max = 500, message = "Address must be at most 500 characters"))]
    pub address: Option<String>,
    pub phone: Option<String>,
}

/// Validated, normalized reader values ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewReader {
    pub card_number: String,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

/// Validated reader fields before a card number has been settled
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderInput {
    /// Normalized card number, `None` when the client left it empty
    pub card_number: Option<String>,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

impl ReaderInput {
    pub fn with_card_number(self, card_number: String) -> NewReader {
        NewReader {
            card_number,
            name: self.name,
            address: self.address,
            phone: self.phone,
        }
    }
}

impl ReaderForm {
    /// Validate and normalize. On failure the error carries the form exactly
    /// as submitted.
    pub fn validate_input(&self) -> AppResult<ReaderInput> {
        let mut fields = FieldErrors::new();
        if let Err(errors) = self.validate() {
            collect_field_errors(&errors, &mut fields);
        }

        let name = self.name.as_deref().map(str::trim);
        if name == Some("") {
            push_field_error(&mut fields, "name", "Name is required");
        }

        let phone = self.phone.as_deref().and_then(normalize_phone);
        if let Some(ref digits) = phone {
            if digits.len() > 20 {
                push_field_error(&mut fields, "phone", "Phone must contain at most 20 digits");
            }
        }

        match name {
            Some(name) if fields.is_empty() => Ok(ReaderInput {
                card_number: self.card_number.as_deref().and_then(normalize_card_number),
                name: name.to_string(),
                address: search_term(self.address.as_deref()),
                phone,
            }),
            _ => Err(AppError::validation(fields, self)),
        }
    }
}

/// Trim and upper-case a card number; blank input yields `None`
pub fn normalize_card_number(raw: &str) -> Option<String> {
    let card = raw.trim();
    if card.is_empty() {
        None
    } else {
        Some(card.to_uppercase())
    }
}

/// Keep only the digits of a phone number; no digits yields `None`
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// Format a card number from its numeric part
pub fn format_card_number(number: u64) -> String {
    format!("{}-{:0width$}", CARD_PREFIX, number, width = CARD_DIGITS)
}

/// Suggest the next card number: highest numeric suffix among cards matching
/// `<CARD_PREFIX>-<digits>`, plus one. Cards in any other format are ignored.
pub fn next_card_number<'a>(existing: impl IntoIterator<Item = &'a str>) -> String {
    let max = existing
        .into_iter()
        .filter_map(|card| CARD_PATTERN.captures(card.trim()))
        .filter_map(|caps| caps[1].parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format_card_number(max.saturating_add(1))
}

/// Columns a reader list may be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderSortField {
    Name,
    CardNumber,
    CreatedAt,
}

impl SortField for ReaderSortField {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "name" => Some(ReaderSortField::Name),
            "card_number" => Some(ReaderSortField::CardNumber),
            "created_at" => Some(ReaderSortField::CreatedAt),
            _ => None,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            ReaderSortField::Name => "r.name",
            ReaderSortField::CardNumber => "r.card_number",
            ReaderSortField::CreatedAt => "r.created_at",
        }
    }
}

/// Reader list filter. Set fields are combined with AND; `search` matches the
/// name OR the card number (case-insensitive substring). `has_books` keeps
/// readers holding at least one book (`true`) or none (`false`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReaderFilter {
    pub search: Option<String>,
    pub has_books: Option<bool>,
}

/// Reader list query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ReaderQuery {
    /// Substring of name or card number
    pub search: Option<String>,
    /// Only readers currently holding books (true) or holding none (false)
    pub has_books: Option<bool>,
    /// name, card_number or created_at
    pub sort: Option<String>,
    /// asc or desc
    pub direction: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ReaderQuery {
    pub fn filter(&self) -> ReaderFilter {
        ReaderFilter {
            search: search_term(self.search.as_deref()),
            has_books: self.has_books,
        }
    }

    pub fn sort(&self) -> Option<Sort<ReaderSortField>> {
        Sort::from_query(self.sort.as_deref(), self.direction.as_deref())
    }

    pub fn paging(&self) -> Paging {
        Paging::new(self.page, self.per_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_card_number_uses_max_not_count() {
        let existing = ["ЧБ-00001", "ЧБ-00007", "ЧБ-00003"];
        assert_eq!(next_card_number(existing), "ЧБ-00008");
    }

    #[test]
    fn test_next_card_number_edge_cases() {
        assert_eq!(next_card_number([]), "ЧБ-00001");
        assert_eq!(next_card_number(["ЧБ-00042"]), "ЧБ-00043");
        assert_eq!(next_card_number(["X-99999", "ЧБ-12", "ЧБ-ABC"]), "ЧБ-00013");
        assert_eq!(next_card_number(["ЧБ-99999"]), "ЧБ-100000");
    }

    #[test]
    fn test_normalize_card_number() {
        assert_eq!(normalize_card_number("  чб-00001 "), Some("ЧБ-00001".to_string()));
        assert_eq!(normalize_card_number("   "), None);
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+7 (912) 345-67-89"), Some("79123456789".to_string()));
        assert_eq!(normalize_phone("n/a"), None);
    }

    #[test]
    fn test_form_validation() {
        let form = ReaderForm {
            card_number: Some(" чб-00010".to_string()),
            name: Some(" Анна Каренина ".to_string()),
            address: Some("".to_string()),
            phone: Some("8-800-555-35-35".to_string()),
        };
        let input = form.validate_input().unwrap();
        assert_eq!(input.card_number.as_deref(), Some("ЧБ-00010"));
        assert_eq!(input.name, "Анна Каренина");
        assert_eq!(input.address, None);
        assert_eq!(input.phone.as_deref(), Some("88005553535"));

        let form = ReaderForm {
            name: Some("  ".to_string()),
            ..Default::default()
        };
        match form.validate_input() {
            Err(AppError::Validation { fields, input }) => {
                assert!(fields.contains_key("name"));
                assert_eq!(input["name"], "  ");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_reader_sort_allow_list() {
        let query = ReaderQuery {
            sort: Some("phone".to_string()),
            ..Default::default()
        };
        assert!(query.sort().is_none());
        assert!(ReaderSortField::parse("card_number").is_some());
    }
}

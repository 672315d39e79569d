//! Shared list-query building blocks: pagination, sorting, suggestions

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;
/// Highest page number accepted; keeps the offset within i64
pub const MAX_PAGE: i64 = i64::MAX / MAX_PER_PAGE;

/// Autocomplete terms shorter than this return nothing
pub const AUTOCOMPLETE_MIN_LEN: usize = 2;
pub const AUTOCOMPLETE_LIMIT: i64 = 10;

/// Normalized page window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: i64,
    pub per_page: i64,
}

impl Paging {
    /// Clamp raw query values: page within 1..=MAX_PAGE, per_page within
    /// 1..=MAX_PER_PAGE
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).clamp(1, MAX_PAGE),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

impl Default for Paging {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Anything other than "desc" (case-insensitive) sorts ascending
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.eq_ignore_ascii_case("desc") => SortDirection::Desc,
            _ => SortDirection::Asc,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A column that may appear in ORDER BY. Implemented by per-entity allow-lists.
pub trait SortField: Sized + Copy {
    /// Parse a client-supplied field name; unknown names yield `None`
    fn parse(raw: &str) -> Option<Self>;
    fn column(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort<F> {
    pub field: F,
    pub direction: SortDirection,
}

impl<F: SortField> Sort<F> {
    /// Build a sort from raw query parameters. An unrecognized field means
    /// "no explicit sort" and the listing keeps its default order.
    pub fn from_query(field: Option<&str>, direction: Option<&str>) -> Option<Self> {
        let field = F::parse(field?.trim())?;
        Some(Sort {
            field,
            direction: SortDirection::parse(direction),
        })
    }

    pub fn to_sql(&self) -> String {
        format!("{} {}", self.field.column(), self.direction.as_sql())
    }
}

/// Autocomplete entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Suggestion {
    pub id: i32,
    pub label: String,
}

/// Trimmed search term, or `None` when empty
pub fn search_term(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// `%term%` pattern for ILIKE with LIKE metacharacters escaped
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Field {
        Name,
    }

    impl SortField for Field {
        fn parse(raw: &str) -> Option<Self> {
            (raw == "name").then_some(Field::Name)
        }
        fn column(&self) -> &'static str {
            "name"
        }
    }

    #[test]
    fn test_paging_clamps() {
        let p = Paging::new(Some(0), Some(1000));
        assert_eq!(p.page, 1);
        assert_eq!(p.per_page, MAX_PER_PAGE);
        assert_eq!(Paging::new(Some(3), Some(10)).offset(), 20);
        assert_eq!(Paging::default().per_page, DEFAULT_PER_PAGE);
    }

    #[test]
    fn test_paging_huge_page_does_not_overflow() {
        let p = Paging::new(Some(i64::MAX), Some(MAX_PER_PAGE));
        assert_eq!(p.page, MAX_PAGE);
        assert!(p.offset() >= 0);
        assert_eq!(p.offset(), (MAX_PAGE - 1) * MAX_PER_PAGE);
        assert!(Paging::new(Some(i64::MIN), None).offset() == 0);
    }

    #[test]
    fn test_sort_from_query() {
        let sort = Sort::<Field>::from_query(Some("name"), Some("DESC")).unwrap();
        assert_eq!(sort.to_sql(), "name DESC");
        assert!(Sort::<Field>::from_query(Some("password"), Some("asc")).is_none());
        assert!(Sort::<Field>::from_query(None, Some("asc")).is_none());
    }

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(search_term(Some("   ")), None);
        assert_eq!(search_term(Some(" war ")), Some("war".to_string()));
    }
}

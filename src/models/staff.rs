//! Staff account model, roles and authentication claims

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{collect_field_errors, push_field_error, AppError, AppResult, FieldErrors};

/// Staff role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    Admin,
    Librarian,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Admin => "admin",
            StaffRole::Librarian => "librarian",
        }
    }

    /// Books, readers and issues
    pub fn can_manage_library(&self) -> bool {
        matches!(self, StaffRole::Admin | StaffRole::Librarian)
    }

    /// Staff accounts
    pub fn can_manage_users(&self) -> bool {
        matches!(self, StaffRole::Admin)
    }
}

impl std::fmt::Display for StaffRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StaffRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(StaffRole::Admin),
            "librarian" => Ok(StaffRole::Librarian),
            _ => Err(format!("Invalid staff role: {}", s)),
        }
    }
}

// SQLx conversion for StaffRole (stored as its lowercase name)
impl sqlx::Type<Postgres> for StaffRole {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for StaffRole {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for StaffRole {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Staff account from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct StaffUser {
    pub id: i32,
    pub login: String,
    /// Argon2 PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub role: StaffRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const LOGIN_MIN_LEN: usize = 3;
pub const LOGIN_MAX_LEN: usize = 64;

/// Lower-case and trim a login
pub fn normalize_login(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Create staff account request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct StaffForm {
    pub login: String,
    #[serde(skip_serializing)]
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 255, message = "Display name must be 1-255 characters"))]
    pub display_name: String,
    /// Defaults to librarian
    pub role: Option<StaffRole>,
}

/// Validated staff account; the password is still in clear text here
#[derive(Debug, Clone, PartialEq)]
pub struct NewStaffUser {
    pub login: String,
    pub password: String,
    pub display_name: String,
    pub role: StaffRole,
}

impl StaffForm {
    pub fn validate_input(&self) -> AppResult<NewStaffUser> {
        let mut fields = FieldErrors::new();
        if let Err(errors) = self.validate() {
            collect_field_errors(&errors, &mut fields);
        }
        let login = normalize_login(&self.login);
        if !(LOGIN_MIN_LEN..=LOGIN_MAX_LEN).contains(&login.chars().count()) {
            push_field_error(&mut fields, "login", "Login must be 3-64 characters");
        } else if login.chars().any(char::is_whitespace) {
            push_field_error(&mut fields, "login", "Login must not contain spaces");
        }
        if !fields.is_empty() {
            return Err(AppError::validation(fields, self));
        }
        Ok(NewStaffUser {
            login,
            password: self.password.clone(),
            display_name: self.display_name.trim().to_string(),
            role: self.role.unwrap_or(StaffRole::Librarian),
        })
    }
}

/// Update staff account request; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct StaffUpdate {
    #[validate(length(min = 1, max = 255, message = "Display name must be 1-255 characters"))]
    pub display_name: Option<String>,
    #[serde(skip_serializing)]
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: Option<String>,
    pub role: Option<StaffRole>,
}

impl StaffUpdate {
    pub fn check(&self) -> AppResult<()> {
        let mut fields = FieldErrors::new();
        if let Err(errors) = self.validate() {
            collect_field_errors(&errors, &mut fields);
        }
        if fields.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation(fields, self))
        }
    }
}

/// Values written by a staff update (password already hashed)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaffChanges {
    pub display_name: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<StaffRole>,
}

/// JWT claims identifying the staff member behind a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: StaffRole,
    pub exp: i64,
    pub iat: i64,
}

impl StaffClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn is_admin(&self) -> bool {
        self.role == StaffRole::Admin
    }

    pub fn require_manage_library(&self) -> Result<(), AppError> {
        if self.role.can_manage_library() {
            Ok(())
        } else {
            Err(AppError::Authorization("Insufficient rights to manage the library".to_string()))
        }
    }

    pub fn require_manage_users(&self) -> Result<(), AppError> {
        if self.role.can_manage_users() {
            Ok(())
        } else {
            Err(AppError::Authorization("Administrator privileges required".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: StaffRole) -> StaffClaims {
        let now = Utc::now().timestamp();
        StaffClaims {
            sub: "anna".to_string(),
            user_id: 5,
            role,
            exp: now + 3600,
            iat: now,
        }
    }

    #[test]
    fn test_capabilities() {
        assert!(claims(StaffRole::Librarian).require_manage_library().is_ok());
        assert!(claims(StaffRole::Librarian).require_manage_users().is_err());
        assert!(claims(StaffRole::Admin).require_manage_users().is_ok());
        assert!(claims(StaffRole::Admin).require_manage_library().is_ok());
    }

    #[test]
    fn test_token_round_trip() {
        let token = claims(StaffRole::Admin).create_token("secret").unwrap();
        let parsed = StaffClaims::from_token(&token, "secret").unwrap();
        assert_eq!(parsed.user_id, 5);
        assert_eq!(parsed.role, StaffRole::Admin);
        assert!(StaffClaims::from_token(&token, "other").is_err());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("ADMIN".parse::<StaffRole>().unwrap(), StaffRole::Admin);
        assert!("reader".parse::<StaffRole>().is_err());
    }

    #[test]
    fn test_form_normalizes_login() {
        let form = StaffForm {
            login: "  Anna.K ".to_string(),
            password: "secret123".to_string(),
            display_name: "Anna".to_string(),
            role: None,
        };
        let user = form.validate_input().unwrap();
        assert_eq!(user.login, "anna.k");
        assert_eq!(user.role, StaffRole::Librarian);

        let form = StaffForm {
            login: "ab".to_string(),
            password: "123".to_string(),
            display_name: "".to_string(),
            role: None,
        };
        match form.validate_input() {
            Err(AppError::Validation { fields, input }) => {
                assert_eq!(fields.len(), 3);
                assert!(input.get("password").is_none());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_login_length_counts_after_trim() {
        let form = StaffForm {
            login: "  a  ".to_string(),
            password: "secret123".to_string(),
            display_name: "A".to_string(),
            role: None,
        };
        match form.validate_input() {
            Err(AppError::Validation { fields, .. }) => {
                assert_eq!(fields["login"], vec!["Login must be 3-64 characters"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

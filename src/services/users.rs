//! Staff authentication and account management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;

use crate::{
    config::{AuthConfig, BootstrapAdmin},
    error::{AppError, AppResult},
    models::staff::{
        normalize_login, StaffChanges, StaffClaims, StaffForm, StaffRole, StaffUpdate, StaffUser,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Authenticate a staff member by login and password and issue a JWT
    pub async fn authenticate(&self, login: &str, password: &str) -> AppResult<(String, StaffUser)> {
        let user = self
            .repository
            .staff
            .get_by_login(&normalize_login(login))
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid login or password".to_string()))?;

        if !verify_password(&user.password_hash, password)? {
            tracing::warn!(login = %user.login, "Failed login attempt");
            return Err(AppError::Authentication("Invalid login or password".to_string()));
        }

        let token = self.create_token(&user)?;
        tracing::info!(user_id = user.id, "Staff member logged in");
        Ok((token, user))
    }

    fn create_token(&self, user: &StaffUser) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = StaffClaims {
            sub: user.login.clone(),
            user_id: user.id,
            role: user.role,
            exp: now + (self.config.jwt_expiration_hours as i64 * 3600),
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Decode and check a bearer token
    pub fn verify_token(&self, token: &str) -> AppResult<StaffClaims> {
        StaffClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|_| AppError::Authentication("Invalid or expired token".to_string()))
    }

    /// Resolve a bearer token to the staff member as currently stored. The
    /// role comes from the account, not the token, and a deleted account is
    /// no longer authenticated.
    pub async fn authorize(&self, token: &str) -> AppResult<StaffClaims> {
        let claims = self.verify_token(token)?;
        let user = match self.repository.staff.get_by_id(claims.user_id).await {
            Ok(user) => user,
            Err(AppError::NotFound(_)) => {
                tracing::warn!(user_id = claims.user_id, "Token presented for a deleted account");
                return Err(AppError::Authentication("Account no longer exists".to_string()));
            }
            Err(e) => return Err(e),
        };

        Ok(StaffClaims {
            sub: user.login,
            user_id: user.id,
            role: user.role,
            ..claims
        })
    }

    pub async fn get_user(&self, id: i32) -> AppResult<StaffUser> {
        self.repository.staff.get_by_id(id).await
    }

    pub async fn list_users(&self) -> AppResult<Vec<StaffUser>> {
        self.repository.staff.list().await
    }

    /// Create a staff account; only an admin may create another admin
    pub async fn create_user(&self, actor: &StaffClaims, form: &StaffForm) -> AppResult<StaffUser> {
        let user = form.validate_input()?;
        if user.role == StaffRole::Admin && !actor.is_admin() {
            return Err(AppError::Authorization(
                "Only an administrator can create administrator accounts".to_string(),
            ));
        }

        if self.repository.staff.get_by_login(&user.login).await?.is_some() {
            return Err(AppError::Conflict(format!("Login '{}' is already taken", user.login)));
        }

        let password_hash = hash_password(&user.password)?;
        let created = self
            .repository
            .staff
            .create(&user.login, &password_hash, &user.display_name, user.role)
            .await?;
        tracing::info!(user_id = created.id, created_by = actor.user_id, "Staff account created");
        Ok(created)
    }

    pub async fn update_user(
        &self,
        actor: &StaffClaims,
        id: i32,
        update: &StaffUpdate,
    ) -> AppResult<StaffUser> {
        update.check()?;
        if update.role == Some(StaffRole::Admin) && !actor.is_admin() {
            return Err(AppError::Authorization(
                "Only an administrator can grant administrator rights".to_string(),
            ));
        }

        let changes = StaffChanges {
            display_name: update.display_name.as_deref().map(|name| name.trim().to_string()),
            password_hash: update.password.as_deref().map(hash_password).transpose()?,
            role: update.role,
        };
        let updated = self.repository.staff.update(id, &changes).await?;
        tracing::info!(user_id = id, updated_by = actor.user_id, "Staff account updated");
        Ok(updated)
    }

    /// Delete a staff account. Nobody can delete their own account, and
    /// accounts that recorded issues stay.
    pub async fn delete_user(&self, actor: &StaffClaims, id: i32) -> AppResult<()> {
        if actor.user_id == id {
            return Err(AppError::BadRequest("You cannot delete your own account".to_string()));
        }
        self.repository.staff.delete(id).await?;
        tracing::info!(user_id = id, deleted_by = actor.user_id, "Staff account deleted");
        Ok(())
    }

    /// Create the configured admin when no staff account exists yet
    pub async fn ensure_bootstrap_admin(&self, admin: &BootstrapAdmin) -> AppResult<Option<StaffUser>> {
        if self.repository.staff.count().await? > 0 {
            return Ok(None);
        }

        let password_hash = hash_password(&admin.password)?;
        let created = self
            .repository
            .staff
            .create(
                &normalize_login(&admin.login),
                &password_hash,
                &admin.display_name,
                StaffRole::Admin,
            )
            .await?;
        tracing::warn!(login = %created.login, "Bootstrap administrator created; change its password");
        Ok(Some(created))
    }
}

/// Hash a password using Argon2 with a random salt
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

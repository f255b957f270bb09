use std::fmt::{Debug, Display};

use argon2::{
    Argon2, PasswordHash, PasswordVerifier,
    password_hash::{PasswordHasher, SaltString},
};
use axum::{extract::FromRequestParts, response::IntoResponse};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use rand::{Rng, SeedableRng, TryRngCore, distr::Alphanumeric, rngs::{OsRng, StdRng}};
use serde::Serialize;
use uuid::Uuid;
use valuable::Valuable;

use crate::{
    db::{self, model::person::UserRole},
    schema::person,
};

use super::AppState;

const KEY_PREFIX_LENGTH: usize = 8;
const KEY_LENGTH: usize = 32;

/// A plaintext API key. Only its first 8 characters and an argon2 hash are
/// ever stored.
pub struct ApiKey(String);

impl ApiKey {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn prefix(&self) -> &str {
        let Self(key) = self;
        &key[..KEY_PREFIX_LENGTH.min(key.len())]
    }

    #[must_use]
    pub fn hash(&self) -> HashedApiKey {
        let Self(key) = self;

        let mut salt = [0u8; 16];
        OsRng.try_fill_bytes(&mut salt).unwrap();
        let salt = SaltString::encode_b64(&salt).unwrap();

        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(key.as_bytes(), &salt)
            .unwrap()
            .to_string();

        HashedApiKey {
            prefix: self.prefix().to_string(),
            hash,
        }
    }

    fn matches_hash(&self, stored_hash: &str) -> bool {
        let Self(key) = self;

        let Ok(parsed_hash) = PasswordHash::new(stored_hash) else {
            return false;
        };

        Argon2::default()
            .verify_password(key.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

impl Default for ApiKey {
    fn default() -> Self {
        let mut rng = StdRng::from_os_rng();
        let key = (0..KEY_LENGTH)
            .map(|_| rng.sample(Alphanumeric) as char)
            .collect();

        Self(key)
    }
}

impl From<String> for ApiKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKey({}…)", self.prefix())
    }
}

impl Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self(inner) = self;
        <String as Display>::fmt(inner, f)
    }
}

pub struct HashedApiKey {
    pub prefix: String,
    pub hash: String,
}

#[derive(Clone, Debug)]
pub(super) struct User {
    pub(super) id: Uuid,
    pub(super) roles: Vec<UserRole>,
}

impl User {
    async fn fetch_by_api_key(
        api_key: &ApiKey,
        db_conn: &mut AsyncPgConnection,
    ) -> db::error::Result<Self> {
        let (id, roles, stored_hash): (Uuid, Vec<UserRole>, Option<String>) = person::table
            .filter(person::api_key_prefix.eq(api_key.prefix()))
            .select((person::id, person::roles, person::api_key_hash))
            .first(db_conn)
            .await?;

        let Some(stored_hash) = stored_hash else {
            return Err(db::error::Error::RecordNotFound);
        };

        if !api_key.matches_hash(&stored_hash) {
            return Err(db::error::Error::RecordNotFound);
        }

        Ok(Self { id, roles })
    }

    fn has_role(&self, role: UserRole) -> bool {
        self.roles.contains(&role)
    }
}

impl FromRequestParts<AppState> for User {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        app_state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let AppState::Dev { user_id, .. } = app_state {
            return Ok(Self {
                id: *user_id,
                roles: vec![UserRole::AppAdmin, UserRole::LabStaff],
            });
        }

        let Some(api_key) = parts
            .headers
            .get("X-API-Key")
            .and_then(|value| value.to_str().ok())
            .map(|key| ApiKey::from(key.to_string()))
        else {
            return Err(Error::InvalidApiKey);
        };

        let mut db_conn = app_state.db_conn().await?;

        Ok(Self::fetch_by_api_key(&api_key, &mut db_conn).await?)
    }
}

/// Rejects callers without the lab staff (or admin) role.
pub(super) struct Staff(pub(super) User);

impl FromRequestParts<AppState> for Staff {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        app_state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user =
            <User as FromRequestParts<AppState>>::from_request_parts(parts, app_state).await?;

        if !(user.has_role(UserRole::LabStaff) || user.has_role(UserRole::AppAdmin)) {
            return Err(Error::Permission {
                message: "lab staff role required".to_string(),
            });
        }

        Ok(Self(user))
    }
}

pub(super) struct Admin(pub(super) User);

impl FromRequestParts<AppState> for Admin {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        app_state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user =
            <User as FromRequestParts<AppState>>::from_request_parts(parts, app_state).await?;

        if !user.has_role(UserRole::AppAdmin) {
            return Err(Error::Permission {
                message: "app admin role required".to_string(),
            });
        }

        Ok(Self(user))
    }
}

#[derive(thiserror::Error, Serialize, Debug, Clone, Valuable)]
#[serde(rename_all = "snake_case", tag = "type")]
pub(super) enum Error {
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("operation not permitted")]
    Permission { message: String },
    #[error(transparent)]
    Other(db::error::Error),
}

impl From<db::error::Error> for Error {
    fn from(err: db::error::Error) -> Self {
        match err {
            db::error::Error::RecordNotFound => Self::InvalidApiKey,
            _ => Self::Other(err),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        tracing::error!(auth_error = self.as_value());

        #[derive(Serialize)]
        struct ErrorResponse {
            status: u16,
            error: Option<Error>,
        }

        let status = match self {
            Self::InvalidApiKey => StatusCode::UNAUTHORIZED,
            Self::Permission { .. } => StatusCode::FORBIDDEN,
            Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            None
        } else {
            Some(self)
        };

        (
            status,
            axum::Json(ErrorResponse {
                status: status.as_u16(),
                error,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn generated_keys_are_alphanumeric() {
        let ApiKey(key) = ApiKey::new();

        assert_eq!(key.len(), KEY_LENGTH);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn hash_keeps_only_the_prefix() {
        let api_key = ApiKey::new();
        let hashed = api_key.hash();

        assert_eq!(hashed.prefix.len(), KEY_PREFIX_LENGTH);
        assert!(api_key.to_string().starts_with(&hashed.prefix));
        assert!(!hashed.hash.contains(&api_key.to_string()));
    }

    #[test]
    fn hash_verification_round_trips() {
        let api_key = ApiKey::new();
        let hashed = api_key.hash();

        assert!(api_key.matches_hash(&hashed.hash));
        assert!(!ApiKey::new().matches_hash(&hashed.hash));
    }
}

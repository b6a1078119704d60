use actix_web::{dev::ServiceRequest, web, Error, HttpMessage};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::ApiError,
    models::{Role, UserRow},
    state::AppState,
};

/// The authenticated actor attached to a request after bearer validation.
#[derive(Clone, Debug)]
pub struct Principal {
    pub id: String,
    pub display_name: String,
    pub role: Role,
}

impl Principal {
    /// Empleados and admins may approve, reject, complete appointments and
    /// manage the service catalog.
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Empleado | Role::Admin)
    }
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed_hash = PasswordHash::new(password_hash);
    match parsed_hash {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Claims carried by both access and refresh tokens; `token_type`
/// distinguishes them so a refresh token can never authenticate a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub role: Role,
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

pub fn issue_token_pair(user: &UserRow, config: &AppConfig) -> Result<TokenPair, ApiError> {
    let access = issue_token(user, "access", config.access_token_lifetime_secs, config)?;
    let refresh = issue_token(user, "refresh", config.refresh_token_lifetime_secs, config)?;
    Ok(TokenPair { access, refresh })
}

pub fn issue_token(
    user: &UserRow,
    token_type: &str,
    lifetime_secs: i64,
    config: &AppConfig,
) -> Result<String, ApiError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user.id.clone(),
        name: user.display_name.clone(),
        role: user.role,
        token_type: token_type.to_string(),
        iat: now,
        exp: now + lifetime_secs,
        jti: new_id(),
    };

    let key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)
        .map_err(|err| ApiError::Internal(format!("JWT encode: {err}")))
}

/// Decode and verify a token, also checking it is of the expected type.
pub fn decode_token(
    token: &str,
    expected_type: &str,
    config: &AppConfig,
) -> Result<Claims, ApiError> {
    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["sub", "exp", "iat"]);

    let claims = jsonwebtoken::decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|_| ApiError::AuthenticationRequired)?;

    if claims.token_type != expected_type {
        return Err(ApiError::AuthenticationRequired);
    }
    Ok(claims)
}

/// Resolve the bearer token into a `Principal`, re-reading the user row so
/// a deactivated account or changed role takes effect immediately.
pub async fn resolve_principal(state: &AppState, token: &str) -> Result<Principal, ApiError> {
    let claims = decode_token(token, "access", &state.config)?;

    let user = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, email, display_name, telefono, role, password_hash, active, created_at
           FROM users
           WHERE id = ? AND active = 1
           LIMIT 1"#,
    )
    .bind(&claims.sub)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::AuthenticationRequired)?;

    Ok(Principal {
        id: user.id,
        display_name: user.display_name,
        role: user.role,
    })
}

pub async fn bearer_validator(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    let Some(state) = req.app_data::<web::Data<AppState>>() else {
        return Err((ApiError::AuthenticationRequired.into(), req));
    };

    match resolve_principal(state, credentials.token()).await {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            Ok(req)
        }
        Err(_) => Err((ApiError::AuthenticationRequired.into(), req)),
    }
}

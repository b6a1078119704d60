use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{
        bearer_validator, decode_token, hash_password, issue_token, issue_token_pair, new_id,
        verify_password, Principal,
    },
    error::{is_unique_violation, ApiError},
    models::{Role, UserRow},
    state::AppState,
};

#[derive(Deserialize)]
struct RegisterForm {
    username: String,
    email: String,
    password: String,
    nombre: Option<String>,
    telefono: Option<String>,
    rol: Option<Role>,
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct RefreshForm {
    refresh: String,
}

#[derive(Deserialize)]
struct VerifyForm {
    token: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/auth")
            .service(web::resource("/register").route(web::post().to(register)))
            .service(web::resource("/login").route(web::post().to(login)))
            .service(web::resource("/refresh").route(web::post().to(refresh)))
            .service(web::resource("/verify").route(web::post().to(verify)))
            .service(
                web::resource("/profile")
                    .wrap(HttpAuthentication::bearer(bearer_validator))
                    .route(web::get().to(profile)),
            ),
    )
    .service(
        web::resource("/api/users")
            .wrap(HttpAuthentication::bearer(bearer_validator))
            .route(web::get().to(list_users)),
    );
}

fn user_json(id: &str, username: &str, email: Option<&str>, role: Role) -> serde_json::Value {
    json!({
        "id": id,
        "username": username,
        "email": email,
        "is_staff": matches!(role, Role::Empleado | Role::Admin),
    })
}

async fn register(
    state: web::Data<AppState>,
    form: web::Json<RegisterForm>,
) -> Result<HttpResponse, ApiError> {
    let form = form.into_inner();
    let username = form.username.trim().to_string();
    if username.is_empty() {
        return Err(ApiError::validation("username", "username must not be empty"));
    }
    if form.password.is_empty() {
        return Err(ApiError::validation("password", "password must not be empty"));
    }

    let role = form.rol.unwrap_or(Role::Cliente);
    let display_name = form
        .nombre
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(&username)
        .to_string();

    let password_hash = hash_password(&form.password)
        .map_err(|err| ApiError::Internal(format!("password hash failed: {err}")))?;
    let id = new_id();

    let result = sqlx::query(
        r#"INSERT INTO users (id, username, email, display_name, telefono, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&id)
    .bind(&username)
    .bind(&form.email)
    .bind(&display_name)
    .bind(&form.telefono)
    .bind(role)
    .bind(&password_hash)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await;

    match result {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => {
            return Err(ApiError::validation("username", "username already taken"));
        }
        Err(err) => return Err(err.into()),
    }

    log::info!("user {username} registered as {}", role.as_str());
    Ok(HttpResponse::Created().json(user_json(&id, &username, Some(&form.email), role)))
}

async fn login(
    state: web::Data<AppState>,
    form: web::Json<LoginForm>,
) -> Result<HttpResponse, ApiError> {
    let user = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, email, display_name, telefono, role, password_hash, active, created_at
           FROM users
           WHERE username = ? AND active = 1
           LIMIT 1"#,
    )
    .bind(form.username.trim())
    .fetch_optional(&state.db)
    .await?;

    let user = match user {
        Some(user) if verify_password(&form.password, &user.password_hash) => user,
        _ => return Err(ApiError::AuthenticationRequired),
    };

    let pair = issue_token_pair(&user, &state.config)?;
    Ok(HttpResponse::Ok().json(pair))
}

async fn refresh(
    state: web::Data<AppState>,
    form: web::Json<RefreshForm>,
) -> Result<HttpResponse, ApiError> {
    let claims = decode_token(&form.refresh, "refresh", &state.config)?;

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

    let access = issue_token(
        &user,
        "access",
        state.config.access_token_lifetime_secs,
        &state.config,
    )?;
    Ok(HttpResponse::Ok().json(json!({ "access": access })))
}

async fn verify(
    state: web::Data<AppState>,
    form: web::Json<VerifyForm>,
) -> Result<HttpResponse, ApiError> {
    // Either token kind verifies, matching the original token-verify endpoint.
    if decode_token(&form.token, "access", &state.config).is_err()
        && decode_token(&form.token, "refresh", &state.config).is_err()
    {
        return Err(ApiError::AuthenticationRequired);
    }
    Ok(HttpResponse::Ok().json(json!({})))
}

async fn profile(
    state: web::Data<AppState>,
    principal: web::ReqData<Principal>,
) -> Result<HttpResponse, ApiError> {
    let user = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, email, display_name, telefono, role, password_hash, active, created_at
           FROM users
           WHERE id = ?
           LIMIT 1"#,
    )
    .bind(&principal.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::AuthenticationRequired)?;

    Ok(HttpResponse::Ok().json(json!({
        "user": user_json(&user.id, &user.username, user.email.as_deref(), user.role),
        "nombre": user.display_name,
        "telefono": user.telefono,
        "rol": user.role,
    })))
}

async fn list_users(
    state: web::Data<AppState>,
    principal: web::ReqData<Principal>,
) -> Result<HttpResponse, ApiError> {
    if principal.role != Role::Admin {
        return Err(ApiError::PermissionDenied(
            "only admins may list users".to_string(),
        ));
    }

    let users = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, email, display_name, telefono, role, password_hash, active, created_at
           FROM users
           ORDER BY username"#,
    )
    .fetch_all(&state.db)
    .await?;

    let body: Vec<_> = users
        .iter()
        .map(|u| user_json(&u.id, &u.username, u.email.as_deref(), u.role))
        .collect();
    Ok(HttpResponse::Ok().json(body))
}

use std::{env, fs, path::Path};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::{hash_password, new_id},
    models::Role,
};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn seed_defaults(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    seed_admin(pool).await?;
    seed_services(pool).await?;
    Ok(())
}

async fn seed_admin(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(Role::Admin)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Ok(());
    }

    let username = env::var("ADMIN_USER").unwrap_or_else(|_| "admin".to_string());
    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    let display_name = env::var("ADMIN_DISPLAY_NAME").unwrap_or_else(|_| "Administrador".to_string());

    if password == "admin" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
    }

    let password_hash = hash_password(&password)
        .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"INSERT INTO users (id, username, email, display_name, telefono, role, password_hash, active, created_at)
           VALUES (?, ?, NULL, ?, NULL, ?, ?, 1, ?)"#,
    )
    .bind(new_id())
    .bind(username)
    .bind(display_name)
    .bind(Role::Admin)
    .bind(password_hash)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

async fn seed_services(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let catalog: [(&str, i64, &str); 5] = [
        ("Consulta General", 30, "50.00"),
        ("Consulta Especializada", 45, "100.00"),
        ("Laboratorio", 20, "75.00"),
        ("Ecografía", 30, "150.00"),
        ("Cirugía Menor", 60, "500.00"),
    ];

    for (nombre, duracion, precio) in catalog {
        let exists =
            sqlx::query_as::<_, (String,)>("SELECT id FROM servicios WHERE nombre = ? LIMIT 1")
                .bind(nombre)
                .fetch_optional(pool)
                .await?;
        if exists.is_some() {
            continue;
        }
        sqlx::query(
            r#"INSERT INTO servicios (id, nombre, descripcion, duracion, precio, activo)
               VALUES (?, ?, NULL, ?, ?, 1)"#,
        )
        .bind(new_id())
        .bind(nombre)
        .bind(duracion)
        .bind(precio)
        .execute(pool)
        .await?;
    }

    Ok(())
}

//! Route-level tests: JSON bodies in and out, bearer auth, and error
//! status mapping.

use std::str::FromStr;

use actix_web::{middleware, test, web, App};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use reservas_citas::config::{AppConfig, BusinessHours};
use reservas_citas::routes;
use reservas_citas::state::AppState;

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        port: 0,
        jwt_secret: "test-secret".into(),
        access_token_lifetime_secs: 900,
        refresh_token_lifetime_secs: 3600,
        business_hours: BusinessHours::default(),
    }
}

async fn test_state() -> AppState {
    let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    reservas_citas::db::run_migrations(&pool).await.unwrap();
    AppState::new(pool, test_config())
}

macro_rules! test_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .wrap(middleware::NormalizePath::trim())
                .configure(routes::health::configure)
                .configure(routes::auth::configure)
                .configure(routes::servicios::configure)
                .configure(routes::citas::configure),
        )
        .await
    };
}

macro_rules! register_and_login {
    ($app:expr, $username:expr, $rol:expr) => {{
        let username: &str = $username;
        let resp = test::call_service(
            $app,
            test::TestRequest::post()
                .uri("/api/auth/register")
                .set_json(json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": "pass123",
                    "rol": $rol,
                }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 201);

        let resp = test::call_service(
            $app,
            test::TestRequest::post()
                .uri("/api/auth/login")
                .set_json(json!({ "username": username, "password": "pass123" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;
        body["access"].as_str().unwrap().to_string()
    }};
}

fn tomorrow() -> String {
    (Utc::now().date_naive() + Duration::days(1)).to_string()
}

#[actix_web::test]
async fn health_reports_ok() {
    let state = test_state().await;
    let app = test_app!(state);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request())
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
}

#[actix_web::test]
async fn appointments_require_bearer_token() {
    let state = test_state().await;
    let app = test_app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/citas/citas").to_request(),
    )
    .await;
    assert_eq!(resp.status(), 401);

    // A token that fails validation carries the same {"detail": ...} body
    // as every other error in the service.
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/citas/citas")
            .insert_header(("Authorization", "Bearer not-a-token"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 401);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "authentication required");
}

#[actix_web::test]
async fn duplicate_registration_rejected() {
    let state = test_state().await;
    let app = test_app!(state);

    let register = || {
        test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({
                "username": "cliente1",
                "email": "cliente1@example.com",
                "password": "pass123",
            }))
            .to_request()
    };

    let resp = test::call_service(&app, register()).await;
    assert_eq!(resp.status(), 201);

    let resp = test::call_service(&app, register()).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["field"], "username");
    assert_eq!(body["detail"], "username: username already taken");
}

#[actix_web::test]
async fn register_book_and_fetch_flow() {
    let state = test_state().await;
    let app = test_app!(state);

    let staff_token = register_and_login!(&app, "empleado1", "empleado");
    let client_token = register_and_login!(&app, "cliente1", "cliente");

    // Staff publishes a service.
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/citas/servicios")
            .insert_header(("Authorization", format!("Bearer {staff_token}")))
            .set_json(json!({
                "nombre": "Consulta General",
                "duracion": 30,
                "precio": "50.00",
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 201);
    let service: Value = test::read_body_json(resp).await;
    assert_eq!(service["precio"], "50.00");
    let service_id = service["id"].as_str().unwrap().to_string();

    // Client books a slot.
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/citas/citas")
            .insert_header(("Authorization", format!("Bearer {client_token}")))
            .set_json(json!({
                "servicio": service_id,
                "fecha": tomorrow(),
                "hora": "10:00:00",
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 201);
    let cita: Value = test::read_body_json(resp).await;
    assert_eq!(cita["estado"], "pendiente");
    assert_eq!(cita["cliente_nombre"], "cliente1");
    assert_eq!(cita["servicio_detalle"]["nombre"], "Consulta General");
    let cita_id = cita["id"].as_str().unwrap().to_string();

    // Same representation comes back on read.
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/citas/citas/{cita_id}"))
            .insert_header(("Authorization", format!("Bearer {client_token}")))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let fetched: Value = test::read_body_json(resp).await;
    assert_eq!(fetched["id"], cita_id.as_str());
    assert_eq!(fetched["estado"], "pendiente");
    assert_eq!(fetched["hora"], cita["hora"]);
}

#[actix_web::test]
async fn double_booking_maps_to_409() {
    let state = test_state().await;
    let app = test_app!(state);

    let staff_token = register_and_login!(&app, "empleado1", "empleado");
    let client_token = register_and_login!(&app, "cliente1", "cliente");

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/citas/servicios")
            .insert_header(("Authorization", format!("Bearer {staff_token}")))
            .set_json(json!({ "nombre": "Laboratorio", "duracion": 20, "precio": "75.00" }))
            .to_request(),
    )
    .await;
    let service: Value = test::read_body_json(resp).await;
    let service_id = service["id"].as_str().unwrap();

    let book = |token: String| {
        test::TestRequest::post()
            .uri("/api/citas/citas")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .set_json(json!({
                "servicio": service_id,
                "fecha": tomorrow(),
                "hora": "12:00:00",
            }))
            .to_request()
    };

    let resp = test::call_service(&app, book(client_token.clone())).await;
    assert_eq!(resp.status(), 201);
    let resp = test::call_service(&app, book(staff_token.clone())).await;
    assert_eq!(resp.status(), 409);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "slot already reserved");
}

#[actix_web::test]
async fn client_cannot_approve() {
    let state = test_state().await;
    let app = test_app!(state);

    let staff_token = register_and_login!(&app, "empleado1", "empleado");
    let client_token = register_and_login!(&app, "cliente1", "cliente");

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/citas/servicios")
            .insert_header(("Authorization", format!("Bearer {staff_token}")))
            .set_json(json!({ "nombre": "Ecografía", "duracion": 30, "precio": "150.00" }))
            .to_request(),
    )
    .await;
    let service: Value = test::read_body_json(resp).await;
    let service_id = service["id"].as_str().unwrap();

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/citas/citas")
            .insert_header(("Authorization", format!("Bearer {client_token}")))
            .set_json(json!({
                "servicio": service_id,
                "fecha": tomorrow(),
                "hora": "09:00:00",
            }))
            .to_request(),
    )
    .await;
    let cita: Value = test::read_body_json(resp).await;
    let cita_id = cita["id"].as_str().unwrap();

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/api/citas/citas/{cita_id}/aprobar"))
            .insert_header(("Authorization", format!("Bearer {client_token}")))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 403);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/api/citas/citas/{cita_id}/aprobar"))
            .insert_header(("Authorization", format!("Bearer {staff_token}")))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let approved: Value = test::read_body_json(resp).await;
    assert_eq!(approved["estado"], "aprobada");
    assert!(approved["empleado"].is_string());
}

#[actix_web::test]
async fn date_range_listing_requires_both_bounds() {
    let state = test_state().await;
    let app = test_app!(state);

    let client_token = register_and_login!(&app, "cliente1", "cliente");

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/citas/citas/por_rango_fechas?fecha_desde=2030-01-01")
            .insert_header(("Authorization", format!("Bearer {client_token}")))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn listing_is_scoped_to_the_caller() {
    let state = test_state().await;
    let app = test_app!(state);

    let staff_token = register_and_login!(&app, "empleado1", "empleado");
    let a_token = register_and_login!(&app, "cliente_a", "cliente");
    let b_token = register_and_login!(&app, "cliente_b", "cliente");

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/citas/servicios")
            .insert_header(("Authorization", format!("Bearer {staff_token}")))
            .set_json(json!({ "nombre": "Consulta General", "duracion": 30, "precio": "50.00" }))
            .to_request(),
    )
    .await;
    let service: Value = test::read_body_json(resp).await;
    let service_id = service["id"].as_str().unwrap();

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/citas/citas")
            .insert_header(("Authorization", format!("Bearer {a_token}")))
            .set_json(json!({
                "servicio": service_id,
                "fecha": tomorrow(),
                "hora": "10:00:00",
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 201);

    // Client B sees nothing, even filtering by A's name.
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/citas/citas?cliente_nombre=cliente_a")
            .insert_header(("Authorization", format!("Bearer {b_token}")))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body.as_array().unwrap().len(), 0);

    // Staff see the appointment.
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/citas/citas")
            .insert_header(("Authorization", format!("Bearer {staff_token}")))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn only_admin_lists_users() {
    let state = test_state().await;
    let app = test_app!(state);

    let admin_token = register_and_login!(&app, "admin1", "admin");
    let client_token = register_and_login!(&app, "cliente1", "cliente");

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/users")
            .insert_header(("Authorization", format!("Bearer {client_token}")))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 403);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/users")
            .insert_header(("Authorization", format!("Bearer {admin_token}")))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[actix_web::test]
async fn refresh_and_verify_tokens() {
    let state = test_state().await;
    let app = test_app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({
                "username": "cliente1",
                "email": "cliente1@example.com",
                "password": "pass123",
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 201);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "username": "cliente1", "password": "pass123" }))
            .to_request(),
    )
    .await;
    let tokens: Value = test::read_body_json(resp).await;
    let refresh = tokens["refresh"].as_str().unwrap();

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/refresh")
            .set_json(json!({ "refresh": refresh }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["access"].is_string());

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/verify")
            .set_json(json!({ "token": refresh }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);

    // A refresh token cannot authenticate an API call.
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/citas/citas")
            .insert_header(("Authorization", format!("Bearer {refresh}")))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 401);
}

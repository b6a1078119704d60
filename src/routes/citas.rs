use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{bearer_validator, Principal},
    error::ApiError,
    ledger::{AppointmentFilter, AppointmentInput},
    models::{AppointmentBody, AppointmentStatus},
    state::AppState,
};

#[derive(Deserialize)]
struct RangeQuery {
    fecha_desde: Option<NaiveDate>,
    fecha_hasta: Option<NaiveDate>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/citas/citas")
            .wrap(HttpAuthentication::bearer(bearer_validator))
            .service(
                web::resource("")
                    .route(web::get().to(list))
                    .route(web::post().to(create)),
            )
            .service(web::resource("/pendientes").route(web::get().to(pendientes)))
            .service(web::resource("/mis_citas").route(web::get().to(mis_citas)))
            .service(web::resource("/por_rango_fechas").route(web::get().to(por_rango_fechas)))
            .service(web::resource("/{id}").route(web::get().to(get)))
            .service(web::resource("/{id}/aprobar").route(web::post().to(aprobar)))
            .service(web::resource("/{id}/rechazar").route(web::post().to(rechazar)))
            .service(web::resource("/{id}/completar").route(web::post().to(completar)))
            .service(web::resource("/{id}/cancelar").route(web::post().to(cancelar))),
    );
}

fn bodies(rows: Vec<crate::models::AppointmentRow>) -> Vec<AppointmentBody> {
    rows.into_iter().map(AppointmentBody::from).collect()
}

async fn list(
    state: web::Data<AppState>,
    principal: web::ReqData<Principal>,
    filter: web::Query<AppointmentFilter>,
) -> Result<HttpResponse, ApiError> {
    let rows = state.ledger.list_appointments(&principal, &filter).await?;
    Ok(HttpResponse::Ok().json(bodies(rows)))
}

async fn create(
    state: web::Data<AppState>,
    principal: web::ReqData<Principal>,
    input: web::Json<AppointmentInput>,
) -> Result<HttpResponse, ApiError> {
    let row = state
        .ledger
        .create_appointment(&principal, input.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(AppointmentBody::from(row)))
}

async fn get(
    state: web::Data<AppState>,
    principal: web::ReqData<Principal>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let row = state
        .ledger
        .get_appointment(&principal, &path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(AppointmentBody::from(row)))
}

async fn aprobar(
    state: web::Data<AppState>,
    principal: web::ReqData<Principal>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let row = state.ledger.approve(&path.into_inner(), &principal).await?;
    Ok(HttpResponse::Ok().json(AppointmentBody::from(row)))
}

async fn rechazar(
    state: web::Data<AppState>,
    principal: web::ReqData<Principal>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let row = state.ledger.reject(&path.into_inner(), &principal).await?;
    Ok(HttpResponse::Ok().json(AppointmentBody::from(row)))
}

async fn completar(
    state: web::Data<AppState>,
    principal: web::ReqData<Principal>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let row = state.ledger.complete(&path.into_inner(), &principal).await?;
    Ok(HttpResponse::Ok().json(AppointmentBody::from(row)))
}

async fn cancelar(
    state: web::Data<AppState>,
    principal: web::ReqData<Principal>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let row = state.ledger.cancel(&path.into_inner(), &principal).await?;
    Ok(HttpResponse::Ok().json(AppointmentBody::from(row)))
}

async fn pendientes(
    state: web::Data<AppState>,
    principal: web::ReqData<Principal>,
) -> Result<HttpResponse, ApiError> {
    let filter = AppointmentFilter {
        estado: Some(AppointmentStatus::Pendiente),
        ..AppointmentFilter::default()
    };
    let rows = state.ledger.list_appointments(&principal, &filter).await?;
    Ok(HttpResponse::Ok().json(bodies(rows)))
}

/// Own appointments regardless of role: staff also see only theirs here.
async fn mis_citas(
    state: web::Data<AppState>,
    principal: web::ReqData<Principal>,
) -> Result<HttpResponse, ApiError> {
    let rows = state
        .ledger
        .list_own_appointments(&principal, &AppointmentFilter::default())
        .await?;
    Ok(HttpResponse::Ok().json(bodies(rows)))
}

async fn por_rango_fechas(
    state: web::Data<AppState>,
    principal: web::ReqData<Principal>,
    query: web::Query<RangeQuery>,
) -> Result<HttpResponse, ApiError> {
    let (Some(desde), Some(hasta)) = (query.fecha_desde, query.fecha_hasta) else {
        return Err(ApiError::validation(
            "fecha_desde",
            "fecha_desde and fecha_hasta are required (YYYY-MM-DD)",
        ));
    };

    let filter = AppointmentFilter {
        fecha_desde: Some(desde),
        fecha_hasta: Some(hasta),
        ..AppointmentFilter::default()
    };
    let mut rows = state.ledger.list_appointments(&principal, &filter).await?;
    rows.sort_by_key(|row| (row.fecha, row.hora));

    let results = bodies(rows);
    Ok(HttpResponse::Ok().json(json!({ "count": results.len(), "results": results })))
}

use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;

use crate::{
    auth::{bearer_validator, Principal},
    error::ApiError,
    ledger::{ServiceFilter, ServiceInput},
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/citas/servicios")
            .wrap(HttpAuthentication::bearer(bearer_validator))
            .service(
                web::resource("")
                    .route(web::get().to(list))
                    .route(web::post().to(create)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(get))
                    .route(web::put().to(update))
                    .route(web::delete().to(deactivate)),
            ),
    );
}

async fn list(
    state: web::Data<AppState>,
    filter: web::Query<ServiceFilter>,
) -> Result<HttpResponse, ApiError> {
    let services = state.ledger.list_services(&filter).await?;
    Ok(HttpResponse::Ok().json(services))
}

async fn create(
    state: web::Data<AppState>,
    principal: web::ReqData<Principal>,
    input: web::Json<ServiceInput>,
) -> Result<HttpResponse, ApiError> {
    let service = state
        .ledger
        .create_service(&principal, input.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(service))
}

async fn get(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let service = state.ledger.get_service(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(service))
}

async fn update(
    state: web::Data<AppState>,
    principal: web::ReqData<Principal>,
    path: web::Path<String>,
    input: web::Json<ServiceInput>,
) -> Result<HttpResponse, ApiError> {
    let service = state
        .ledger
        .update_service(&principal, &path.into_inner(), input.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(service))
}

/// DELETE soft-disables: appointments keep their service reference.
async fn deactivate(
    state: web::Data<AppState>,
    principal: web::ReqData<Principal>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let service = state
        .ledger
        .deactivate_service(&principal, &path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(service))
}

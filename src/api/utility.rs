//! Health check and development helpers.

use actix_web::{delete, get, post, web, Responder};
use serde::{Deserialize, Serialize};

use crate::service::Service;

use super::sender::MessageResponse;

#[derive(Debug, Serialize, Deserialize)]
pub struct SeedResponse {
    pub inserted: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub removed: u64,
}

#[get("/ping")]
async fn ping() -> impl Responder {
    web::Json(MessageResponse {
        message: "pong".to_owned(),
    })
}

#[post("/seed")]
async fn seed(service: web::Data<Service>) -> actix_web::Result<impl Responder> {
    let inserted = service.seed_sample_messages().await?.len();

    Ok(web::Json(SeedResponse { inserted }))
}

#[delete("/clear")]
async fn clear(service: web::Data<Service>) -> actix_web::Result<impl Responder> {
    let removed = service.clear_messages().await?;

    Ok(web::Json(ClearResponse { removed }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(ping).service(seed).service(clear);
}

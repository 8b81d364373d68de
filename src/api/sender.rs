use actix_web::{get, post, web, Responder};
use serde::{Deserialize, Serialize};

use crate::service::Service;

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    interval_seconds: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[post("/start")]
async fn start(
    service: web::Data<Service>,
    query: web::Query<StartQuery>,
) -> actix_web::Result<impl Responder> {
    let interval = query
        .interval_seconds
        .unwrap_or_else(|| service.send_interval().as_secs());

    service.start_auto_sender(interval).await?;

    Ok(web::Json(MessageResponse {
        message: "auto sender started".to_owned(),
    }))
}

#[post("/stop")]
async fn stop(service: web::Data<Service>) -> actix_web::Result<impl Responder> {
    service.stop_auto_sender().await?;

    Ok(web::Json(MessageResponse {
        message: "auto sender stopped".to_owned(),
    }))
}

#[get("/status")]
async fn status(service: web::Data<Service>) -> impl Responder {
    web::Json(StatusResponse {
        running: service.auto_sender_running().await,
    })
}

#[get("/sent")]
async fn list_sent(service: web::Data<Service>) -> actix_web::Result<impl Responder> {
    let messages = service.get_sent_messages().await?;

    Ok(web::Json(messages))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(start)
        .service(stop)
        .service(status)
        .service(list_sent);
}

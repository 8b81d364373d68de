use actix_web::{get, post, web, HttpResponse, Responder, Scope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    dispatch::DispatchOutcome,
    message::{MessageId, NewMessage},
    service::Service,
};

/// Result of a manual send, flattened for the wire.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SendResponse {
    Sent {
        #[serde(rename = "messageId")]
        delivery_id: String,
        sent_at: DateTime<Utc>,
    },
    Retrying {
        retry_count: u32,
    },
    Failed {
        retry_count: u32,
    },
}

impl From<DispatchOutcome> for SendResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Sent {
                delivery_id,
                sent_at,
            } => Self::Sent {
                delivery_id,
                sent_at,
            },
            DispatchOutcome::Retrying { retry_count } => Self::Retrying { retry_count },
            DispatchOutcome::Failed { retry_count } => Self::Failed { retry_count },
        }
    }
}

#[post("")]
async fn create_message(
    service: web::Data<Service>,
    data: web::Json<NewMessage>,
) -> actix_web::Result<impl Responder> {
    let message = service.create_message(data.into_inner()).await?;

    Ok(HttpResponse::Created().json(message))
}

#[get("/{id}")]
async fn get_message(
    service: web::Data<Service>,
    path: web::Path<MessageId>,
) -> actix_web::Result<impl Responder> {
    let message = service.get_message(path.into_inner()).await?;

    Ok(web::Json(message))
}

#[post("/{id}/send")]
async fn send_message(
    service: web::Data<Service>,
    path: web::Path<MessageId>,
) -> actix_web::Result<impl Responder> {
    let outcome = service.send_message_by_id(path.into_inner()).await?;

    Ok(web::Json(SendResponse::from(outcome)))
}

pub fn service() -> Scope {
    web::scope("/messages")
        .service(create_message)
        .service(get_message)
        .service(send_message)
}

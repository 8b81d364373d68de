use actix_web::web;

pub mod messages;
pub mod sender;
pub mod utility;

/// Registers every route on an app or test service.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(messages::service())
        .configure(sender::configure)
        .configure(utility::configure);
}

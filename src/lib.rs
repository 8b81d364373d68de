use actix_cors::Cors;
use actix_web::{
    middleware::{NormalizePath, TrailingSlash},
    web::{Data, JsonConfig},
    App, HttpServer,
};
use config::Config;
use service::Service;
use tracing::level_filters::LevelFilter;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter, FmtSubscriber};

pub mod api;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod message;
pub mod repository;
pub mod retry;
pub mod scheduler;
pub mod sender;
pub mod service;

#[cfg(test)]
mod testing;

/// Returns a builder for the main application. Without an explicit config,
/// settings are read from `HERALD_*` environment variables.
#[bon::builder(finish_fn = start)]
pub async fn run(config: Option<Config>) -> eyre::Result<()> {
    #[cfg(debug_assertions)]
    FmtSubscriber::builder()
        .pretty()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("HERALD_LOG")
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .finish()
        .try_init()?;

    #[cfg(not(debug_assertions))]
    FmtSubscriber::builder()
        .json()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("HERALD_LOG")
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .finish()
        .try_init()?;

    let config = match config {
        Some(config) => config,
        None => Config::load()?,
    };

    let service = Service::connect(&config).await?;

    if config.seed_on_startup {
        service.seed_sample_messages().await?;
    }

    if config.autostart {
        service
            .start_auto_sender(config.send_interval_seconds)
            .await?;
    }

    let data = Data::new(service);

    tracing::info!(
        address = %config.bind_address,
        port = config.port,
        "Starting HTTP server"
    );

    let server_data = data.clone();
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_header()
            .allow_any_method();

        let json_cfg = JsonConfig::default().content_type_required(false);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(NormalizePath::new(TrailingSlash::Trim))
            .wrap(cors)
            .configure(api::configure)
            .app_data(server_data.clone())
            .app_data(json_cfg)
    })
    .bind((config.bind_address.as_str(), config.port))?
    .run()
    .await?;

    data.shutdown();

    tracing::info!("Shut down");

    Ok(())
}

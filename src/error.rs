use actix_web::{http::StatusCode, HttpResponse};
use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("auto sender is already running"))]
    AlreadyRunning,

    #[snafu(display("auto sender is not running"))]
    NotRunning,

    #[snafu(display("service is shutting down"))]
    ShuttingDown,

    #[snafu(display("Resource not found: {resource}"))]
    NotFound { resource: String },

    #[snafu(display("Invalid parameter: {message}"))]
    InvalidParameter { message: String },

    #[snafu(display("Conflict: {message}"))]
    Conflict { message: String },

    #[snafu(display("Invalid configuration: {message}"))]
    Config { message: String },

    #[snafu(display("Delivery failed: {message}"))]
    Transport { message: String },

    #[snafu(display("Cache error: {message}"))]
    Cache { message: String },

    #[snafu(display("Error returned from database"))]
    Sqlx {
        #[snafu(source)]
        source: sqlx::Error,
    },

    #[snafu(display("Error running migrations"))]
    MigrationError {
        #[snafu(source)]
        source: sqlx::migrate::MigrateError,
    },

    #[snafu(display("Internal server error"))]
    InternalServerError {
        #[snafu(source(false))]
        source: Option<eyre::Report>,
    },
}

impl From<sqlx::Error> for Error {
    fn from(source: sqlx::Error) -> Self {
        Self::Sqlx { source }
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(source: sqlx::migrate::MigrateError) -> Self {
        Self::MigrationError { source }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport {
            message: e.to_string(),
        }
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Self::Cache {
            message: e.to_string(),
        }
    }
}

impl From<eyre::Report> for Error {
    fn from(e: eyre::Report) -> Self {
        Self::InternalServerError { source: Some(e) }
    }
}

impl Error {
    pub fn internal(e: impl Into<eyre::Report>) -> Self {
        Self::InternalServerError {
            source: Some(e.into()),
        }
    }

    pub fn message_not_found(id: i64) -> Self {
        Self::NotFound {
            resource: format!("message {id}"),
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// A write was refused because the message already left `Pending`.
    pub fn not_pending(id: i64, status: impl std::fmt::Display) -> Self {
        Self::Conflict {
            message: format!("message {id} is {status}"),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Start-while-running and stop-while-stopped.
    pub fn is_lifecycle_conflict(&self) -> bool {
        matches!(self, Self::AlreadyRunning | Self::NotRunning)
    }
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
}

impl actix_web::ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::AlreadyRunning | Self::NotRunning | Self::InvalidParameter { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,

            Self::Config { .. }
            | Self::Transport { .. }
            | Self::Cache { .. }
            | Self::Sqlx { .. }
            | Self::MigrationError { .. }
            | Self::InternalServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}

use crate::channel::ChannelError;
use crate::db::errors::DbError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Chat is not on the allow-list
    #[error("Chat {chat_id} is not authorized")]
    Unauthorized { chat_id: String },

    /// Malformed command input; the message is shown to the user as-is
    #[error("{message}")]
    BadRequest { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Bot API call failed
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthorized { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Database(DbError::NotFound) => StatusCode::NOT_FOUND,
            Error::Database(DbError::Unavailable { .. } | DbError::PoolClosed) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Channel(_) => StatusCode::BAD_GATEWAY,
            Error::Internal { .. } | Error::Database(DbError::Other(_)) | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Reply text for the chat. Never includes internal error details.
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthorized { .. } => "권한이 없습니다.".to_string(),
            Error::BadRequest { message } => message.clone(),
            Error::Internal { .. } | Error::Database(_) | Error::Channel(_) | Error::Other(_) => {
                "요청 처리 중 오류가 발생했습니다. 잠시 후 다시 시도해주세요.".to_string()
            }
        }
    }

    /// Errors after which the process should exit and be restarted by its supervisor
    pub fn is_unrecoverable(&self) -> bool {
        match self {
            Error::Database(e) => e.is_unrecoverable(),
            Error::Channel(e) => e.is_unrecoverable(),
            _ => false,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) | Error::Channel(_) => {
                tracing::warn!("Dependency error: {}", self);
            }
            Error::Unauthorized { .. } | Error::BadRequest { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), self.status_code().canonical_reason().unwrap_or("error")).into_response()
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Internal { operation: message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

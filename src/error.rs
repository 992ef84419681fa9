use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

/// Failure page for errors no handler caught. The four expected user
/// errors (bad credentials, weak password, duplicate username, empty
/// feedback) never reach this; they render inline in their templates.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("template error: {0}")]
    Template(#[from] askama::Error),
    #[error("password hashing failed")]
    Hashing,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("request failed: {self}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html("<h1>Something went wrong</h1><p>Please try again later.</p>"),
        )
            .into_response()
    }
}

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A credential-store row. Created on signup, never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

/// A session-log row. `logout_time` stays NULL until the user logs out.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserSession {
    pub id: i64,
    pub username: String,
    pub login_time: String,
    pub logout_time: Option<String>,
}

/// A feedback-store row. Immutable after insert.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Feedback {
    pub id: i64,
    pub username: String,
    pub feedback_date: String,
    pub feedback_text: String,
}

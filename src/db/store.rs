use tracing::info;

use crate::config::DatabaseConfig;
use crate::db::models::User;
use crate::db::DbPool;

#[cfg(test)]
use crate::db::models::{Feedback, UserSession};

/// Errors surfaced by signup. Everything else in the store is a plain
/// `sqlx::Error` for the caller to map.
#[derive(Debug, thiserror::Error)]
pub enum SignupError {
    #[error("Username already exists! Please log in.")]
    UsernameTaken,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// All SQL for the three tables lives here. Table names come from
/// configuration and are validated against an identifier allow-list before
/// this struct is ever constructed; row values are always bind parameters.
#[derive(Debug, Clone)]
pub struct Store {
    pool: DbPool,
    users: String,
    sessions: String,
    feedback: String,
}

/// Timestamps are stored as UTC strings in the format the original report
/// tooling expects.
pub fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

impl Store {
    pub fn new(pool: DbPool, database: &DatabaseConfig) -> Self {
        Self {
            pool,
            users: database.users_table.clone(),
            sessions: database.sessions_table.clone(),
            feedback: database.feedback_table.clone(),
        }
    }

    /// Create the three tables if they do not exist yet. Safe to run on
    /// every startup.
    pub async fn create_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL
            )",
            self.users
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                login_time TEXT NOT NULL,
                logout_time TEXT
            )",
            self.sessions
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                feedback_date TEXT NOT NULL,
                feedback_text TEXT NOT NULL
            )",
            self.feedback
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT id, username, password_hash FROM {} WHERE username = ?",
            self.users
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<(), SignupError> {
        if self.find_user(username).await?.is_some() {
            return Err(SignupError::UsernameTaken);
        }

        let result = sqlx::query(&format!(
            "INSERT INTO {} (username, password_hash) VALUES (?, ?)",
            self.users
        ))
        .bind(username)
        .bind(password_hash)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                info!("created account for {username}");
                Ok(())
            }
            // A signup that lost the race to the same username gets the
            // same answer as the lookup above.
            Err(sqlx::Error::Database(e)) if e.message().contains("UNIQUE constraint failed") => {
                Err(SignupError::UsernameTaken)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record a login. Returns the id of the new open session row.
    pub async fn open_session(&self, username: &str) -> Result<i64, sqlx::Error> {
        let login_time = now_timestamp();
        let result = sqlx::query(&format!(
            "INSERT INTO {} (username, login_time) VALUES (?, ?)",
            self.sessions
        ))
        .bind(username)
        .bind(&login_time)
        .execute(&self.pool)
        .await?;

        info!("{username} logged in at {login_time}");
        Ok(result.last_insert_rowid())
    }

    /// Close the most recent open session row for this username. Returns
    /// false when there was nothing to close (e.g. the row was already
    /// closed from another browser tab).
    pub async fn close_latest_session(&self, username: &str) -> Result<bool, sqlx::Error> {
        let logout_time = now_timestamp();
        let result = sqlx::query(&format!(
            "UPDATE {sessions}
             SET logout_time = ?
             WHERE id = (
                 SELECT id FROM {sessions}
                 WHERE username = ? AND logout_time IS NULL
                 ORDER BY login_time DESC, id DESC
                 LIMIT 1
             )",
            sessions = self.sessions
        ))
        .bind(&logout_time)
        .bind(username)
        .execute(&self.pool)
        .await?;

        let closed = result.rows_affected() > 0;
        if closed {
            info!("{username} logged out at {logout_time}");
        } else {
            info!("{username} logged out with no open session row");
        }
        Ok(closed)
    }

    pub async fn insert_feedback(&self, username: &str, text: &str) -> Result<(), sqlx::Error> {
        let feedback_date = now_timestamp();
        sqlx::query(&format!(
            "INSERT INTO {} (username, feedback_date, feedback_text) VALUES (?, ?, ?)",
            self.feedback
        ))
        .bind(username)
        .bind(&feedback_date)
        .bind(text)
        .execute(&self.pool)
        .await?;

        info!("{username} submitted feedback ({} chars)", text.chars().count());
        Ok(())
    }

    #[cfg(test)]
    pub async fn open_sessions(&self, username: &str) -> Result<Vec<UserSession>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT id, username, login_time, logout_time
             FROM {}
             WHERE username = ? AND logout_time IS NULL
             ORDER BY login_time DESC, id DESC",
            self.sessions
        ))
        .bind(username)
        .fetch_all(&self.pool)
        .await
    }

    #[cfg(test)]
    pub async fn feedback_for_user(&self, username: &str) -> Result<Vec<Feedback>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT id, username, feedback_date, feedback_text
             FROM {}
             WHERE username = ?
             ORDER BY id",
            self.feedback
        ))
        .bind(username)
        .fetch_all(&self.pool)
        .await
    }

    #[cfg(test)]
    pub async fn count(&self, table: &str) -> i64 {
        use sqlx::Row;

        sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .unwrap()
            .get("n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> Store {
        // A single connection keeps every query on the same in-memory db.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Store::new(pool, &DatabaseConfig::default());
        store.create_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn schema_creation_is_idempotent() {
        let store = test_store().await;
        store.create_schema().await.unwrap();
        assert_eq!(store.count("users").await, 0);
    }

    #[tokio::test]
    async fn find_user_on_empty_table_is_none() {
        let store = test_store().await;
        assert!(store.find_user("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn signup_then_login_roundtrip() {
        let store = test_store().await;
        let hash = auth::hash_password("Passw0rd!").unwrap();
        store.create_user("alice", &hash).await.unwrap();

        let user = store.find_user("alice").await.unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert!(auth::verify_password("Passw0rd!", &user.password_hash));
        assert!(!auth::verify_password("wrong", &user.password_hash));
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let store = test_store().await;
        store.create_user("alice", "hash-a").await.unwrap();

        let err = store.create_user("alice", "hash-b").await.unwrap_err();
        assert!(matches!(err, SignupError::UsernameTaken));
        assert_eq!(store.count("users").await, 1);

        // The original credential row is untouched.
        let user = store.find_user("alice").await.unwrap().unwrap();
        assert_eq!(user.password_hash, "hash-a");
    }

    #[tokio::test]
    async fn login_inserts_exactly_one_open_session_row() {
        let store = test_store().await;
        store.open_session("alice").await.unwrap();

        let open = store.open_sessions("alice").await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].username, "alice");
        assert!(open[0].logout_time.is_none());
        assert_eq!(store.count("user_sessions").await, 1);
    }

    #[tokio::test]
    async fn logout_closes_the_session_row() {
        let store = test_store().await;
        store.open_session("alice").await.unwrap();

        assert!(store.close_latest_session("alice").await.unwrap());
        assert!(store.open_sessions("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn logout_closes_only_most_recent_open_row() {
        let store = test_store().await;
        // Concurrent logins can leave more than one open row; logout only
        // touches the newest one.
        let first = store.open_session("alice").await.unwrap();
        let second = store.open_session("alice").await.unwrap();
        assert!(second > first);

        assert!(store.close_latest_session("alice").await.unwrap());
        let open = store.open_sessions("alice").await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, first);
    }

    #[tokio::test]
    async fn logout_with_no_open_session_is_a_noop() {
        let store = test_store().await;
        assert!(!store.close_latest_session("alice").await.unwrap());
    }

    #[tokio::test]
    async fn logout_ignores_other_usernames() {
        let store = test_store().await;
        store.open_session("alice").await.unwrap();
        store.open_session("bob").await.unwrap();

        assert!(store.close_latest_session("bob").await.unwrap());
        let open = store.open_sessions("alice").await.unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn feedback_is_stored_with_a_date() {
        let store = test_store().await;
        store.insert_feedback("alice", "Great report!").await.unwrap();

        let rows = store.feedback_for_user("alice").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].feedback_text, "Great report!");
        assert_eq!(rows[0].feedback_date.len(), "2024-01-01 00:00:00".len());
    }

    #[tokio::test]
    async fn custom_table_names_are_used() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let database = DatabaseConfig {
            users_table: "dash_users".into(),
            sessions_table: "dash_logs".into(),
            feedback_table: "dash_feedback".into(),
            ..DatabaseConfig::default()
        };
        let store = Store::new(pool, &database);
        store.create_schema().await.unwrap();

        store.create_user("alice", "hash").await.unwrap();
        assert_eq!(store.count("dash_users").await, 1);
    }

    #[test]
    fn timestamps_use_the_legacy_format() {
        let ts = now_timestamp();
        // e.g. "2024-01-01 00:00:00"
        assert_eq!(ts.len(), 19);
        assert_eq!(ts.as_bytes()[4], b'-');
        assert_eq!(ts.as_bytes()[10], b' ');
        assert_eq!(ts.as_bytes()[13], b':');
    }
}

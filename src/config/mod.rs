use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

lazy_static! {
    /// Allow-list for configured table names. Anything spliced into SQL as an
    /// identifier must match this; row values always go through bind parameters.
    static ref TABLE_NAME_REGEX: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").unwrap();
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file name, created inside `server.data_dir`.
    #[serde(default = "default_db_file")]
    pub file: String,
    #[serde(default = "default_users_table")]
    pub users_table: String,
    #[serde(default = "default_sessions_table")]
    pub sessions_table: String,
    #[serde(default = "default_feedback_table")]
    pub feedback_table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            file: default_db_file(),
            users_table: default_users_table(),
            sessions_table: default_sessions_table(),
            feedback_table: default_feedback_table(),
        }
    }
}

fn default_db_file() -> String {
    "reportdeck.db".to_string()
}

fn default_users_table() -> String {
    "users".to_string()
}

fn default_sessions_table() -> String {
    "user_sessions".to_string()
}

fn default_feedback_table() -> String {
    "feedback".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_report_title")]
    pub title: String,
    /// URL of the embedded report viewer. Rendered as an opaque iframe.
    #[serde(default)]
    pub embed_url: String,
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: default_report_title(),
            embed_url: String::new(),
            frame_height: default_frame_height(),
        }
    }
}

fn default_report_title() -> String {
    "Report Viewer".to_string()
}

fn default_frame_height() -> u32 {
    350
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse configuration file")?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let tables = [
            ("database.users_table", &self.database.users_table),
            ("database.sessions_table", &self.database.sessions_table),
            ("database.feedback_table", &self.database.feedback_table),
        ];

        for (key, name) in &tables {
            if !TABLE_NAME_REGEX.is_match(name) {
                bail!("{key}: {name:?} is not a valid table name");
            }
        }

        for i in 0..tables.len() {
            for j in i + 1..tables.len() {
                if tables[i].1 == tables[j].1 {
                    bail!(
                        "{} and {} must name different tables",
                        tables[i].0,
                        tables[j].0
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn accepts_ordinary_table_names() {
        for name in ["users", "UserSession", "feedback_2024", "_staging"] {
            assert!(TABLE_NAME_REGEX.is_match(name), "{name} should be allowed");
        }
    }

    #[test]
    fn rejects_hostile_table_names() {
        for name in [
            "",
            "users; DROP TABLE users",
            "users--",
            "user table",
            "1users",
            "users.feedback",
        ] {
            assert!(!TABLE_NAME_REGEX.is_match(name), "{name:?} should be rejected");
        }
    }

    #[test]
    fn rejects_duplicate_table_names() {
        let mut config = Config::default();
        config.database.sessions_table = config.database.users_table.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [report]
            embed_url = "https://bi.example.com/view?r=abc"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.report.embed_url, "https://bi.example.com/view?r=abc");
        assert_eq!(config.database.users_table, "users");
    }
}

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod session;
pub mod ui;

use config::Config;
use db::Store;
use session::SessionMap;

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub sessions: SessionMap,
}

impl AppState {
    pub fn new(config: Config, store: Store) -> Self {
        Self {
            config,
            store,
            sessions: SessionMap::default(),
        }
    }
}

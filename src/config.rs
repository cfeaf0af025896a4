//! Runtime configuration, resolved from the environment and overridden by CLI flags.
use std::path::PathBuf;

pub const DB_PATH_ENV: &str = "NOTE_REVIEW_DB";
pub const USER_ENV: &str = "NOTE_REVIEW_USER";
pub const DEFAULT_DB_PATH: &str = "db.sqlite3";
pub const DEFAULT_USER: &str = "local";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    /// Owner whose notes and reviews the commands operate on.
    pub owner_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            owner_id: DEFAULT_USER.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            db_path: get(DB_PATH_ENV).map(PathBuf::from).unwrap_or(defaults.db_path),
            owner_id: get(USER_ENV).unwrap_or(defaults.owner_id),
        }
    }

    pub fn with_overrides(mut self, db_path: Option<PathBuf>, owner_id: Option<String>) -> Self {
        if let Some(path) = db_path {
            self.db_path = path;
        }
        if let Some(owner) = owner_id {
            self.owner_id = owner;
        }
        self
    }
}

pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod models;

pub use database::db::Database;
pub use database::{ContentStore, ReviewQuery, ReviewStore};
pub use error::{Result, ReviewError};
pub use models::{
    Clock, FixedClock, Note, NoteSummary, ReviewEntry, ReviewManager, ReviewState, ReviewStats,
    SystemClock,
};

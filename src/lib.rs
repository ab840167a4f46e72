pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod deck;
pub mod error;
pub mod highlight;
pub mod storage;
pub mod ui;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use error::{DeckError, DeckResult, FetchError};

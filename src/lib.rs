pub mod app;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod events;
pub mod models;
pub mod processor;
pub mod scraping;
pub mod settings;
pub mod shutdown;
pub mod signal;

pub mod analytics;
pub mod api;
pub mod cache;
pub mod config;
pub mod storage;

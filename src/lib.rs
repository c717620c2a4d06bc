pub mod api;
pub mod cohort;
pub mod config;
pub mod error;
pub mod export;
pub mod extractors;
pub mod middleware;
pub mod models;
pub mod repository;

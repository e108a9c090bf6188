//! HTTP surface of the NEO hazard pipeline

pub mod api;
pub mod config;
pub mod error;

pub use api::{create_router, serve, AppState};
pub use config::ServiceConfig;
pub use error::ApiError;

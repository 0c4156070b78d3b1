//! Web API module for the file bucket.
//!
//! This module exposes bucket listing, per-file download, zip export and
//! the create/update/delete hooks over HTTP.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::{create_health_router, create_router, ApiDoc};
pub use server::WebServer;

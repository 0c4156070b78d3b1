//! Middleware for the web API.

pub mod cors;

pub use cors::create_cors_layer;

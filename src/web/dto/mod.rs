//! Data Transfer Objects for the web API.
//!
//! Request bodies are the bucket payload types in [`crate::bucket`].

pub mod response;

pub use response::*;

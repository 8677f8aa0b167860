//! Axum HTTP handlers: discovery queries, stored results, access requests.

pub mod access;
pub mod query;
pub mod results;

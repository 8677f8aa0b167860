//! Client layer for the hosted RAG serving endpoint.

pub mod auth;
pub mod query;
pub mod stream;

//! # data-discovery
//!
//! A thin web front-end for natural-language data product discovery. User
//! queries are forwarded to an externally hosted RAG serving endpoint; the
//! loosely-structured response is normalized into a stable result schema and
//! rendered as ranked data-product cards with per-product access requests.
//!
//! ## Request flow
//!
//! ```text
//!   ┌──────────────┐     POST /api/query      ┌─────────────────┐
//!   │  Search UI    │ ───────────────────────▶ │  api::query     │
//!   └──────────────┘                           └────────┬────────┘
//!                                                       │ role-tagged messages
//!                                                       ▼
//!                                              ┌─────────────────┐
//!                                              │ endpoint::query │──▶ hosted RAG
//!                                              │ endpoint::stream│◀── serving endpoint
//!                                              └────────┬────────┘
//!                                                       │ RawResponse (opaque JSON)
//!                                                       ▼
//!                                              ┌─────────────────┐
//!                                              │   normalize     │  envelope matchers,
//!                                              │                 │  first success wins
//!                                              └────────┬────────┘
//!                                                       │ ParsedResult (top 3, raw kept)
//!                                                       ▼
//!                                              ┌─────────────────┐
//!                                              │  state::Session │  last result per UI
//!                                              └─────────────────┘  session
//! ```
//!
//! Retrieval, ranking, and generation all live in the external endpoint;
//! this crate only consumes its output and must tolerate its variability.
//! The normalizer never fails: any payload it cannot interpret degrades to
//! a placeholder result that keeps the raw response for inspection.
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration: endpoint, workspace, access-request target
//! - [`models`] - Shared data types: `ParsedResult`, `DataProductEntry`, request/response types
//! - [`normalize`] - Response normalization: envelope matcher chain, balanced-brace JSON extraction
//! - [`endpoint`] - Serving-endpoint client: plain and SSE-streaming invocation, token resolution
//! - [`api`] - Axum HTTP handlers for queries, stored results, and access requests
//! - [`state`] - Shared application state and the per-UI-session result store

pub mod api;
pub mod config;
pub mod endpoint;
pub mod models;
pub mod normalize;
pub mod state;

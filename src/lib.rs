//! Bearer-token gate for a multi-tool server.
//!
//! A compact JWT is decoded, verified and turned into a per-request
//! [`services::auth::AuthorizationContext`]; every tool call is checked against
//! a static permission table, and tools that touch cloud storage get a
//! request-scoped [`services::credentials::ClientFactory`].

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;

//! Router Module Index
//!
//! Splits the HTTP surface by who may reach it. Authentication is enforced as a route layer
//! in `create_router`; the capability checks themselves live in the admission pipeline, so
//! every handler below still calls into it.

/// Routes reachable without a token: health, registration and login.
pub mod public;

/// Catalog routes. Any verified identity may call them; the role decides what succeeds.
pub mod authenticated;

/// User administration. Only the admin role passes the pipeline's authorization stage.
pub mod admin;

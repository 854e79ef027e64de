//! HTTP API
//!
//! JSON endpoints under `/api`, `/health`, and the optional static web UI.

pub mod handlers;
pub mod server;

pub use server::create_router;

//! API Module
//!
//! Admin HTTP surface of a running cache server.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /stats` - Server statistics
//! - `GET /clients` - Connected client sessions
//! - `GET /holders/:key` - Clients currently holding a key

pub mod handlers;
pub mod responses;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;

//! Render service for Acton DX.
//!
//! Accepts document render requests over HTTP, queues them in a bounded
//! dispatcher, and renders them through a remote HTTP renderer in the
//! background, retrying when the renderer rate-limits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod routes;
pub mod services;

pub use config::RenderServiceConfig;
pub use routes::router;
pub use services::{HttpRenderer, RenderJob};

//! Axum signaling server for real-time detection.
//!
//! This crate provides:
//! - WebSocket signaling for WebRTC peer connections
//! - Per-client sessions with a latest-value result channel
//! - Periodic cleanup of sessions whose peers died
//! - Health and Prometheus metrics endpoints

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod session;
pub mod state;
pub mod ws;

pub use config::ServerConfig;
pub use error::{ApiError, ApiResult, SessionError};
pub use routes::create_router;
pub use session::{CleanupSupervisor, SessionManager};
pub use state::AppState;

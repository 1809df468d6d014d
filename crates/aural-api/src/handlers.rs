//! HTTP handlers.

pub mod health;

pub use health::health;

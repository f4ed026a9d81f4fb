//! HTTP API handlers for the proxy

pub mod ai;
pub mod auth;
pub mod health;
pub mod repo;

pub use ai::{chat, transcribe};
pub use auth::{auth_middleware, login};
pub use health::health;
pub use repo::{companies, create_issue};

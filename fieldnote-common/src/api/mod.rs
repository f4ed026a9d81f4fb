//! API wire contracts and bearer-token helpers shared by the client core
//! and the proxy service

pub mod auth;
pub mod types;

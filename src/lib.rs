//! campus-cache - Offline cache controller for the Smart Campus web app
//!
//! Network-first request handling with a versioned response cache,
//! install-time precaching and synthesized offline fallbacks.

pub mod audit;
pub mod cli;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod http;
pub mod store;
pub mod ui;

pub use error::{CampusError, CampusResult};

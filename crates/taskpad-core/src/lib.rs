//! Core library for taskpad.
//!
//! Everything a task-list client needs apart from its user interface:
//!
//! - `auth`: bearer token decoding, persisted session state and the
//!   `SessionController` that tracks when a session has to end
//! - `api`: the HTTP client for the remote task API
//! - `models`: tasks, users and request/response bodies
//! - `config`: configuration file and environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use auth::{SessionController, SessionEvent, SessionState};
pub use config::Config;

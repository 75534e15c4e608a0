//! REST API client module for the remote task service.
//!
//! This module provides the `ApiClient` for registering, logging in and
//! managing tasks, the `ApiError` taxonomy for failed requests, and the
//! `normalize` helpers that reconcile the two field-naming conventions the
//! backends use (`_id`/`id`, camelCase/snake_case timestamps).
//!
//! Authenticated calls carry the bearer token held by the session.

pub mod client;
pub mod error;
pub mod normalize;

pub use client::ApiClient;
pub use error::ApiError;

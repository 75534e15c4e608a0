//! Data models for the task API.
//!
//! This module contains the structures exchanged with the remote service:
//!
//! - `Task`, `TaskStatus`, `Priority`: to-do items as the API returns them
//! - `TaskCreate`, `TaskUpdate`: request bodies
//! - `TaskStats`: per-user counters
//! - `User`, `UserUpdate`, `Credentials`, `Registration`, auth responses
//!
//! Records are passed through `api::normalize` before they reach these types,
//! so only the canonical field names appear here.

pub mod task;
pub mod user;

pub use task::{Priority, Task, TaskCreate, TaskStats, TaskStatus, TaskUpdate};
pub use user::{
    AuthResponse, Credentials, ProtectedResponse, RegisterResponse, Registration, User, UserUpdate,
};

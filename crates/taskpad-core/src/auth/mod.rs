//! Authentication module for tracking the lifetime of a user session.
//!
//! This module provides:
//! - `token`: unverified decoding of bearer token claims
//! - `store`: the key-value persistence shim plus file/keyring/memory backends
//! - `clock`, `scheduler`, `notify`: capabilities injected into the controller
//! - `SessionController`: login/logout, expiry timers, poll and resume checks
//!
//! The controller never talks to the network. It receives tokens that the
//! API client already obtained and decides how long they stay usable.

pub mod clock;
pub mod notify;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use notify::{LogNotifier, Notice, Notifier};
pub use scheduler::{ManualScheduler, Scheduler, Timer, TimerId, TimerKind, TokioScheduler};
pub use session::{SessionController, SessionEvent, SessionState, SessionTiming, SessionUser};
pub use store::{FileStore, KeyValueStore, KeyringStore, MemoryStore, TOKEN_KEY, USER_KEY};
pub use token::Claims;

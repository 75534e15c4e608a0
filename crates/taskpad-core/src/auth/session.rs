//! Session lifetime tracking.
//!
//! `SessionController` owns the current bearer token and the user derived
//! from it. When a token carries an `exp` claim the controller schedules two
//! timers: a warning one minute before expiry and a forced logout slightly
//! after it. Because timers can be starved (suspended laptop, stalled event
//! loop) the host also feeds it periodic `Poll` events and a `Resume` event
//! whenever the application comes back to the foreground. Whichever path
//! notices the expiry first ends the session; the others find nothing to do.
//!
//! The controller is single-threaded and never returns errors. Storage and
//! decoding problems degrade to "no session" or "no expiry information".

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::notify::{Notice, Notifier};
use super::scheduler::{Scheduler, Timer, TimerId, TimerKind};
use super::store::{KeyValueStore, TOKEN_KEY, USER_KEY};
use super::token::{self, Claims};

/// Display name used when a token carries no name claim
const PLACEHOLDER_NAME: &str = "User";

/// Timing knobs for expiry handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// How long before expiry the warning fires.
    pub warn_lead: StdDuration,
    /// Delay after expiry before the forced logout, to absorb clock skew
    /// against the token issuer.
    pub logout_buffer: StdDuration,
    /// Interval of the fallback validity poll.
    pub poll_interval: StdDuration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            warn_lead: StdDuration::from_secs(60),
            logout_buffer: StdDuration::from_millis(250),
            poll_interval: StdDuration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
}

/// Events the host event loop delivers to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A scheduled timer fired.
    Timer(Timer),
    /// Periodic validity check.
    Poll,
    /// The application returned to the foreground.
    Resume,
}

/// Identity shown for the logged-in user. Derived from the token or read
/// back from the persisted cache; never authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    #[serde(default, alias = "_id")]
    pub id: String,
    #[serde(default, alias = "name", alias = "username")]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
}

impl SessionUser {
    fn from_claims(claims: Option<&Claims>) -> Self {
        Self {
            id: claims
                .and_then(Claims::subject)
                .unwrap_or_default()
                .to_string(),
            display_name: claims
                .and_then(Claims::display_name)
                .unwrap_or(PLACEHOLDER_NAME)
                .to_string(),
            email: claims
                .and_then(|c| c.email.clone())
                .unwrap_or_default(),
        }
    }
}

pub struct SessionController {
    store: Box<dyn KeyValueStore>,
    clock: Box<dyn Clock>,
    scheduler: Box<dyn Scheduler>,
    notifier: Box<dyn Notifier>,
    timing: SessionTiming,

    token: Option<String>,
    user: Option<SessionUser>,
    expires_at: Option<DateTime<Utc>>,
    authenticated: bool,

    /// Bumped whenever the session is replaced or cleared. Timers from an
    /// older generation are ignored even if their cancellation raced.
    generation: u64,
    warn_timer: Option<TimerId>,
    expire_timer: Option<TimerId>,
}

impl SessionController {
    pub fn new(
        store: impl KeyValueStore + 'static,
        clock: impl Clock + 'static,
        scheduler: impl Scheduler + 'static,
        notifier: impl Notifier + 'static,
    ) -> Self {
        Self {
            store: Box::new(store),
            clock: Box::new(clock),
            scheduler: Box::new(scheduler),
            notifier: Box::new(notifier),
            timing: SessionTiming::default(),
            token: None,
            user: None,
            expires_at: None,
            authenticated: false,
            generation: 0,
            warn_timer: None,
            expire_timer: None,
        }
    }

    pub fn with_timing(mut self, timing: SessionTiming) -> Self {
        self.timing = timing;
        self
    }

    // ===== Queries =====

    pub fn timing(&self) -> SessionTiming {
        self.timing
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.user.as_ref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// True iff a token is held and it has no expiry or has not reached it.
    pub fn is_valid(&self) -> bool {
        if self.token.is_none() {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => self.clock.now() < expires_at,
            None => true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated && self.is_valid()
    }

    pub fn state(&self) -> SessionState {
        if self.is_authenticated() {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        }
    }

    /// Time left before the token expires, clamped at zero.
    /// `None` without a session or when the token has no expiry.
    pub fn time_remaining(&self) -> Option<Duration> {
        if !self.authenticated {
            return None;
        }
        self.expires_at
            .map(|expires_at| (expires_at - self.clock.now()).max(Duration::zero()))
    }

    // ===== Transitions =====

    /// Restore the session persisted by a previous run.
    ///
    /// A missing, undecodable or expired token leaves the controller
    /// unauthenticated with storage cleared. Safe to call again later; any
    /// session held in memory is replaced by what storage says.
    pub fn initialize(&mut self) {
        self.reset();

        let Some(token) = self.store.get(TOKEN_KEY) else {
            debug!("No persisted session");
            self.clear_persisted();
            return;
        };

        let Some(claims) = token::decode(&token) else {
            debug!("Persisted token is undecodable, discarding");
            self.clear_persisted();
            return;
        };

        let expires_at = claims.expires_at();
        if expires_at.is_some_and(|at| self.clock.now() >= at) {
            info!("Persisted session already expired");
            self.clear_persisted();
            return;
        }

        let user = match self.cached_user() {
            Some(user) => user,
            None => {
                let user = SessionUser::from_claims(Some(&claims));
                self.persist_user(&user);
                user
            }
        };

        self.adopt(token, user, expires_at);
        info!(user = %self.user_label(), expires_at = ?self.expires_at, "Session restored");
    }

    /// Start a session for a freshly issued token, replacing any current one.
    pub fn login(&mut self, token: &str) {
        let token = token.trim();
        if token.is_empty() {
            warn!("Ignoring login with an empty token");
            self.end_session();
            return;
        }

        self.reset();

        let claims = token::decode(token);
        if claims.is_none() {
            debug!("Token payload unreadable, session will have no expiry");
        }
        let user = SessionUser::from_claims(claims.as_ref());
        let expires_at = claims.as_ref().and_then(Claims::expires_at);

        self.store.set(TOKEN_KEY, token);
        self.persist_user(&user);
        self.adopt(token.to_string(), user, expires_at);

        if !self.is_valid() {
            warn!("Login token is already expired");
            self.expire();
            return;
        }

        info!(user = %self.user_label(), expires_at = ?self.expires_at, "Logged in");
    }

    /// End the session at the user's request. Idempotent.
    pub fn logout(&mut self) {
        let had_session = self.authenticated || self.token.is_some();
        self.end_session();
        if had_session {
            info!("Logged out");
            self.notifier.notify(Notice::LoggedOut);
        }
    }

    /// Feed an event from the host loop.
    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Timer(timer) => self.on_timer(timer),
            SessionEvent::Poll | SessionEvent::Resume => {
                self.revalidate();
            }
        }
    }

    /// Force an expiry logout if the held token is no longer valid.
    /// Returns whether the session is still authenticated.
    pub fn revalidate(&mut self) -> bool {
        if self.authenticated && !self.is_valid() {
            self.expire();
        }
        self.is_authenticated()
    }

    /// Guard for protected actions. Picks up logins and logouts made by
    /// another process through the shared store, then revalidates.
    pub fn check_auth(&mut self) -> bool {
        let stored = self.store.get(TOKEN_KEY);
        if stored != self.token {
            debug!("Persisted token changed, reloading session");
            self.initialize();
        }
        self.revalidate()
    }

    // ===== Internals =====

    fn on_timer(&mut self, timer: Timer) {
        if timer.generation != self.generation {
            debug!(kind = ?timer.kind, "Ignoring timer from a previous session");
            return;
        }

        match timer.kind {
            TimerKind::Warn => {
                if let Some(id) = self.warn_timer.take() {
                    self.scheduler.cancel(id);
                }
                if self.is_authenticated() {
                    let remaining = self.time_remaining().unwrap_or_else(Duration::zero);
                    warn!(remaining_secs = remaining.num_seconds(), "Session expiring soon");
                    self.notifier.notify(Notice::ExpiringSoon { remaining });
                }
            }
            TimerKind::Expire => {
                if let Some(id) = self.expire_timer.take() {
                    self.scheduler.cancel(id);
                }
                self.expire();
            }
        }
    }

    /// Forced logout. Does nothing when no session is active.
    fn expire(&mut self) {
        if !self.authenticated {
            return;
        }
        self.end_session();
        info!("Session expired");
        self.notifier.notify(Notice::Expired);
    }

    fn adopt(&mut self, token: String, user: SessionUser, expires_at: Option<DateTime<Utc>>) {
        self.token = Some(token);
        self.user = Some(user);
        self.expires_at = expires_at;
        self.authenticated = true;
        self.schedule_expiry();
    }

    fn schedule_expiry(&mut self) {
        let Some(expires_at) = self.expires_at else {
            debug!("Token has no expiry, no timers scheduled");
            return;
        };

        let warn_lead = to_chrono(self.timing.warn_lead);
        let generation = self.generation;

        if expires_at - self.clock.now() > warn_lead {
            self.warn_timer = Some(self.scheduler.schedule(
                expires_at - warn_lead,
                Timer {
                    kind: TimerKind::Warn,
                    generation,
                },
            ));
        }

        self.expire_timer = Some(self.scheduler.schedule(
            expires_at + to_chrono(self.timing.logout_buffer),
            Timer {
                kind: TimerKind::Expire,
                generation,
            },
        ));

        debug!(
            %expires_at,
            warn = self.warn_timer.is_some(),
            generation,
            "Expiry timers scheduled"
        );
    }

    /// Cancel timers and drop in-memory state, leaving storage untouched.
    fn reset(&mut self) {
        if let Some(id) = self.warn_timer.take() {
            self.scheduler.cancel(id);
        }
        if let Some(id) = self.expire_timer.take() {
            self.scheduler.cancel(id);
        }
        self.generation += 1;
        self.token = None;
        self.user = None;
        self.expires_at = None;
        self.authenticated = false;
    }

    fn end_session(&mut self) {
        self.clear_persisted();
        self.reset();
    }

    fn clear_persisted(&mut self) {
        self.store.remove(TOKEN_KEY);
        self.store.remove(USER_KEY);
    }

    fn cached_user(&self) -> Option<SessionUser> {
        let raw = self.store.get(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                debug!(error = %e, "Ignoring unreadable cached user");
                None
            }
        }
    }

    fn persist_user(&mut self, user: &SessionUser) {
        match serde_json::to_string(user) {
            Ok(json) => self.store.set(USER_KEY, &json),
            Err(e) => warn!(error = %e, "Failed to serialize session user"),
        }
    }

    fn user_label(&self) -> &str {
        self.user
            .as_ref()
            .map(|u| u.display_name.as_str())
            .unwrap_or("")
    }
}

fn to_chrono(duration: StdDuration) -> Duration {
    Duration::milliseconds(duration.as_millis().min(i64::MAX as u128) as i64)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::notify::LogNotifier;
    use crate::auth::scheduler::ManualScheduler;
    use crate::auth::store::{FileStore, MemoryStore};
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use crate::auth::token::encode_unsigned;
    use chrono::TimeZone;
    use serde_json::json;
    use tokio::sync::mpsc;

    const T0: i64 = 1_700_000_000;

    struct Harness {
        controller: SessionController,
        clock: ManualClock,
        scheduler: ManualScheduler,
        store: MemoryStore,
        notices: mpsc::UnboundedReceiver<Notice>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_store(MemoryStore::new())
        }

        fn with_store(store: MemoryStore) -> Self {
            let clock = ManualClock::new(Utc.timestamp_opt(T0, 0).unwrap());
            let scheduler = ManualScheduler::new();
            let (tx, notices) = mpsc::unbounded_channel();
            let controller =
                SessionController::new(store.clone(), clock.clone(), scheduler.clone(), tx);
            Self {
                controller,
                clock,
                scheduler,
                store,
                notices,
            }
        }

        /// Move time forward and deliver every timer that became due.
        fn advance_ms(&mut self, ms: i64) {
            self.clock.advance(Duration::milliseconds(ms));
            for timer in self.scheduler.due(self.clock.now()) {
                self.controller.handle(SessionEvent::Timer(timer));
            }
        }

        fn advance_secs(&mut self, secs: i64) {
            self.advance_ms(secs * 1_000);
        }

        fn notices(&mut self) -> Vec<Notice> {
            let mut out = Vec::new();
            while let Ok(notice) = self.notices.try_recv() {
                out.push(notice);
            }
            out
        }
    }

    fn token_expiring_in(secs: i64) -> String {
        encode_unsigned(&json!({
            "sub": "user-1",
            "name": "Ada",
            "email": "ada@example.com",
            "exp": T0 + secs,
        }))
    }

    #[test]
    fn test_login_adopts_token_and_persists() {
        let mut h = Harness::new();
        let token = token_expiring_in(3_600);

        h.controller.login(&token);

        assert!(h.controller.is_valid());
        assert!(h.controller.is_authenticated());
        assert_eq!(h.controller.state(), SessionState::Authenticated);
        assert_eq!(h.controller.token(), Some(token.as_str()));
        assert_eq!(
            h.controller.expires_at(),
            Utc.timestamp_opt(T0 + 3_600, 0).single()
        );
        assert_eq!(h.controller.time_remaining(), Some(Duration::seconds(3_600)));

        let user = h.controller.user().unwrap();
        assert_eq!(user.id, "user-1");
        assert_eq!(user.display_name, "Ada");
        assert_eq!(user.email, "ada@example.com");

        assert_eq!(h.store.get(TOKEN_KEY), Some(token));
        let cached: SessionUser = serde_json::from_str(&h.store.get(USER_KEY).unwrap()).unwrap();
        assert_eq!(&cached, user);
        assert!(h.notices().is_empty());
    }

    #[test]
    fn test_login_schedules_warning_and_forced_logout() {
        let mut h = Harness::new();
        h.controller.login(&token_expiring_in(3_600));

        assert_eq!(h.scheduler.pending(), 2);
        assert_eq!(
            h.scheduler.deadline(TimerKind::Warn),
            Utc.timestamp_opt(T0 + 3_540, 0).single()
        );
        assert_eq!(
            h.scheduler.deadline(TimerKind::Expire),
            Some(Utc.timestamp_opt(T0 + 3_600, 0).unwrap() + Duration::milliseconds(250))
        );
    }

    #[test]
    fn test_ninety_second_token_warns_then_expires() {
        let mut h = Harness::new();
        h.controller.login(&token_expiring_in(90));

        h.advance_secs(29);
        assert!(h.notices().is_empty());

        h.advance_secs(1);
        assert_eq!(
            h.notices(),
            vec![Notice::ExpiringSoon {
                remaining: Duration::seconds(60)
            }]
        );
        assert!(h.controller.is_authenticated());

        h.advance_secs(59);
        assert!(h.controller.is_valid());

        // At +90 the token is no longer valid, the forced logout follows
        // after the buffer
        h.advance_secs(1);
        assert!(!h.controller.is_valid());
        assert!(!h.controller.is_authenticated());
        assert!(h.notices().is_empty());

        h.advance_ms(250);
        assert_eq!(h.notices(), vec![Notice::Expired]);
        assert_eq!(h.controller.state(), SessionState::Unauthenticated);
        assert!(h.controller.token().is_none());
        assert!(h.controller.user().is_none());
        assert!(h.store.is_empty());
        assert_eq!(h.scheduler.pending(), 0);
    }

    #[test]
    fn test_short_lived_token_gets_no_warning() {
        let mut h = Harness::new();
        h.controller.login(&token_expiring_in(60));

        assert_eq!(h.scheduler.deadline(TimerKind::Warn), None);
        assert_eq!(h.scheduler.pending(), 1);

        h.advance_secs(61);
        assert_eq!(h.notices(), vec![Notice::Expired]);
        assert!(!h.controller.is_authenticated());
    }

    #[test]
    fn test_second_login_supersedes_first_timers() {
        let mut h = Harness::new();
        h.controller.login(&token_expiring_in(120));

        h.advance_secs(1);
        let token_b = encode_unsigned(&json!({"sub": "user-2", "exp": T0 + 3_600}));
        h.controller.login(&token_b);

        // Only token B's timers remain
        assert_eq!(h.scheduler.pending(), 2);
        assert_eq!(
            h.scheduler.deadline(TimerKind::Warn),
            Utc.timestamp_opt(T0 + 3_540, 0).single()
        );

        // Token A's warning and expiry instants pass without effect
        h.advance_secs(200);
        assert!(h.notices().is_empty());
        assert!(h.controller.is_authenticated());
        assert_eq!(h.controller.user().unwrap().id, "user-2");
        assert_eq!(h.store.get(TOKEN_KEY), Some(token_b));
    }

    #[test]
    fn test_timer_from_previous_generation_is_ignored() {
        let mut h = Harness::new();
        h.controller.login(&token_expiring_in(3_600));

        h.controller.handle(SessionEvent::Timer(Timer {
            kind: TimerKind::Expire,
            generation: 0,
        }));

        assert!(h.controller.is_authenticated());
        assert!(h.notices().is_empty());
    }

    #[test]
    fn test_logout_is_idempotent() {
        let mut h = Harness::new();
        h.controller.login(&token_expiring_in(3_600));

        h.controller.logout();
        h.controller.logout();

        assert_eq!(h.notices(), vec![Notice::LoggedOut]);
        assert!(!h.controller.is_authenticated());
        assert!(h.controller.token().is_none());
        assert!(h.store.is_empty());
        assert_eq!(h.scheduler.pending(), 0);
    }

    #[test]
    fn test_logout_when_never_logged_in() {
        let mut h = Harness::new();
        h.controller.logout();
        assert!(h.notices().is_empty());
        assert!(!h.controller.is_valid());
    }

    #[test]
    fn test_token_without_expiry_only_ends_on_logout() {
        let mut h = Harness::new();
        let token = encode_unsigned(&json!({"sub": "forever"}));
        h.controller.login(&token);

        assert_eq!(h.scheduler.pending(), 0);
        assert_eq!(h.controller.time_remaining(), None);

        h.advance_secs(365 * 24 * 3_600);
        h.controller.handle(SessionEvent::Poll);
        h.controller.handle(SessionEvent::Resume);
        assert!(h.controller.is_authenticated());
        assert!(h.notices().is_empty());

        h.controller.logout();
        assert!(!h.controller.is_authenticated());
        assert_eq!(h.notices(), vec![Notice::LoggedOut]);
    }

    #[test]
    fn test_resume_after_sleep_forces_logout_immediately() {
        let mut h = Harness::new();
        h.controller.login(&token_expiring_in(600));

        // Clock jumps past expiry without any timer being delivered
        h.clock.advance(Duration::seconds(3_600));
        h.controller.handle(SessionEvent::Resume);

        assert_eq!(h.notices(), vec![Notice::Expired]);
        assert!(!h.controller.is_authenticated());
        assert!(h.store.is_empty());

        // The late timers find nothing left to do
        h.advance_secs(0);
        h.controller.handle(SessionEvent::Poll);
        assert!(h.notices().is_empty());
    }

    #[test]
    fn test_poll_detects_expiry() {
        let mut h = Harness::new();
        h.controller.login(&token_expiring_in(30));

        h.clock.advance(Duration::seconds(31));
        h.controller.handle(SessionEvent::Poll);

        assert_eq!(h.notices(), vec![Notice::Expired]);
        assert!(!h.controller.revalidate());
    }

    #[test]
    fn test_login_with_expired_token_ends_session() {
        let mut h = Harness::new();
        h.controller.login(&token_expiring_in(-10));

        assert!(!h.controller.is_valid());
        assert!(!h.controller.is_authenticated());
        assert!(h.store.is_empty());
        assert_eq!(h.scheduler.pending(), 0);
        assert_eq!(h.notices(), vec![Notice::Expired]);
    }

    #[test]
    fn test_login_with_undecodable_token() {
        let mut h = Harness::new();
        h.controller.login("opaque-token");

        assert!(h.controller.is_authenticated());
        assert_eq!(h.controller.expires_at(), None);
        assert_eq!(h.scheduler.pending(), 0);

        let user = h.controller.user().unwrap();
        assert_eq!(user.id, "");
        assert_eq!(user.display_name, PLACEHOLDER_NAME);
        assert_eq!(user.email, "");
    }

    #[test]
    fn test_login_with_empty_token_is_ignored() {
        let mut h = Harness::new();
        h.controller.login("   ");
        assert!(!h.controller.is_authenticated());
        assert!(h.store.is_empty());
    }

    #[test]
    fn test_initialize_without_persisted_token() {
        let mut h = Harness::new();
        h.controller.initialize();
        assert!(!h.controller.is_authenticated());
        assert_eq!(h.scheduler.pending(), 0);
    }

    #[test]
    fn test_initialize_with_expired_token_clears_storage() {
        let mut store = MemoryStore::new();
        store.set(TOKEN_KEY, &token_expiring_in(-1));
        store.set(USER_KEY, r#"{"id":"user-1","displayName":"Ada","email":""}"#);

        let mut h = Harness::with_store(store);
        h.controller.initialize();

        assert!(!h.controller.is_authenticated());
        assert!(h.store.is_empty());
        assert_eq!(h.scheduler.pending(), 0);
        assert!(h.notices().is_empty());
    }

    #[test]
    fn test_initialize_with_malformed_token_clears_storage() {
        let mut store = MemoryStore::new();
        store.set(TOKEN_KEY, "definitely.not.atoken");

        let mut h = Harness::with_store(store);
        h.controller.initialize();

        assert!(!h.controller.is_authenticated());
        assert!(h.store.is_empty());
    }

    #[test]
    fn test_initialize_derives_and_caches_missing_user() {
        let mut store = MemoryStore::new();
        store.set(TOKEN_KEY, &token_expiring_in(3_600));

        let mut h = Harness::with_store(store);
        h.controller.initialize();

        assert!(h.controller.is_authenticated());
        assert_eq!(h.controller.user().unwrap().display_name, "Ada");
        assert!(h.store.get(USER_KEY).is_some());
        assert_eq!(h.scheduler.pending(), 2);
    }

    #[test]
    fn test_initialize_prefers_cached_user() {
        let mut store = MemoryStore::new();
        store.set(TOKEN_KEY, &token_expiring_in(3_600));
        store.set(USER_KEY, r#"{"_id":"db-7","username":"ada.l","email":"a@b.c"}"#);

        let mut h = Harness::with_store(store);
        h.controller.initialize();

        let user = h.controller.user().unwrap();
        assert_eq!(user.id, "db-7");
        assert_eq!(user.display_name, "ada.l");
        assert_eq!(user.email, "a@b.c");
    }

    #[test]
    fn test_initialize_replaces_unreadable_cached_user() {
        let mut store = MemoryStore::new();
        store.set(TOKEN_KEY, &token_expiring_in(3_600));
        store.set(USER_KEY, "not json");

        let mut h = Harness::with_store(store);
        h.controller.initialize();

        assert_eq!(h.controller.user().unwrap().id, "user-1");
        let cached: SessionUser = serde_json::from_str(&h.store.get(USER_KEY).unwrap()).unwrap();
        assert_eq!(cached.id, "user-1");
    }

    #[test]
    fn test_placeholder_user_for_token_without_identity() {
        let mut h = Harness::new();
        h.controller.login(&encode_unsigned(&json!({"exp": T0 + 3_600})));

        let user = h.controller.user().unwrap();
        assert_eq!(user.id, "");
        assert_eq!(user.display_name, PLACEHOLDER_NAME);
    }

    #[test]
    fn test_check_auth_follows_external_logout() {
        let mut h = Harness::new();
        h.controller.login(&token_expiring_in(3_600));

        // Another process cleared the shared store
        let mut shared = h.store.clone();
        shared.remove(TOKEN_KEY);
        shared.remove(USER_KEY);

        assert!(!h.controller.check_auth());
        assert!(h.controller.token().is_none());
        assert_eq!(h.scheduler.pending(), 0);
    }

    #[test]
    fn test_check_auth_follows_external_login() {
        let mut h = Harness::new();
        assert!(!h.controller.check_auth());

        let mut shared = h.store.clone();
        shared.set(TOKEN_KEY, &token_expiring_in(3_600));

        assert!(h.controller.check_auth());
        assert_eq!(h.controller.user().unwrap().id, "user-1");
    }

    #[test]
    fn test_check_auth_follows_logout_in_another_process() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(Utc.timestamp_opt(T0, 0).unwrap());
        let scheduler = ManualScheduler::new();
        let mut controller = SessionController::new(
            FileStore::open(dir.path()),
            clock.clone(),
            scheduler.clone(),
            LogNotifier,
        );
        controller.login(&token_expiring_in(3_600));
        assert!(controller.check_auth());

        // Second process, own handle on the same session file
        let mut other = FileStore::open(dir.path());
        other.remove(TOKEN_KEY);
        other.remove(USER_KEY);

        assert!(!controller.check_auth());
        assert!(controller.token().is_none());
        assert_eq!(scheduler.pending(), 0);

        // And picks up a login made there
        let mut relogin = SessionController::new(
            FileStore::open(dir.path()),
            clock,
            ManualScheduler::new(),
            LogNotifier,
        );
        relogin.login(&encode_unsigned(&json!({"sub": "user-9", "exp": T0 + 600})));

        assert!(controller.check_auth());
        assert_eq!(controller.user().unwrap().id, "user-9");
        assert_eq!(scheduler.pending(), 2);
    }

    #[test]
    fn test_login_with_array_payload_has_no_expiry() {
        let mut h = Harness::new();
        let token = format!("h.{}.s", URL_SAFE_NO_PAD.encode(r#"[1,2,"u9"]"#));
        h.controller.login(&token);

        assert!(h.controller.is_authenticated());
        assert_eq!(h.controller.expires_at(), None);
        assert_eq!(h.controller.user().unwrap().id, "");
        assert_eq!(h.scheduler.pending(), 0);
        assert!(h.notices().is_empty());
    }

    #[test]
    fn test_custom_timing() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(Utc.timestamp_opt(T0, 0).unwrap());
        let scheduler = ManualScheduler::new();
        let mut controller =
            SessionController::new(store, clock, scheduler.clone(), LogNotifier)
                .with_timing(SessionTiming {
                    warn_lead: StdDuration::from_secs(300),
                    logout_buffer: StdDuration::from_secs(1),
                    poll_interval: StdDuration::from_secs(5),
                });

        controller.login(&token_expiring_in(600));
        assert_eq!(
            scheduler.deadline(TimerKind::Warn),
            Utc.timestamp_opt(T0 + 300, 0).single()
        );
        assert_eq!(
            scheduler.deadline(TimerKind::Expire),
            Utc.timestamp_opt(T0 + 601, 0).single()
        );
    }
}

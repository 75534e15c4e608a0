//! Application state for the taskpad CLI.
//!
//! `App` wires the core pieces together: the configured session store, a
//! `SessionController` driven by tokio timers, and an `ApiClient` that is
//! handed the session token for every protected call.

use anyhow::{bail, Result};
use futures::future;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use taskpad_core::api::ApiClient;
use taskpad_core::auth::{
    FileStore, KeyValueStore, KeyringStore, Notice, SessionController, SessionEvent, SystemClock,
    TokioScheduler,
};
use taskpad_core::config::{Config, StorageBackend};
use taskpad_core::models::{
    Credentials, RegisterResponse, Registration, Task, TaskCreate, TaskStats, TaskUpdate, User,
    UserUpdate,
};
use taskpad_core::ApiError;

pub const NOT_LOGGED_IN: &str = "Not logged in. Run `taskpad login` first.";

pub struct App {
    pub config: Config,
    pub api: ApiClient,
    pub session: SessionController,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    notices: mpsc::UnboundedReceiver<Notice>,
}

impl App {
    /// Build the app and restore any persisted session.
    pub fn new(config: Config) -> Result<Self> {
        let store: Box<dyn KeyValueStore> = match config.storage {
            StorageBackend::File => Box::new(FileStore::open(&config.cache_dir()?)),
            StorageBackend::Keyring => Box::new(KeyringStore),
        };
        debug!(storage = ?config.storage, "Session store selected");

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        let mut session = SessionController::new(
            store,
            SystemClock,
            TokioScheduler::new(event_tx),
            notice_tx,
        )
        .with_timing(config.session.timing());
        session.initialize();

        let api = ApiClient::new(config.api_url())?;

        Ok(Self {
            config,
            api,
            session,
            events: Some(event_rx),
            notices: notice_rx,
        })
    }

    /// Hand the timer event stream to the event loop. Only the first call
    /// gets it.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events.take()
    }

    /// Notices emitted since the last call.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            notices.push(notice);
        }
        notices
    }

    /// API client carrying the session token, or an error when there is no
    /// valid session.
    fn authed_api(&mut self) -> Result<ApiClient> {
        if !self.session.check_auth() {
            bail!(NOT_LOGGED_IN);
        }
        match self.session.token() {
            Some(token) => Ok(self.api.with_token(token)),
            None => bail!(NOT_LOGGED_IN),
        }
    }

    /// A 401 means the server no longer honours the token, whatever its
    /// claims say.
    fn check_rejected<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(ref e) = result {
            if ApiError::is_unauthorized(e) {
                warn!("Server rejected the session token");
                self.session.logout();
            }
        }
        result
    }

    // ===== Auth =====

    pub async fn login(&mut self, email: &str, password: &str) -> Result<()> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.api.login(&credentials).await?;
        self.session.login(&response.token);

        self.config.last_email = Some(email.to_string());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        info!("Login successful");
        Ok(())
    }

    pub async fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterResponse> {
        let registration = Registration {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.api.register(&registration).await?;
        if let Some(ref token) = response.token {
            self.session.login(token);
        }
        Ok(response)
    }

    pub fn logout(&mut self) {
        self.session.logout();
    }

    /// Ask the server whether it still accepts the token.
    pub async fn check(&mut self) -> Result<String> {
        let api = self.authed_api()?;
        let result = api.check_protected().await;
        let response = self.check_rejected(result)?;
        Ok(response.message)
    }

    // ===== Tasks =====

    /// Tasks and stats, fetched concurrently. Stats are optional; not every
    /// deployment serves them.
    pub async fn list(&mut self) -> Result<(Vec<Task>, Option<TaskStats>)> {
        let api = self.authed_api()?;
        let (tasks, stats) = future::join(api.fetch_tasks(), api.fetch_task_stats()).await;
        let tasks = self.check_rejected(tasks)?;
        let stats = match stats {
            Ok(stats) => Some(stats),
            Err(e) => {
                debug!(error = %e, "Task stats unavailable");
                None
            }
        };
        Ok((tasks, stats))
    }

    pub async fn show(&mut self, task_id: &str) -> Result<Task> {
        let api = self.authed_api()?;
        let result = api.fetch_task(task_id).await;
        self.check_rejected(result)
    }

    pub async fn add(&mut self, task: &TaskCreate) -> Result<Task> {
        let api = self.authed_api()?;
        let result = api.create_task(task).await;
        self.check_rejected(result)
    }

    /// PATCH by default, PUT when `replace` is set.
    pub async fn update(
        &mut self,
        task_id: &str,
        update: &TaskUpdate,
        replace: bool,
    ) -> Result<Task> {
        if update.is_empty() {
            bail!("Nothing to update");
        }
        let api = self.authed_api()?;
        let result = if replace {
            api.update_task(task_id, update).await
        } else {
            api.patch_task(task_id, update).await
        };
        self.check_rejected(result)
    }

    pub async fn set_done(&mut self, task_id: &str, done: bool) -> Result<Task> {
        self.update(task_id, &TaskUpdate::completion(done), false).await
    }

    pub async fn delete(&mut self, task_id: &str) -> Result<()> {
        let api = self.authed_api()?;
        let result = api.delete_task(task_id).await;
        self.check_rejected(result)
    }

    pub async fn stats(&mut self) -> Result<TaskStats> {
        let api = self.authed_api()?;
        let result = api.fetch_task_stats().await;
        self.check_rejected(result)
    }

    // ===== Users =====

    pub async fn users(&mut self) -> Result<Vec<User>> {
        let api = self.authed_api()?;
        let result = api.fetch_users().await;
        self.check_rejected(result)
    }

    pub async fn user(&mut self, user_id: &str) -> Result<User> {
        let api = self.authed_api()?;
        let result = api.fetch_user(user_id).await;
        self.check_rejected(result)
    }

    pub async fn update_user(&mut self, user_id: &str, update: &UserUpdate) -> Result<User> {
        if update.is_empty() {
            bail!("Nothing to update");
        }
        let api = self.authed_api()?;
        let result = api.update_user(user_id, update).await;
        self.check_rejected(result)
    }

    /// Deleting the logged-in account also ends the session.
    pub async fn delete_user(&mut self, user_id: &str) -> Result<()> {
        let api = self.authed_api()?;
        let result = api.delete_user(user_id).await;
        self.check_rejected(result)?;

        if self.is_current_user(user_id) {
            info!("Deleted the logged-in account");
            self.session.logout();
        }
        Ok(())
    }

    fn is_current_user(&self, user_id: &str) -> bool {
        self.session
            .user()
            .is_some_and(|user| !user.id.is_empty() && user.id == user_id.trim())
    }
}

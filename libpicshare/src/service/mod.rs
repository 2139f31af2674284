//! View-model layer for Picshare
//!
//! Holds the UI-observable state and exposes the actions screens invoke. Each
//! action performs its gateway calls, transforms the result, updates
//! [`UiState`], and emits an [`Event`](events::Event) so observers re-render.
//!
//! # Architecture
//!
//! `PicshareService` is the entry point, coordinating specialized
//! sub-services that share one backend, config, state and event bus:
//!
//! - `AuthService`: sign up, log in/out, password reset, session restore
//! - `ProfileService`: load and edit the profile, avatar upload
//! - `PostService`: publish, own posts, likes, search, avatar propagation
//! - `FeedService`: follow-based feed with a recency fallback
//! - `SocialService`: follow and unfollow
//! - `CommentService`: create and list comments
//!
//! Every failure goes through one handler that logs it, clears the progress
//! flag and queues a one-shot [`Notification`](events::Notification).
//!
//! # Example
//!
//! ```no_run
//! use libpicshare::service::PicshareService;
//! use secrecy::SecretString;
//!
//! # async fn example() -> libpicshare::Result<()> {
//! let service = PicshareService::new().await?;
//!
//! let password = SecretString::from("correct horse".to_string());
//! service.auth().log_in("ada@example.com", &password).await?;
//!
//! for post in service.feed().load_feed().await? {
//!     println!("{}: {}", post.username.unwrap_or_default(), post.post_description);
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod comments;
pub mod events;
pub mod feed;
pub mod posts;
pub mod profile;
pub mod social;
pub mod state;
pub mod validation;

pub use events::{Event, EventReceiver, FeedSource, Notification, NotificationQueue};
pub use state::UiState;

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use self::auth::AuthService;
use self::comments::CommentService;
use self::events::EventBus;
use self::feed::FeedService;
use self::posts::PostService;
use self::profile::ProfileService;
use self::social::SocialService;
use crate::backend::local::LocalBackend;
use crate::backend::Backend;
use crate::error::{PicshareError, Result};
use crate::Config;

/// Resources shared by every sub-service
#[derive(Clone)]
pub(crate) struct Context {
    pub backend: Backend,
    pub config: Arc<Config>,
    pub state: Arc<RwLock<UiState>>,
    pub events: EventBus,
    pub notifications: NotificationQueue,
}

impl Context {
    /// Mutate the state; the lock is released before returning
    pub async fn update<R>(&self, f: impl FnOnce(&mut UiState) -> R) -> R {
        let mut state = self.state.write().await;
        f(&mut state)
    }

    pub async fn snapshot(&self) -> UiState {
        self.state.read().await.clone()
    }

    pub fn notify(&self, message: impl Into<String>) {
        self.notifications.push(Notification::info(message));
    }

    /// The single failure funnel
    ///
    /// Logs the error, clears `in_progress` and queues a notification reading
    /// `"<context>: <error>"`, or just the error when `context` is empty.
    pub async fn report(&self, context: &str, error: PicshareError) -> PicshareError {
        let message = if context.is_empty() {
            error.to_string()
        } else {
            format!("{}: {}", context, error)
        };
        warn!(error = %error, "{}", message);
        self.update(|s| s.in_progress = false).await;
        self.notifications.push(Notification::error(message));
        error
    }

    /// Pass `Ok` through, send `Err` through [`report`](Self::report)
    pub async fn handle<T>(&self, context: &str, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(error) => Err(self.report(context, error).await),
        }
    }

    /// User id of the current session
    ///
    /// A missing session here means a write was attempted while signed out,
    /// which the UI should never allow: the failure is reported and the
    /// local session is torn down.
    pub async fn require_session(&self, context: &str) -> Result<String> {
        let current = self.backend.auth.current_user().await;
        match self.handle(context, current).await? {
            Some(uid) => Ok(uid),
            None => {
                let error = self.report(context, PicshareError::NoSession).await;
                if let Err(e) = self.end_session().await {
                    warn!(error = %e, "sign-out after lost session failed");
                }
                Err(error)
            }
        }
    }

    /// Sign out of the backend and clear all session state
    pub async fn end_session(&self) -> Result<()> {
        let signed_out = self.backend.auth.sign_out().await;
        self.update(UiState::clear_session).await;
        self.events.emit(Event::SignedOut);
        self.notify("Logged out");
        signed_out
    }
}

/// Toggle `id` in `list`, returning the new list and whether `id` is now present
pub fn toggle_membership(list: &[String], id: &str) -> (Vec<String>, bool) {
    if list.iter().any(|item| item == id) {
        (list.iter().filter(|item| *item != id).cloned().collect(), false)
    } else {
        let mut next = list.to_vec();
        next.push(id.to_string());
        (next, true)
    }
}

/// Main view-model facade
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct PicshareService {
    ctx: Context,
    auth: AuthService,
    profile: ProfileService,
    posts: PostService,
    feed: FeedService,
    social: SocialService,
    comments: CommentService,
}

impl PicshareService {
    /// Create a service over the local backend using the default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or the local
    /// database cannot be opened or migrated.
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Create a service over the local backend described by `config`
    pub async fn from_config(config: Config) -> Result<Self> {
        let local = LocalBackend::from_config(&config.backend).await?;
        Ok(Self::with_backend(Backend::from_shared(Arc::new(local)), config))
    }

    /// Create a service over any backend, used by tests and embedders
    pub fn with_backend(backend: Backend, config: Config) -> Self {
        let ctx = Context {
            backend,
            config: Arc::new(config),
            state: Arc::new(RwLock::new(UiState::default())),
            events: EventBus::new(100),
            notifications: NotificationQueue::new(),
        };

        let posts = PostService::new(ctx.clone());
        let feed = FeedService::new(ctx.clone());
        let profile = ProfileService::new(ctx.clone(), posts.clone(), feed.clone());
        let auth = AuthService::new(ctx.clone(), profile.clone());
        let social = SocialService::new(ctx.clone(), profile.clone());
        let comments = CommentService::new(ctx.clone());

        Self {
            ctx,
            auth,
            profile,
            posts,
            feed,
            social,
            comments,
        }
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn profile(&self) -> &ProfileService {
        &self.profile
    }

    pub fn posts(&self) -> &PostService {
        &self.posts
    }

    pub fn feed(&self) -> &FeedService {
        &self.feed
    }

    pub fn social(&self) -> &SocialService {
        &self.social
    }

    pub fn comments(&self) -> &CommentService {
        &self.comments
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    /// Snapshot of the current UI state
    pub async fn state(&self) -> UiState {
        self.ctx.snapshot().await
    }

    /// Subscribe to state-change events
    pub fn subscribe(&self) -> EventReceiver {
        self.ctx.events.subscribe()
    }

    /// Queue of one-shot user notifications
    pub fn notifications(&self) -> &NotificationQueue {
        &self.ctx.notifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_toggle_membership_adds_then_removes() {
        let original = ids(&["a", "b"]);

        let (added, present) = toggle_membership(&original, "c");
        assert!(present);
        assert_eq!(added, ids(&["a", "b", "c"]));

        let (removed, present) = toggle_membership(&added, "c");
        assert!(!present);
        assert_eq!(removed, original);
    }

    #[test]
    fn test_toggle_membership_empty_list() {
        let (list, present) = toggle_membership(&[], "a");
        assert!(present);
        assert_eq!(list, ids(&["a"]));
    }

    #[tokio::test]
    async fn test_report_formats_and_queues() {
        let service = PicshareService::with_backend(
            Backend::from_shared(Arc::new(MemoryBackend::new())),
            Config::default(),
        );
        service.ctx.update(|s| s.in_progress = true).await;

        let error = service
            .ctx
            .report(
                "Cannot get feed",
                crate::error::BackendError::Network("offline".to_string()).into(),
            )
            .await;

        assert!(matches!(error, PicshareError::Backend(_)));
        assert!(!service.state().await.in_progress);
        let notification = service.notifications().pop().unwrap();
        assert_eq!(
            notification.message,
            "Cannot get feed: Backend error: Network error: offline"
        );
    }

    #[tokio::test]
    async fn test_report_without_context() {
        let service = PicshareService::with_backend(
            Backend::from_shared(Arc::new(MemoryBackend::new())),
            Config::default(),
        );
        service
            .ctx
            .report("", PicshareError::UsernameTaken)
            .await;
        assert_eq!(
            service.notifications().pop().unwrap().message,
            "Username already exists"
        );
    }
}

//! Account lifecycle: sign up, log in/out, password reset, session restore

use secrecy::SecretString;
use tracing::info;

use super::events::Event;
use super::profile::{ProfileService, ProfileUpdate};
use super::validation::{validate_email, validate_login, validate_sign_up};
use super::Context;
use crate::backend::Query;
use crate::error::{PicshareError, Result};
use crate::types::User;

#[derive(Clone)]
pub struct AuthService {
    ctx: Context,
    profile: ProfileService,
}

impl AuthService {
    pub(crate) fn new(ctx: Context, profile: ProfileService) -> Self {
        Self { ctx, profile }
    }

    /// Create an account and its profile
    ///
    /// The handle is checked against existing profiles before the account is
    /// created; a taken handle fails with [`PicshareError::UsernameTaken`]
    /// and no account is created.
    pub async fn sign_up(
        &self,
        username: &str,
        email: &str,
        password: &SecretString,
    ) -> Result<User> {
        let username = username.trim();
        let email = email.trim();
        let checked = validate_sign_up(username, email, password);
        self.ctx.handle("", checked).await?;

        self.ctx.update(|s| s.in_progress = true).await;
        let taken = self.username_taken(username).await;
        if self.ctx.handle("Sign up failed", taken).await? {
            return Err(self.ctx.report("", PicshareError::UsernameTaken).await);
        }

        let created = self.ctx.backend.auth.create_account(email, password).await;
        let uid = self.ctx.handle("Sign up failed", created).await?;
        self.mark_signed_in(&uid).await;

        let profile = ProfileUpdate {
            username: Some(username.to_string()),
            ..Default::default()
        };
        let user = self
            .profile
            .save_profile(&uid, &profile, "Cannot create user")
            .await?;
        info!(user_id = %uid, "account created");

        let _ = self.profile.load_user_data(&uid).await;
        Ok(user)
    }

    async fn username_taken(&self, username: &str) -> Result<bool> {
        let holders = self
            .ctx
            .backend
            .documents
            .query(
                &self.ctx.config.collections.users,
                &Query::new().where_eq("username", username),
            )
            .await?;
        Ok(!holders.is_empty())
    }

    /// Sign in and load the user's profile, posts and feed
    pub async fn log_in(&self, email: &str, password: &SecretString) -> Result<Option<User>> {
        let email = email.trim();
        let checked = validate_login(email, password);
        self.ctx.handle("", checked).await?;

        self.ctx.update(|s| s.in_progress = true).await;
        let signed_in = self.ctx.backend.auth.sign_in(email, password).await;
        let uid = self.ctx.handle("Login failed", signed_in).await?;
        self.mark_signed_in(&uid).await;
        info!(user_id = %uid, "logged in");

        self.profile.load_user_data(&uid).await
    }

    /// Sign out and drop every list tied to the session
    pub async fn log_out(&self) -> Result<()> {
        let result = self.ctx.end_session().await;
        self.ctx.handle("Logout failed", result).await
    }

    pub async fn send_password_reset(&self, email: &str) -> Result<()> {
        let email = email.trim();
        let checked = validate_email(email);
        self.ctx.handle("", checked).await?;

        let sent = self.ctx.backend.auth.send_password_reset(email).await;
        self.ctx
            .handle("Password reset failed - Please insert a valid email", sent)
            .await?;
        self.ctx.notify("Password reset email sent");
        Ok(())
    }

    /// Pick up a session left by a previous run
    ///
    /// Returns `Ok(None)` without touching state when nobody is signed in.
    pub async fn restore_session(&self) -> Result<Option<User>> {
        let current = self.ctx.backend.auth.current_user().await;
        match self.ctx.handle("Cannot restore session", current).await? {
            Some(uid) => {
                self.mark_signed_in(&uid).await;
                self.profile.load_user_data(&uid).await
            }
            None => Ok(None),
        }
    }

    async fn mark_signed_in(&self, uid: &str) {
        self.ctx.update(|s| s.signed_in = true).await;
        self.ctx.events.emit(Event::SignedIn {
            user_id: uid.to_string(),
        });
    }
}

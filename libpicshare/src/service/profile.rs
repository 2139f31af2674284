//! Profile loading and editing

use std::path::Path;
use tracing::{debug, info};

use super::events::Event;
use super::feed::FeedService;
use super::posts::PostService;
use super::validation::validate_username;
use super::Context;
use crate::backend::{FieldUpdate, Query};
use crate::error::{PicshareError, Result};
use crate::mappers::Entity;
use crate::types::User;

/// Profile fields to change; `None` keeps the current value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub username: Option<String>,
    pub image_url: Option<String>,
    pub bio: Option<String>,
}

impl ProfileUpdate {
    fn apply_to(&self, mut user: User) -> User {
        if let Some(name) = &self.name {
            user.name = Some(name.clone());
        }
        if let Some(username) = &self.username {
            user.username = Some(username.clone());
        }
        if let Some(image_url) = &self.image_url {
            user.image_url = Some(image_url.clone());
        }
        if let Some(bio) = &self.bio {
            user.bio = Some(bio.clone());
        }
        user
    }
}

#[derive(Clone)]
pub struct ProfileService {
    ctx: Context,
    posts: PostService,
    feed: FeedService,
}

impl ProfileService {
    pub(crate) fn new(ctx: Context, posts: PostService, feed: FeedService) -> Self {
        Self { ctx, posts, feed }
    }

    fn collection(&self) -> &str {
        &self.ctx.config.collections.users
    }

    /// Load the profile of `uid` into state, then refresh own posts and feed
    ///
    /// Returns `None` when no profile document exists yet. Failures of the
    /// follow-up refreshes are reported but do not fail the load.
    pub async fn load_user_data(&self, uid: &str) -> Result<Option<User>> {
        self.ctx.update(|s| s.in_progress = true).await;
        let result = self.fetch_user(uid).await;
        let user = self.ctx.handle("Cannot get user data", result).await?;

        self.ctx
            .update(|s| {
                s.in_progress = false;
                s.signed_in = true;
                s.user = user.clone();
            })
            .await;
        self.ctx.events.emit(Event::ProfileLoaded {
            user_id: uid.to_string(),
        });
        debug!(user_id = %uid, found = user.is_some(), "user data loaded");

        let _ = self.posts.refresh_posts().await;
        let _ = self.feed.load_feed().await;
        Ok(user)
    }

    async fn fetch_user(&self, uid: &str) -> Result<Option<User>> {
        match self.ctx.backend.documents.get(self.collection(), uid).await? {
            Some(doc) => Ok(Some(User::from_document(&doc)?)),
            None => Ok(None),
        }
    }

    /// Edit the signed-in user's name, handle and bio
    pub async fn update_profile(
        &self,
        name: Option<String>,
        username: Option<String>,
        bio: Option<String>,
    ) -> Result<User> {
        let uid = self.ctx.require_session("Cannot update user").await?;
        let changes = ProfileUpdate {
            name,
            username,
            image_url: None,
            bio,
        };
        self.save_profile(&uid, &changes, "Cannot update user").await
    }

    /// Upload a new avatar, store its URL on the profile and copy it onto
    /// every post by the user
    pub async fn upload_profile_image(&self, image: &Path) -> Result<String> {
        let uid = self.ctx.require_session("Cannot upload image").await?;

        self.ctx.update(|s| s.in_progress = true).await;
        let key = format!("avatars/{}/{}", uid, uuid::Uuid::new_v4());
        let uploaded = self.ctx.backend.blobs.upload(image, &key).await;
        let url = self.ctx.handle("Cannot upload image", uploaded).await?;

        let changes = ProfileUpdate {
            image_url: Some(url.clone()),
            ..Default::default()
        };
        self.save_profile(&uid, &changes, "Cannot update user").await?;
        self.posts.propagate_avatar(&uid, &url).await?;
        Ok(url)
    }

    /// Merge `changes` into the cached profile and write it
    ///
    /// Updates the profile document when it exists and creates it otherwise.
    /// A new handle already held by another user fails with
    /// [`PicshareError::UsernameTaken`].
    pub(crate) async fn save_profile(
        &self,
        uid: &str,
        changes: &ProfileUpdate,
        context: &str,
    ) -> Result<User> {
        if let Some(username) = &changes.username {
            let checked = validate_username(username);
            self.ctx.handle("", checked).await?;
        }

        self.ctx.update(|s| s.in_progress = true).await;
        let current = self
            .ctx
            .snapshot()
            .await
            .user
            .filter(|u| u.user_id == uid)
            .unwrap_or_else(|| User {
                user_id: uid.to_string(),
                ..Default::default()
            });
        let user = changes.apply_to(current.clone());

        let result = self.write_profile(&current, &user).await;
        self.ctx.handle(context, result).await?;

        self.ctx
            .update(|s| {
                s.in_progress = false;
                s.user = Some(user.clone());
            })
            .await;
        self.ctx.events.emit(Event::ProfileLoaded {
            user_id: uid.to_string(),
        });
        info!(user_id = %uid, "profile saved");
        Ok(user)
    }

    async fn write_profile(&self, current: &User, user: &User) -> Result<()> {
        let store = &self.ctx.backend.documents;

        if let Some(username) = &user.username {
            if current.username.as_ref() != Some(username) {
                let query = Query::new().where_eq("username", username.as_str());
                let holders = store.query(self.collection(), &query).await?;
                if holders.iter().any(|doc| doc.id != user.user_id) {
                    return Err(PicshareError::UsernameTaken);
                }
            }
        }

        if store.get(self.collection(), &user.user_id).await?.is_some() {
            let updates = user
                .profile_fields()
                .into_iter()
                .map(|(field, value)| FieldUpdate::Set(field, value))
                .collect();
            store.update(self.collection(), &user.user_id, updates).await
        } else {
            store
                .set(self.collection(), &user.user_id, user.to_fields()?)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_update_keeps_unset_fields() {
        let user = User {
            user_id: "u1".to_string(),
            name: Some("Ada".to_string()),
            username: Some("ada".to_string()),
            bio: Some("maths".to_string()),
            following: vec!["u2".to_string()],
            ..Default::default()
        };
        let changes = ProfileUpdate {
            bio: Some("engines".to_string()),
            ..Default::default()
        };

        let merged = changes.apply_to(user.clone());

        assert_eq!(merged.bio.as_deref(), Some("engines"));
        assert_eq!(merged.name, user.name);
        assert_eq!(merged.username, user.username);
        assert_eq!(merged.following, user.following);
    }
}

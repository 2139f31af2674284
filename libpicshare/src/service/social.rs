//! Follow and unfollow

use tracing::info;

use super::events::Event;
use super::profile::ProfileService;
use super::{toggle_membership, Context};
use crate::backend::FieldUpdate;
use crate::error::{PicshareError, Result};

#[derive(Clone)]
pub struct SocialService {
    ctx: Context,
    profile: ProfileService,
}

impl SocialService {
    pub(crate) fn new(ctx: Context, profile: ProfileService) -> Self {
        Self { ctx, profile }
    }

    /// Flip whether the signed-in user follows `target`
    ///
    /// Works from the `following` list already in state. Returns whether the
    /// user follows `target` afterwards.
    pub async fn toggle_follow(&self, target: &str) -> Result<bool> {
        let uid = self.ctx.require_session("Cannot follow user").await?;
        if uid == target {
            let error = PicshareError::Validation("You cannot follow yourself".to_string());
            return Err(self.ctx.report("", error).await);
        }

        let current = self.ctx.snapshot().await.following().to_vec();
        let (following, now_following) = toggle_membership(&current, target);

        let update = if now_following {
            FieldUpdate::array_union("following", target)
        } else {
            FieldUpdate::array_remove("following", target)
        };
        let written = self
            .ctx
            .backend
            .documents
            .update(&self.ctx.config.collections.users, &uid, vec![update])
            .await;
        self.ctx.handle("Cannot follow user", written).await?;

        self.ctx
            .update(|s| {
                if let Some(user) = s.user.as_mut() {
                    user.following = following;
                }
            })
            .await;
        self.ctx.events.emit(Event::FollowToggled {
            user_id: target.to_string(),
            following: now_following,
        });
        info!(target = %target, following = now_following, "follow toggled");

        let _ = self.profile.load_user_data(&uid).await;
        Ok(now_following)
    }

    /// Follow `target`; already following is a no-op
    pub async fn follow(&self, target: &str) -> Result<bool> {
        if self.is_following(target).await {
            return Ok(true);
        }
        self.toggle_follow(target).await
    }

    /// Stop following `target`; not following is a no-op with no write
    pub async fn unfollow(&self, target: &str) -> Result<bool> {
        if !self.is_following(target).await {
            return Ok(false);
        }
        self.toggle_follow(target).await
    }

    async fn is_following(&self, target: &str) -> bool {
        self.ctx
            .snapshot()
            .await
            .user
            .map(|u| u.is_following(target))
            .unwrap_or(false)
    }
}

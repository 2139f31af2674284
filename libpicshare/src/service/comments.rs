//! Comments on posts

use tracing::debug;

use super::events::Event;
use super::Context;
use crate::backend::Query;
use crate::error::{PicshareError, Result};
use crate::mappers::{from_documents, Entity};
use crate::types::{now_millis, Comment};

#[derive(Clone)]
pub struct CommentService {
    ctx: Context,
}

impl CommentService {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    fn collection(&self) -> &str {
        &self.ctx.config.collections.comments
    }

    /// Comment on `post_id` as the signed-in user, then reload its comments
    pub async fn create_comment(&self, post_id: &str, text: &str) -> Result<Comment> {
        let uid = self.ctx.require_session("Cannot create comment").await?;
        let text = text.trim();
        if text.is_empty() {
            let error = PicshareError::Validation("Comment cannot be empty".to_string());
            return Err(self.ctx.report("", error).await);
        }

        let username = self.ctx.snapshot().await.user.and_then(|u| u.username);
        let Some(username) = username else {
            let error = PicshareError::Validation("Set a username before commenting".to_string());
            return Err(self.ctx.report("", error).await);
        };

        let comment = Comment {
            comment_id: uuid::Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            username: Some(username),
            text: text.to_string(),
            timestamp: now_millis(),
        };
        let written = self.write(&comment).await;
        self.ctx.handle("Cannot create comment", written).await?;
        debug!(user_id = %uid, post_id = %post_id, "comment created");

        let _ = self.load_comments(post_id).await;
        Ok(comment)
    }

    async fn write(&self, comment: &Comment) -> Result<()> {
        let fields = comment.to_fields()?;
        self.ctx
            .backend
            .documents
            .set(self.collection(), comment.id(), fields)
            .await
    }

    /// Comments on `post_id`, newest first
    pub async fn load_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        self.ctx.update(|s| s.comments_loading = true).await;
        let result = self.fetch(post_id).await;
        self.ctx.update(|s| s.comments_loading = false).await;
        let mut comments = self.ctx.handle("Cannot retrieve comments", result).await?;
        comments.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        self.ctx.update(|s| s.comments = comments.clone()).await;
        self.ctx.events.emit(Event::CommentsUpdated {
            post_id: post_id.to_string(),
            count: comments.len(),
        });
        Ok(comments)
    }

    async fn fetch(&self, post_id: &str) -> Result<Vec<Comment>> {
        let docs = self
            .ctx
            .backend
            .documents
            .query(self.collection(), &Query::new().where_eq("postId", post_id))
            .await?;
        from_documents(&docs)
    }
}

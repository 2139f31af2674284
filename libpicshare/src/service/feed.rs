//! Feed aggregation
//!
//! Posts by followed users, newest first. When that comes back empty, or the
//! user follows nobody, the feed falls back to every post inside the
//! trailing window (`feed.window_days`). The two are never merged.

use futures::future::try_join_all;
use tracing::{debug, info};

use super::events::{Event, FeedSource};
use super::posts::sort_newest_first;
use super::Context;
use crate::backend::Query;
use crate::error::Result;
use crate::mappers::from_documents;
use crate::types::{now_millis, Post};

#[derive(Clone)]
pub struct FeedService {
    ctx: Context,
}

impl FeedService {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Load the feed for the signed-in user into state
    ///
    /// Concurrent loads are not coalesced; whichever finishes last wins.
    pub async fn load_feed(&self) -> Result<Vec<Post>> {
        let following = self
            .ctx
            .update(|s| {
                s.feed_loading = true;
                s.following().to_vec()
            })
            .await;

        let result = self.fetch(&following).await;
        self.ctx.update(|s| s.feed_loading = false).await;
        let (posts, source) = self.ctx.handle("Cannot get feed", result).await?;

        self.ctx
            .update(|s| {
                s.feed = posts.clone();
                s.feed_source = Some(source);
            })
            .await;
        self.ctx.events.emit(Event::FeedUpdated {
            count: posts.len(),
            source,
        });
        info!(count = posts.len(), ?source, "feed loaded");
        Ok(posts)
    }

    async fn fetch(&self, following: &[String]) -> Result<(Vec<Post>, FeedSource)> {
        let personal = self.following_posts(following).await?;
        if !personal.is_empty() {
            return Ok((personal, FeedSource::Following));
        }
        debug!("follow-based feed empty, falling back to recent posts");
        Ok((self.recent_posts().await?, FeedSource::Recent))
    }

    /// Posts by any of `following`, split into `In` queries the backend accepts
    async fn following_posts(&self, following: &[String]) -> Result<Vec<Post>> {
        if following.is_empty() {
            return Ok(Vec::new());
        }

        let store = &self.ctx.backend.documents;
        let collection = &self.ctx.config.collections.posts;
        let chunk_size = store.max_in_values().max(1);

        let queries = following.chunks(chunk_size).map(|chunk| {
            let query = Query::new().where_in("userId", chunk.iter().cloned());
            async move { store.query(collection, &query).await }
        });
        let pages = try_join_all(queries).await?;

        let mut posts = Vec::new();
        for docs in pages {
            posts.extend(from_documents::<Post>(&docs)?);
        }
        sort_newest_first(&mut posts);
        Ok(posts)
    }

    async fn recent_posts(&self) -> Result<Vec<Post>> {
        let since = now_millis().saturating_sub(self.ctx.config.feed.window_millis());
        let docs = self
            .ctx
            .backend
            .documents
            .query(
                &self.ctx.config.collections.posts,
                &Query::new().where_greater_than("time", since),
            )
            .await?;
        let mut posts = from_documents::<Post>(&docs)?;
        sort_newest_first(&mut posts);
        Ok(posts)
    }
}

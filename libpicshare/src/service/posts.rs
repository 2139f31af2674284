//! Post publication, own posts, likes, search and avatar propagation

use std::path::Path;
use tracing::{debug, info};

use super::events::Event;
use super::{toggle_membership, Context};
use crate::backend::{BatchWrite, FieldUpdate, Query};
use crate::error::{BackendError, Result};
use crate::mappers::{from_documents, Entity};
use crate::types::{now_millis, Post};

/// Lowercase search terms of a description
///
/// Splits on whitespace and ASCII punctuation, drops empty fragments and
/// `filler_words`, and keeps the first occurrence of each term.
pub fn search_terms(description: &str, filler_words: &[String]) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for fragment in description.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation()) {
        if fragment.is_empty() {
            continue;
        }
        let term = fragment.to_lowercase();
        if filler_words.iter().any(|w| w.to_lowercase() == term) || terms.contains(&term) {
            continue;
        }
        terms.push(term);
    }
    terms
}

/// Sort by creation time, newest first
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.time.cmp(&a.time));
}

#[derive(Clone)]
pub struct PostService {
    ctx: Context,
}

impl PostService {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    fn collection(&self) -> &str {
        &self.ctx.config.collections.posts
    }

    /// Upload an image, then publish a post for it
    ///
    /// Stops at the first failing step; an uploaded image whose post write
    /// fails is left in storage.
    pub async fn publish(&self, image: &Path, description: &str) -> Result<Post> {
        let uid = self.ctx.require_session("Unable to create post").await?;
        let author = self.ctx.snapshot().await.user;

        self.ctx.update(|s| s.in_progress = true).await;
        let key = format!("images/{}", uuid::Uuid::new_v4());
        let uploaded = self.ctx.backend.blobs.upload(image, &key).await;
        let image_url = self.ctx.handle("Cannot upload image", uploaded).await?;

        let post = Post {
            post_id: uuid::Uuid::new_v4().to_string(),
            user_id: uid,
            username: author.as_ref().and_then(|u| u.username.clone()),
            user_image: author.as_ref().and_then(|u| u.image_url.clone()),
            post_image: Some(image_url),
            post_description: description.to_string(),
            time: now_millis(),
            likes: Vec::new(),
            search_terms: search_terms(description, &self.ctx.config.posts.filler_words),
        };

        let written = self.write_post(&post).await;
        self.ctx.handle("Unable to create post", written).await?;

        self.ctx.update(|s| s.in_progress = false).await;
        self.ctx.notify("Post successfully created");
        self.ctx.events.emit(Event::PostPublished {
            post_id: post.post_id.clone(),
        });
        info!(post_id = %post.post_id, terms = post.search_terms.len(), "post published");

        // A failed reload is already reported and does not undo the post
        let _ = self.refresh_posts().await;
        Ok(post)
    }

    async fn write_post(&self, post: &Post) -> Result<()> {
        let fields = post.to_fields()?;
        self.ctx
            .backend
            .documents
            .set(self.collection(), post.id(), fields)
            .await
    }

    /// Reload the signed-in user's own posts into state
    pub async fn refresh_posts(&self) -> Result<Vec<Post>> {
        let uid = self.ctx.require_session("Cannot fetch posts").await?;

        self.ctx.update(|s| s.my_posts_loading = true).await;
        let result = self.posts_by(&uid).await;
        self.ctx.update(|s| s.my_posts_loading = false).await;
        let mut posts = self.ctx.handle("Cannot fetch posts", result).await?;
        sort_newest_first(&mut posts);

        self.ctx.update(|s| s.my_posts = posts.clone()).await;
        self.ctx.events.emit(Event::MyPostsUpdated { count: posts.len() });
        Ok(posts)
    }

    async fn posts_by(&self, uid: &str) -> Result<Vec<Post>> {
        let docs = self
            .ctx
            .backend
            .documents
            .query(self.collection(), &Query::new().where_eq("userId", uid))
            .await?;
        from_documents(&docs)
    }

    /// A single post, for the detail screen
    pub async fn get_post(&self, post_id: &str) -> Result<Post> {
        let result = self.fetch_post(post_id).await;
        self.ctx.handle("Cannot retrieve post", result).await
    }

    async fn fetch_post(&self, post_id: &str) -> Result<Post> {
        match self.ctx.backend.documents.get(self.collection(), post_id).await? {
            Some(doc) => Post::from_document(&doc),
            None => Err(BackendError::NotFound(format!("post {}", post_id)).into()),
        }
    }

    /// Flip the signed-in user's like on `post`
    ///
    /// The new like list is computed from `post` as given; the backend write
    /// is an atomic add or remove of the user id so concurrent likes by other
    /// users are not overwritten.
    pub async fn toggle_like(&self, post: &Post) -> Result<Post> {
        let uid = self.ctx.require_session("Unable to like post").await?;
        let (likes, liked) = toggle_membership(&post.likes, &uid);

        let update = if liked {
            FieldUpdate::array_union("likes", uid.as_str())
        } else {
            FieldUpdate::array_remove("likes", uid.as_str())
        };
        let written = self
            .ctx
            .backend
            .documents
            .update(self.collection(), &post.post_id, vec![update])
            .await;
        self.ctx.handle("Unable to like post", written).await?;

        self.ctx.update(|s| s.apply_likes(&post.post_id, &likes)).await;
        self.ctx.events.emit(Event::LikeToggled {
            post_id: post.post_id.clone(),
            liked,
        });
        debug!(post_id = %post.post_id, liked, "like toggled");

        Ok(Post {
            likes,
            ..post.clone()
        })
    }

    /// Posts whose search terms contain `term`, newest first
    ///
    /// A blank term leaves the previous results untouched.
    pub async fn search_posts(&self, term: &str) -> Result<Vec<Post>> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Ok(self.ctx.snapshot().await.searched_posts);
        }

        self.ctx.update(|s| s.search_loading = true).await;
        let result = self.search_backend(&term).await;
        self.ctx.update(|s| s.search_loading = false).await;
        let mut posts = self.ctx.handle("Cannot search posts", result).await?;
        sort_newest_first(&mut posts);

        self.ctx.update(|s| s.searched_posts = posts.clone()).await;
        self.ctx.events.emit(Event::SearchUpdated {
            term,
            count: posts.len(),
        });
        Ok(posts)
    }

    async fn search_backend(&self, term: &str) -> Result<Vec<Post>> {
        let docs = self
            .ctx
            .backend
            .documents
            .query(
                self.collection(),
                &Query::new().where_array_contains("searchTerms", term),
            )
            .await?;
        from_documents(&docs)
    }

    /// Copy a new avatar URL onto every post by `uid`, then reload own posts
    ///
    /// Writes go out in batches no larger than the backend allows. A failing
    /// batch stops the propagation; batches already committed stay.
    pub async fn propagate_avatar(&self, uid: &str, image_url: &str) -> Result<usize> {
        let result = self.patch_author_image(uid, image_url).await;
        let patched = self.ctx.handle("Cannot update post images", result).await?;

        self.ctx.events.emit(Event::AvatarPropagated { posts: patched });
        info!(posts = patched, "avatar propagated");
        let _ = self.refresh_posts().await;
        Ok(patched)
    }

    async fn patch_author_image(&self, uid: &str, image_url: &str) -> Result<usize> {
        let store = &self.ctx.backend.documents;
        let docs = store
            .query(self.collection(), &Query::new().where_eq("userId", uid))
            .await?;

        let writes: Vec<BatchWrite> = docs
            .iter()
            .map(|doc| BatchWrite {
                collection: self.collection().to_string(),
                id: doc.id.clone(),
                updates: vec![FieldUpdate::set("userImage", image_url)],
            })
            .collect();

        let chunk_size = store.max_batch_size().max(1);
        for chunk in writes.chunks(chunk_size) {
            store.commit_batch(chunk.to_vec()).await?;
        }
        Ok(writes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, time: i64) -> Post {
        Post {
            post_id: id.to_string(),
            time,
            ..Default::default()
        }
    }

    #[test]
    fn test_search_terms_strip_punctuation_and_case() {
        assert_eq!(
            search_terms("Hello, World! #fun", &[]),
            vec!["hello", "world", "fun"]
        );
    }

    #[test]
    fn test_search_terms_dedupe_and_whitespace() {
        assert_eq!(
            search_terms("  Sea\tsea\nSUN...sea ", &[]),
            vec!["sea", "sun"]
        );
        assert!(search_terms("!!! ... ###", &[]).is_empty());
        assert!(search_terms("", &[]).is_empty());
    }

    #[test]
    fn test_search_terms_filler_words() {
        let filler = vec!["the".to_string(), "A".to_string()];
        assert_eq!(
            search_terms("The cat and a dog", &filler),
            vec!["cat", "and", "dog"]
        );
    }

    #[test]
    fn test_search_terms_keep_unicode_words() {
        assert_eq!(search_terms("Café·Zürich!", &[]), vec!["café·zürich"]);
    }

    #[test]
    fn test_sort_newest_first() {
        let mut posts = vec![post("a", 1), post("b", 3), post("c", 2)];
        sort_newest_first(&mut posts);
        let ids: Vec<_> = posts.iter().map(|p| p.post_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }
}

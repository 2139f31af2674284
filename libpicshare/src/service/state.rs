//! UI-observable state held by the view-model

use serde::Serialize;

use super::events::FeedSource;
use crate::types::{Comment, Post, User};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UiState {
    pub signed_in: bool,
    /// Account or profile operation in flight
    pub in_progress: bool,
    pub user: Option<User>,
    pub my_posts: Vec<Post>,
    pub my_posts_loading: bool,
    pub feed: Vec<Post>,
    pub feed_source: Option<FeedSource>,
    pub feed_loading: bool,
    pub searched_posts: Vec<Post>,
    pub search_loading: bool,
    pub comments: Vec<Comment>,
    pub comments_loading: bool,
}

impl UiState {
    pub fn following(&self) -> &[String] {
        self.user
            .as_ref()
            .map(|u| u.following.as_slice())
            .unwrap_or(&[])
    }

    /// Replace the like list of every cached copy of a post
    pub fn apply_likes(&mut self, post_id: &str, likes: &[String]) {
        for list in [&mut self.feed, &mut self.my_posts, &mut self.searched_posts] {
            for post in list.iter_mut().filter(|p| p.post_id == post_id) {
                post.likes = likes.to_vec();
            }
        }
    }

    /// Drop everything tied to the signed-in user
    pub fn clear_session(&mut self) {
        *self = UiState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str) -> Post {
        Post {
            post_id: id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_likes_updates_every_list() {
        let mut state = UiState {
            feed: vec![post("p1"), post("p2")],
            my_posts: vec![post("p1")],
            searched_posts: vec![post("p1")],
            ..Default::default()
        };

        state.apply_likes("p1", &["u1".to_string()]);

        assert_eq!(state.feed[0].likes, vec!["u1"]);
        assert!(state.feed[1].likes.is_empty());
        assert_eq!(state.my_posts[0].likes, vec!["u1"]);
        assert_eq!(state.searched_posts[0].likes, vec!["u1"]);
    }

    #[test]
    fn test_clear_session() {
        let mut state = UiState {
            signed_in: true,
            user: Some(User::default()),
            feed: vec![post("p1")],
            ..Default::default()
        };
        state.clear_session();
        assert_eq!(state, UiState::default());
    }

    #[test]
    fn test_following_without_user() {
        let state = UiState::default();
        assert!(state.following().is_empty());
    }
}

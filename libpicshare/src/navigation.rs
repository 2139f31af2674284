//! Screen routes and detail-screen arguments
//!
//! Routes are plain strings so any front end can map them to screens. Image
//! URIs and post ids are percent-encoded to stay a single path segment.
//! Arguments too large for a route segment, such as a whole [`Post`](crate::Post),
//! are parked in a [`NavArgStore`] and the route carries only the token.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Signup,
    Login,
    ForgotPassword,
    Feed,
    Search,
    MyPosts,
    Profile,
    /// Compose a post for the picked image
    NewPost { image_uri: String },
    /// Detail view of a post parked under `token`
    SinglePost { token: String },
    Comments { post_id: String },
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Signup => "signup".to_string(),
            Route::Login => "login".to_string(),
            Route::ForgotPassword => "forgotpassword".to_string(),
            Route::Feed => "feed".to_string(),
            Route::Search => "search".to_string(),
            Route::MyPosts => "myposts".to_string(),
            Route::Profile => "profile".to_string(),
            Route::NewPost { image_uri } => format!("newpost/{}", urlencoding::encode(image_uri)),
            Route::SinglePost { token } => format!("singlepost/{}", token),
            Route::Comments { post_id } => {
                format!("comments/{}", urlencoding::encode(post_id))
            }
        }
    }

    /// Parse a path produced by [`path`](Self::path)
    pub fn parse(path: &str) -> Option<Self> {
        let (head, arg) = match path.split_once('/') {
            Some((head, arg)) => (head, Some(arg)),
            None => (path, None),
        };
        match (head, arg) {
            ("signup", None) => Some(Route::Signup),
            ("login", None) => Some(Route::Login),
            ("forgotpassword", None) => Some(Route::ForgotPassword),
            ("feed", None) => Some(Route::Feed),
            ("search", None) => Some(Route::Search),
            ("myposts", None) => Some(Route::MyPosts),
            ("profile", None) => Some(Route::Profile),
            ("newpost", Some(arg)) if !arg.is_empty() => Some(Route::NewPost {
                image_uri: urlencoding::decode(arg).ok()?.into_owned(),
            }),
            ("singlepost", Some(arg)) if !arg.is_empty() => Some(Route::SinglePost {
                token: arg.to_string(),
            }),
            ("comments", Some(arg)) if !arg.is_empty() => Some(Route::Comments {
                post_id: urlencoding::decode(arg).ok()?.into_owned(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Hand-off slots for detail-screen arguments
///
/// Each value is taken at most once.
#[derive(Debug)]
pub struct NavArgStore<T> {
    slots: Arc<Mutex<HashMap<String, T>>>,
}

impl<T> Clone for NavArgStore<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<T> Default for NavArgStore<T> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> NavArgStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, T>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Park `value` and return the token that retrieves it
    pub fn put(&self, value: T) -> String {
        let token = Uuid::new_v4().to_string();
        self.slots().insert(token.clone(), value);
        token
    }

    pub fn take(&self, token: &str) -> Option<T> {
        self.slots().remove(token)
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Post;

    #[test]
    fn test_static_paths() {
        assert_eq!(Route::Signup.path(), "signup");
        assert_eq!(Route::ForgotPassword.path(), "forgotpassword");
        assert_eq!(Route::MyPosts.to_string(), "myposts");
        assert_eq!(
            Route::Comments {
                post_id: "p1".to_string()
            }
            .path(),
            "comments/p1"
        );
    }

    #[test]
    fn test_new_post_uri_is_one_segment() {
        let route = Route::NewPost {
            image_uri: "file:///tmp/cat pic.jpg".to_string(),
        };
        let path = route.path();
        assert_eq!(path.matches('/').count(), 1);
        assert_eq!(Route::parse(&path), Some(route));
    }

    #[test]
    fn test_comments_post_id_is_one_segment() {
        let route = Route::Comments {
            post_id: "a/b%c d".to_string(),
        };
        let path = route.path();
        assert_eq!(path, "comments/a%2Fb%25c%20d");
        assert_eq!(Route::parse(&path), Some(route));
    }

    #[test]
    fn test_parse_rejects_unknown_and_missing_args() {
        assert_eq!(Route::parse("feed"), Some(Route::Feed));
        assert_eq!(Route::parse("feed/extra"), None);
        assert_eq!(Route::parse("comments/"), None);
        assert_eq!(Route::parse("settings"), None);
        assert_eq!(Route::parse("newpost"), None);
    }

    #[test]
    fn test_nav_arg_taken_once() {
        let store = NavArgStore::new();
        let post = Post {
            post_id: "p1".to_string(),
            ..Default::default()
        };
        let token = store.put(post.clone());

        let route = Route::SinglePost {
            token: token.clone(),
        };
        assert_eq!(route.path(), format!("singlepost/{}", token));

        assert_eq!(store.take(&token), Some(post));
        assert_eq!(store.take(&token), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_nav_arg_tokens_are_distinct() {
        let store = NavArgStore::new();
        let a = store.put(1);
        let b = store.clone().put(2);
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.take(&b), Some(2));
    }

    #[test]
    fn test_take_unknown_token() {
        let store: NavArgStore<String> = NavArgStore::new();
        assert_eq!(store.take("missing"), None);
    }
}

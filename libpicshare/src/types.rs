//! Core types for Picshare
//!
//! Field names serialize in camelCase to match the backend document schema.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// A user profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub user_id: String,
    pub name: Option<String>,
    pub username: Option<String>,
    pub image_url: Option<String>,
    pub bio: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub following: Vec<String>,
}

impl User {
    pub fn is_following(&self, user_id: &str) -> bool {
        self.following.iter().any(|id| id == user_id)
    }
}

/// A published image with caption, author copy and likes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Post {
    pub post_id: String,
    pub user_id: String,
    pub username: Option<String>,
    pub user_image: Option<String>,
    pub post_image: Option<String>,
    pub post_description: String,
    /// Creation time, milliseconds since the Unix epoch
    pub time: i64,
    #[serde(deserialize_with = "null_as_empty")]
    pub likes: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub search_terms: Vec<String>,
}

impl Post {
    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|id| id == user_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Comment {
    pub comment_id: String,
    pub post_id: String,
    pub username: Option<String>,
    pub text: String,
    pub timestamp: i64,
}

/// Lists stored as `null` in older documents read back as empty
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Current time in the millisecond resolution used by `Post::time`
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// Upload Types
// ============================================================================

/// Supported image MIME types for uploads
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
    Heic,
}

impl ImageMimeType {
    /// Detect MIME type from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            "heic" | "heif" => Some(Self::Heic),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_mime_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
            Self::Heic => "image/heic",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
            Self::Heic => "heic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_post_null_likes_read_as_empty() {
        let post: Post = serde_json::from_value(json!({
            "postId": "p1",
            "userId": "u1",
            "postDescription": "sunset",
            "time": 5,
            "likes": null
        }))
        .unwrap();
        assert!(post.likes.is_empty());
        assert!(post.search_terms.is_empty());
        assert_eq!(post.time, 5);
    }

    #[test]
    fn test_user_missing_following_reads_as_empty() {
        let user: User = serde_json::from_value(json!({
            "userId": "u1",
            "username": "ada"
        }))
        .unwrap();
        assert!(user.following.is_empty());
        assert_eq!(user.username.as_deref(), Some("ada"));
    }

    #[test]
    fn test_post_serializes_camel_case() {
        let post = Post {
            post_id: "p1".to_string(),
            user_image: Some("http://img".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&post).unwrap();
        assert_eq!(value["postId"], "p1");
        assert_eq!(value["userImage"], "http://img");
        assert!(value.get("searchTerms").is_some());
    }

    #[test]
    fn test_membership_helpers() {
        let post = Post {
            likes: vec!["a".to_string()],
            ..Default::default()
        };
        assert!(post.is_liked_by("a"));
        assert!(!post.is_liked_by("b"));

        let user = User {
            following: vec!["x".to_string()],
            ..Default::default()
        };
        assert!(user.is_following("x"));
        assert!(!user.is_following("y"));
    }

    #[test]
    fn test_image_mime_from_path() {
        assert_eq!(
            ImageMimeType::from_path(Path::new("/tmp/cat.JPG")),
            Some(ImageMimeType::Jpeg)
        );
        assert_eq!(ImageMimeType::from_path(Path::new("notes.txt")), None);
        assert_eq!(ImageMimeType::from_path(Path::new("noext")), None);
        assert_eq!(ImageMimeType::Png.as_mime_str(), "image/png");
    }
}

//! Entity mappers between raw documents and typed records

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::backend::{Document, Fields};
use crate::error::{PicshareError, Result};
use crate::types::{Comment, Post, User};

/// A record stored as one document in a collection
pub trait Entity: Serialize + DeserializeOwned {
    /// Document key of this record
    fn id(&self) -> &str;

    /// Build the record from a document, taking its key as the identifier
    /// when the identifier field is missing
    fn from_document(doc: &Document) -> Result<Self>;

    /// Field map written to the backend
    fn to_fields(&self) -> Result<Fields> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(fields),
            other => Err(PicshareError::Validation(format!(
                "record serialized to {} instead of an object",
                other
            ))),
        }
    }
}

fn decode<T: DeserializeOwned>(doc: &Document) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(doc.fields.clone()))?)
}

impl Entity for User {
    fn id(&self) -> &str {
        &self.user_id
    }

    fn from_document(doc: &Document) -> Result<Self> {
        let mut user: User = decode(doc)?;
        if user.user_id.is_empty() {
            user.user_id = doc.id.clone();
        }
        Ok(user)
    }
}

impl Entity for Post {
    fn id(&self) -> &str {
        &self.post_id
    }

    fn from_document(doc: &Document) -> Result<Self> {
        let mut post: Post = decode(doc)?;
        if post.post_id.is_empty() {
            post.post_id = doc.id.clone();
        }
        Ok(post)
    }
}

impl Entity for Comment {
    fn id(&self) -> &str {
        &self.comment_id
    }

    fn from_document(doc: &Document) -> Result<Self> {
        let mut comment: Comment = decode(doc)?;
        if comment.comment_id.is_empty() {
            comment.comment_id = doc.id.clone();
        }
        Ok(comment)
    }
}

/// Map every document, failing on the first malformed one
pub fn from_documents<T: Entity>(docs: &[Document]) -> Result<Vec<T>> {
    docs.iter().map(T::from_document).collect()
}

impl User {
    /// Profile fields written on a profile update
    ///
    /// `following` is left out; it only changes through array updates.
    pub fn profile_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("userId".to_string(), Value::from(self.user_id.clone()));
        fields.insert("name".to_string(), Value::from(self.name.clone()));
        fields.insert("username".to_string(), Value::from(self.username.clone()));
        fields.insert("imageUrl".to_string(), Value::from(self.image_url.clone()));
        fields.insert("bio".to_string(), Value::from(self.bio.clone()));
        fields
    }
}

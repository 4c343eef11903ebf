//! Records exchanged with the bulletin-board store and the history API.

use serde::{Deserialize, Serialize};

/// A post as stored by the external bulletin board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Author name.
    pub name: String,
    /// Post body.
    pub body: String,
}

impl Post {
    /// Create a new post.
    #[must_use]
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

/// A chat message as served by the history endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub username: String,
    pub message: String,
}

impl From<Post> for ChatMessage {
    fn from(post: Post) -> Self {
        Self {
            username: post.name,
            message: post.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_wire_format() {
        let post: Post = serde_json::from_str(r#"{"name":"alice","body":"hi","id":7}"#).unwrap();
        assert_eq!(post, Post::new("alice", "hi"));
    }

    #[test]
    fn test_chat_message_from_post() {
        let msg = ChatMessage::from(Post::new("alice", "hi"));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"username": "alice", "message": "hi"}));
    }
}

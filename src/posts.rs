use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{post_key, POST_PREFIX};
use crate::core::db::{KvStore, KvStoreExt, StoreError};
use crate::core::helpers::{now, validate_uuid};
use crate::models::models::Post;

#[derive(Clone)]
pub struct Posts {
    kv: Arc<dyn KvStore>,
}

impl Posts {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Every post, newest first.
    pub fn list(&self) -> Result<Vec<Post>, StoreError> {
        let mut posts: Vec<Post> = self.kv.scan_json(POST_PREFIX)?;
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(posts)
    }

    /// Ids that are not uuids cannot name a post and yield `None`.
    pub fn get(&self, id: &str) -> Result<Option<Post>, StoreError> {
        if !validate_uuid(id) {
            return Ok(None);
        }
        self.kv.get_json(&post_key(id))
    }

    pub fn create(&self, title: &str, body: &str) -> Result<Post, StoreError> {
        let ts = now();
        let post = Post {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            body: body.to_string(),
            created_at: ts,
            updated_at: ts,
        };

        self.kv.set_json(&post_key(&post.id), &post)?;
        Ok(post)
    }

    /// Replaces title and body. `updated_at` always moves forward, even if
    /// the clock has not ticked since the previous write.
    pub fn update(&self, id: &str, title: &str, body: &str) -> Result<Option<Post>, StoreError> {
        let Some(mut post) = self.get(id)? else {
            return Ok(None);
        };

        let ts = now();
        post.updated_at = if ts > post.updated_at {
            ts
        } else {
            post.updated_at + Duration::microseconds(1)
        };
        post.title = title.to_string();
        post.body = body.to_string();

        self.kv.set_json(&post_key(id), &post)?;
        Ok(Some(post))
    }

    /// Returns whether a post was removed. Unknown ids are not an error.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        if !validate_uuid(id) {
            return Ok(false);
        }
        self.kv.delete(&post_key(id))
    }
}

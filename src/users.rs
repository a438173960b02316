use std::sync::Arc;
use uuid::Uuid;

use crate::config::{user_key, username_key};
use crate::core::db::{KvStore, KvStoreExt, StoreError};
use crate::models::models::User;

/// Credential store. Usernames are claimed through a `username:<name>`
/// index entry written with insert-if-absent, so two registrations for the
/// same name can never both succeed.
#[derive(Clone)]
pub struct Users {
    kv: Arc<dyn KvStore>,
}

impl Users {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn create(&self, username: &str, password_hash: &str) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        };

        if !self.kv.insert_json_if_absent(&username_key(username), &user.id)? {
            return Err(StoreError::Conflict(username.to_string()));
        }

        if let Err(e) = self.kv.set_json(&user_key(&user.id), &user) {
            // Release the name so the failed registration can be retried.
            if let Err(cleanup) = self.kv.delete(&username_key(username)) {
                tracing::error!(%username, "Failed to release username after failed registration: {}", cleanup);
            }
            return Err(e);
        }

        Ok(user)
    }

    pub fn get(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.kv.get_json(&user_key(id))
    }

    pub fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        match self.kv.get_json::<String>(&username_key(username))? {
            Some(id) => self.get(&id),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::MemoryStore;
    use serde_json::Value;

    /// Accepts the username index but refuses to write user records.
    struct NoUserWrites(MemoryStore);

    impl KvStore for NoUserWrites {
        fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
            if key.starts_with("user:") {
                return Err(StoreError::Backend(anyhow::anyhow!("write refused")));
            }
            self.0.set(key, value)
        }

        fn delete(&self, key: &str) -> Result<bool, StoreError> {
            self.0.delete(key)
        }

        fn insert_if_absent(&self, key: &str, value: Value) -> Result<bool, StoreError> {
            self.0.insert_if_absent(key, value)
        }

        fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
            self.0.scan_prefix(prefix)
        }
    }

    fn users() -> Users {
        Users::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn create_and_lookup() {
        let users = users();
        let created = users.create("alice", "hash").unwrap();

        let by_name = users.find_by_username("alice").unwrap().unwrap();
        assert_eq!(by_name.id, created.id);
        assert_eq!(by_name.password_hash, "hash");

        let by_id = users.get(&created.id).unwrap().unwrap();
        assert_eq!(by_id.username, "alice");
    }

    #[test]
    fn unknown_username_is_none() {
        assert!(users().find_by_username("ghost").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_conflicts() {
        let users = users();
        let first = users.create("bob", "h1").unwrap();

        let err = users.create("bob", "h2").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref name) if name == "bob"));

        // The first record is untouched.
        let stored = users.find_by_username("bob").unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.password_hash, "h1");
    }

    #[test]
    fn usernames_are_case_sensitive() {
        let users = users();
        users.create("Carol", "h").unwrap();
        assert!(users.create("carol", "h").is_ok());
    }

    #[test]
    fn failed_record_write_releases_username() {
        let kv = Arc::new(NoUserWrites(MemoryStore::new()));
        let users = Users::new(kv.clone());

        assert!(matches!(users.create("dave", "h"), Err(StoreError::Backend(_))));
        assert!(kv.get(&username_key("dave")).unwrap().is_none());
        assert!(users.find_by_username("dave").unwrap().is_none());
    }
}

//! Chat display collaborator: the messages that show server status.

pub mod discord;

use async_trait::async_trait;
use shared::types::{Embed, WatchKey};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DisplayError {
    /// The message or its channel no longer exists
    #[error("display not found")]
    NotFound,
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait DisplayService: Send + Sync {
    /// Resolved reference to a posted display
    type Handle: Clone + Send + Sync;

    /// Resolve a previously posted display.
    async fn fetch_display(&self, key: WatchKey) -> Result<Self::Handle, DisplayError>;

    /// Replace the content of a display in place.
    async fn edit_display(&self, handle: &Self::Handle, content: &Embed) -> Result<(), DisplayError>;

    /// Post a new display in `channel_id`.
    async fn create_display(
        &self,
        channel_id: u64,
        content: &Embed,
    ) -> Result<(WatchKey, Self::Handle), DisplayError>;
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use async_trait::async_trait;
    use shared::types::{Embed, WatchKey};
    use super::{DisplayError, DisplayService};

    /// Recording display collaborator with scripted failures.
    /// Handles are the watch keys themselves.
    pub struct FakeDisplay {
        fetch_failures: Mutex<HashMap<WatchKey, DisplayError>>,
        edit_failures: Mutex<HashMap<WatchKey, DisplayError>>,
        fetched: Mutex<Vec<WatchKey>>,
        edited: Mutex<Vec<(WatchKey, Embed)>>,
        created: Mutex<Vec<WatchKey>>,
        next_message_id: AtomicU64,
    }

    impl Default for FakeDisplay {
        fn default() -> Self {
            Self {
                fetch_failures: Mutex::default(),
                edit_failures: Mutex::default(),
                fetched: Mutex::default(),
                edited: Mutex::default(),
                created: Mutex::default(),
                next_message_id: AtomicU64::new(1000),
            }
        }
    }

    impl FakeDisplay {
        pub fn fail_fetch(&self, key: WatchKey, error: DisplayError) {
            self.fetch_failures.lock().unwrap().insert(key, error);
        }

        pub fn heal_fetch(&self, key: WatchKey) {
            self.fetch_failures.lock().unwrap().remove(&key);
        }

        pub fn fail_edit(&self, key: WatchKey, error: DisplayError) {
            self.edit_failures.lock().unwrap().insert(key, error);
        }

        pub fn fetched(&self) -> Vec<WatchKey> {
            self.fetched.lock().unwrap().clone()
        }

        pub fn edited(&self) -> Vec<WatchKey> {
            self.edited.lock().unwrap().iter().map(|(key, _)| *key).collect()
        }

        pub fn last_edit(&self, key: WatchKey) -> Option<Embed> {
            self.edited
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(k, _)| *k == key)
                .map(|(_, embed)| embed.clone())
        }

        pub fn created(&self) -> Vec<WatchKey> {
            self.created.lock().unwrap().clone()
        }

        pub fn clear(&self) {
            self.fetched.lock().unwrap().clear();
            self.edited.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl DisplayService for FakeDisplay {
        type Handle = WatchKey;

        async fn fetch_display(&self, key: WatchKey) -> Result<WatchKey, DisplayError> {
            self.fetched.lock().unwrap().push(key);
            match self.fetch_failures.lock().unwrap().get(&key) {
                Some(error) => Err(error.clone()),
                None => Ok(key),
            }
        }

        async fn edit_display(&self, handle: &WatchKey, content: &Embed) -> Result<(), DisplayError> {
            self.edited.lock().unwrap().push((*handle, content.clone()));
            match self.edit_failures.lock().unwrap().get(handle) {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }

        async fn create_display(
            &self,
            channel_id: u64,
            _content: &Embed,
        ) -> Result<(WatchKey, WatchKey), DisplayError> {
            let key = WatchKey::new(channel_id, self.next_message_id.fetch_add(1, Ordering::SeqCst));
            self.created.lock().unwrap().push(key);
            Ok((key, key))
        }
    }
}

pub mod document;
pub mod validate;

use shared::types::{EndpointKey, WatchKey};
use self::document::{ConfigDocument, Persist, ServerConfig};
use self::validate::{Problem, ServerDraft};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to add server: {}", join_problems(.0))]
    Rejected(Vec<Problem>),
    #[error("Unknown server: {0}")]
    UnknownServer(EndpointKey),
    #[error("Unknown watch group: {0}")]
    UnknownWatch(WatchKey),
    #[error("A watch group needs at least one server")]
    EmptyWatch,
    #[error(transparent)]
    Persist(#[from] anyhow::Error),
}

fn join_problems(problems: &[Problem]) -> String {
    problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Endpoint and watch group registries over the configuration document.
///
/// Every successful mutation rewrites the whole document before returning.
/// Rejected operations leave both memory and storage untouched, and so does
/// a mutation whose rewrite fails.
pub struct Store {
    document: ConfigDocument,
    sink: Box<dyn Persist>,
}

impl Store {
    pub fn new(document: ConfigDocument, sink: Box<dyn Persist>) -> Self {
        Self { document, sink }
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    pub fn add_server(&mut self, draft: &ServerDraft) -> Result<EndpointKey, StoreError> {
        let (key, server) = validate::validate(draft, &self.document.servers)
            .map_err(StoreError::Rejected)?;

        self.commit(|document| document.servers.insert(key, server))?;

        tracing::info!("Added server {} ({})", key, draft.name);
        Ok(key)
    }

    pub fn remove_server(&mut self, key: &EndpointKey) -> Result<ServerConfig, StoreError> {
        if !self.document.servers.contains_key(key) {
            return Err(StoreError::UnknownServer(*key));
        }
        let server = self
            .commit(|document| document.servers.shift_remove(key))?
            .ok_or(StoreError::UnknownServer(*key))?;

        tracing::info!("Removed server {} ({})", key, server.name);
        Ok(server)
    }

    /// Record a watch group. Every server must currently be registered;
    /// duplicates in `servers` are dropped.
    pub fn add_watch(&mut self, key: WatchKey, servers: &[EndpointKey]) -> Result<(), StoreError> {
        let servers = self.check_watch_servers(servers)?;

        self.commit(|document| document.active_messages.insert(key, servers))?;

        tracing::info!("Added watch group {}", key);
        Ok(())
    }

    /// Validate a server selection for a new watch group without recording it.
    pub fn check_watch_servers(&self, servers: &[EndpointKey]) -> Result<Vec<EndpointKey>, StoreError> {
        let mut unique: Vec<EndpointKey> = Vec::with_capacity(servers.len());
        for key in servers {
            if !self.document.servers.contains_key(key) {
                return Err(StoreError::UnknownServer(*key));
            }
            if !unique.contains(key) {
                unique.push(*key);
            }
        }

        if unique.is_empty() {
            return Err(StoreError::EmptyWatch);
        }

        Ok(unique)
    }

    pub fn remove_watch(&mut self, key: &WatchKey) -> Result<(), StoreError> {
        if !self.document.active_messages.contains_key(key) {
            return Err(StoreError::UnknownWatch(*key));
        }
        self.remove_watches(std::slice::from_ref(key))?;
        Ok(())
    }

    /// Drop every listed watch group that exists, then persist once.
    /// Returns how many were removed; nothing is written if none were.
    pub fn remove_watches(&mut self, keys: &[WatchKey]) -> Result<usize, StoreError> {
        if !keys.iter().any(|key| self.document.active_messages.contains_key(key)) {
            return Ok(0);
        }

        let removed = self.commit(|document| {
            keys.iter()
                .filter(|key| document.active_messages.shift_remove(*key).is_some())
                .count()
        })?;
        tracing::info!("Removed {} watch group(s)", removed);

        Ok(removed)
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        self.sink.persist(&self.document)
    }

    /// Apply `change` and rewrite the document, restoring the previous
    /// in-memory state if the rewrite fails.
    fn commit<T>(&mut self, change: impl FnOnce(&mut ConfigDocument) -> T) -> Result<T, StoreError> {
        let before = self.document.clone();
        let outcome = change(&mut self.document);

        if let Err(e) = self.flush() {
            self.document = before;
            return Err(StoreError::Persist(e));
        }

        Ok(outcome)
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use super::document::{ConfigDocument, Persist};

    /// Persistence sink that records successful writes in memory and can be
    /// switched into failing.
    #[derive(Clone, Default)]
    pub struct MemorySink {
        writes: Arc<AtomicUsize>,
        last: Arc<Mutex<Option<ConfigDocument>>>,
        failing: Arc<AtomicBool>,
    }

    impl MemorySink {
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        pub fn last(&self) -> Option<ConfigDocument> {
            self.last.lock().unwrap().clone()
        }
    }

    impl Persist for MemorySink {
        fn persist(&mut self, document: &ConfigDocument) -> anyhow::Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(document.clone());
            Ok(())
        }
    }

    /// Persistence sink whose every write fails.
    pub struct BrokenSink;

    impl Persist for BrokenSink {
        fn persist(&mut self, _document: &ConfigDocument) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }
}
